use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::db::{
    bill::{Bill, BillStatus, BillStore, BillWithOwner, NewBill, PaymentStatus},
    user::{User, UserStore},
};

/// Store keeping everything in process memory. Backs the integration tests
/// and lets the server run without a database.
#[derive(Default, Clone)]
pub struct InMemStore(Arc<Mutex<Inner>>);

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    next_bill_id: i64,
    users: Vec<User>,
    bills: Vec<Bill>,
}

#[async_trait]
impl UserStore for InMemStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, anyhow::Error> {
        let inner = self.0.lock().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        let inner = self.0.lock().await;
        Ok(inner.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, anyhow::Error> {
        let mut inner = self.0.lock().await;
        if inner.users.iter().any(|u| u.username == username) {
            return Err(anyhow::anyhow!("username already taken: {username}"));
        }
        inner.next_user_id += 1;
        let user = User {
            id: inner.next_user_id,
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
            is_admin: false,
            created_at: Utc::now(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl BillStore for InMemStore {
    async fn add_bill(&self, bill: &NewBill) -> Result<Bill, anyhow::Error> {
        let mut inner = self.0.lock().await;
        inner.next_bill_id += 1;
        let bill = Bill {
            id: inner.next_bill_id,
            user_id: bill.user_id,
            account_type: bill.account_type,
            account_number: bill.account_number.clone(),
            amount: bill.amount.clone(),
            bill_image: bill.bill_image.clone(),
            status: BillStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_at: Utc::now(),
        };
        inner.bills.push(bill.clone());
        Ok(bill)
    }

    async fn bills_for_user(&self, user_id: i64) -> Result<Vec<Bill>, anyhow::Error> {
        let inner = self.0.lock().await;
        let mut bills: Vec<Bill> = inner
            .bills
            .iter()
            .filter(|b| b.user_id == Some(user_id))
            .cloned()
            .collect();
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bills)
    }

    async fn bill_for_user(&self, id: i64, user_id: i64) -> Result<Option<Bill>, anyhow::Error> {
        let inner = self.0.lock().await;
        Ok(inner
            .bills
            .iter()
            .find(|b| b.id == id && b.user_id == Some(user_id))
            .cloned())
    }

    async fn all_bills(&self) -> Result<Vec<BillWithOwner>, anyhow::Error> {
        let inner = self.0.lock().await;
        let mut bills: Vec<BillWithOwner> = inner
            .bills
            .iter()
            .map(|b| BillWithOwner {
                bill: b.clone(),
                username: b.user_id.and_then(|id| {
                    inner
                        .users
                        .iter()
                        .find(|u| u.id == id)
                        .map(|u| u.username.clone())
                }),
            })
            .collect();
        bills.sort_by(|a, b| b.bill.created_at.cmp(&a.bill.created_at));
        Ok(bills)
    }

    async fn mark_paid(&self, id: i64, user_id: i64) -> Result<bool, anyhow::Error> {
        let mut inner = self.0.lock().await;
        match inner.bills.iter_mut().find(|b| {
            b.id == id && b.user_id == Some(user_id) && b.payment_status == PaymentStatus::Unpaid
        }) {
            Some(bill) => {
                bill.payment_status = PaymentStatus::Paid;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(
        &self,
        id: i64,
        status: BillStatus,
    ) -> Result<Option<Bill>, anyhow::Error> {
        let mut inner = self.0.lock().await;
        match inner.bills.iter_mut().find(|b| b.id == id) {
            Some(bill) => {
                bill.status = status;
                Ok(Some(bill.clone()))
            }
            None => Ok(None),
        }
    }

    async fn claim_bills(&self, ids: &[i64], user_id: i64) -> Result<u64, anyhow::Error> {
        let mut inner = self.0.lock().await;
        let mut claimed = 0;
        for bill in inner
            .bills
            .iter_mut()
            .filter(|b| ids.contains(&b.id) && b.user_id.is_none())
        {
            bill.user_id = Some(user_id);
            claimed += 1;
        }
        Ok(claimed)
    }
}
