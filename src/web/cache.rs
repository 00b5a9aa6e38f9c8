use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::db::bill::{Bill, BillWithOwner};

/// In-memory cache for the bill list views, keyed by logical resource:
/// one entry per user's bill list plus one for the admin view of all
/// bills. There is no expiry; entries only leave through an explicit
/// `invalidate_*` call after a mutation, and the next read refetches
/// from the store.
#[derive(Default, Clone, Debug)]
pub struct BillCache(Arc<Mutex<Inner>>);

#[derive(Default, Debug)]
struct Inner {
    user_bills: HashMap<i64, Vec<Bill>>,
    admin_bills: Option<Vec<BillWithOwner>>,
}

impl BillCache {
    pub async fn user_bills(&self, user_id: i64) -> Option<Vec<Bill>> {
        self.0.lock().await.user_bills.get(&user_id).cloned()
    }

    pub async fn put_user_bills(&self, user_id: i64, bills: Vec<Bill>) {
        self.0.lock().await.user_bills.insert(user_id, bills);
    }

    pub async fn admin_bills(&self) -> Option<Vec<BillWithOwner>> {
        self.0.lock().await.admin_bills.clone()
    }

    pub async fn put_admin_bills(&self, bills: Vec<BillWithOwner>) {
        self.0.lock().await.admin_bills = Some(bills);
    }

    pub async fn invalidate_user(&self, user_id: i64) {
        self.0.lock().await.user_bills.remove(&user_id);
    }

    pub async fn invalidate_admin(&self) {
        self.0.lock().await.admin_bills = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bill::{AccountType, BillStatus, PaymentStatus};
    use chrono::Utc;

    fn bill(id: i64, user_id: i64) -> Bill {
        Bill {
            id,
            user_id: Some(user_id),
            account_type: AccountType::Residential,
            account_number: "ACC12345".to_string(),
            amount: "10.00".to_string(),
            bill_image: None,
            status: BillStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn entries_survive_until_invalidated() {
        let cache = BillCache::default();
        assert!(cache.user_bills(1).await.is_none());

        cache.put_user_bills(1, vec![bill(1, 1)]).await;
        assert_eq!(cache.user_bills(1).await.unwrap().len(), 1);

        cache.invalidate_user(1).await;
        assert!(cache.user_bills(1).await.is_none());
    }

    #[tokio::test]
    async fn user_keys_are_independent() {
        let cache = BillCache::default();
        cache.put_user_bills(1, vec![bill(1, 1)]).await;
        cache.put_user_bills(2, vec![bill(2, 2)]).await;

        cache.invalidate_user(1).await;
        assert!(cache.user_bills(1).await.is_none());
        assert!(cache.user_bills(2).await.is_some());
    }

    #[tokio::test]
    async fn admin_entry_is_separate_from_user_entries() {
        let cache = BillCache::default();
        cache.put_user_bills(1, vec![bill(1, 1)]).await;
        cache
            .put_admin_bills(vec![BillWithOwner {
                bill: bill(1, 1),
                username: Some("a@b.com".to_string()),
            }])
            .await;

        cache.invalidate_admin().await;
        assert!(cache.admin_bills().await.is_none());
        assert!(cache.user_bills(1).await.is_some());
    }
}
