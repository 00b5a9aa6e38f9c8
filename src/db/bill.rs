use std::{fmt, str::FromStr};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::Row;

use crate::db::PostgresStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Residential,
    Business,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Residential => "residential",
            AccountType::Business => "business",
        }
    }
}

impl FromStr for AccountType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "residential" => Ok(AccountType::Residential),
            "business" => Ok(AccountType::Business),
            other => Err(anyhow!("unknown account type: {other}")),
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval state assigned by the platform, distinct from payment state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Approved,
    Rejected,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Approved => "approved",
            BillStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for BillStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BillStatus::Pending),
            "approved" => Ok(BillStatus::Approved),
            "rejected" => Ok(BillStatus::Rejected),
            other => Err(anyhow!("unknown bill status: {other}")),
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(anyhow!("unknown payment status: {other}")),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: Option<i64>,
    pub account_type: AccountType,
    pub account_number: String,
    /// Decimal string, validated to `^\d+(\.\d{2})?$` before it gets here.
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_image: Option<String>,
    pub status: BillStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Client-supplied fields of a bill; everything else is assigned on insert.
#[derive(Clone, Debug)]
pub struct NewBill {
    pub user_id: Option<i64>,
    pub account_type: AccountType,
    pub account_number: String,
    pub amount: String,
    pub bill_image: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillWithOwner {
    #[serde(flatten)]
    pub bill: Bill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[async_trait]
pub trait BillStore: Send + Sync {
    async fn add_bill(&self, bill: &NewBill) -> Result<Bill, anyhow::Error>;
    async fn bills_for_user(&self, user_id: i64) -> Result<Vec<Bill>, anyhow::Error>;
    async fn bill_for_user(&self, id: i64, user_id: i64) -> Result<Option<Bill>, anyhow::Error>;
    async fn all_bills(&self) -> Result<Vec<BillWithOwner>, anyhow::Error>;
    /// Transition `unpaid -> paid` for the user's own bill. Returns false
    /// when no transition happened (missing, foreign or already paid).
    async fn mark_paid(&self, id: i64, user_id: i64) -> Result<bool, anyhow::Error>;
    async fn set_status(
        &self,
        id: i64,
        status: BillStatus,
    ) -> Result<Option<Bill>, anyhow::Error>;
    /// Attach unowned bills to the given user. Returns how many were claimed.
    async fn claim_bills(&self, ids: &[i64], user_id: i64) -> Result<u64, anyhow::Error>;
}

#[async_trait]
impl BillStore for PostgresStore {
    async fn add_bill(&self, bill: &NewBill) -> Result<Bill, anyhow::Error> {
        let row = self
            .pool
            .get()
            .await?
            .query_one(
                r#"INSERT INTO bills
                        (user_id, account_type, account_number, amount, bill_image)
                    VALUES
                        ($1, $2, $3, $4, $5)
                    RETURNING id, user_id, account_type, account_number, amount, bill_image, status, payment_status, created_at
                "#,
                &[
                    &bill.user_id,
                    &bill.account_type.as_str(),
                    &bill.account_number,
                    &bill.amount,
                    &bill.bill_image,
                ],
            )
            .await?;
        row_to_bill(&row)
    }

    async fn bills_for_user(&self, user_id: i64) -> Result<Vec<Bill>, anyhow::Error> {
        let rows = self
            .pool
            .get()
            .await?
            .query(
                "SELECT id, user_id, account_type, account_number, amount, bill_image, status, payment_status, created_at FROM bills WHERE user_id = $1 ORDER BY created_at DESC",
                &[&user_id],
            )
            .await?;

        rows.iter().map(row_to_bill).collect()
    }

    async fn bill_for_user(&self, id: i64, user_id: i64) -> Result<Option<Bill>, anyhow::Error> {
        let row = self
            .pool
            .get()
            .await?
            .query_opt(
                "SELECT id, user_id, account_type, account_number, amount, bill_image, status, payment_status, created_at FROM bills WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_bill(&row)?)),
            None => Ok(None),
        }
    }

    async fn all_bills(&self) -> Result<Vec<BillWithOwner>, anyhow::Error> {
        let rows = self
            .pool
            .get()
            .await?
            .query(
                r#"SELECT b.id, b.user_id, b.account_type, b.account_number, b.amount, b.bill_image, b.status, b.payment_status, b.created_at, u.username
                    FROM bills b
                    LEFT JOIN users u ON u.id = b.user_id
                    ORDER BY b.created_at DESC
                "#,
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(BillWithOwner {
                    bill: row_to_bill(row)?,
                    username: row.get(9),
                })
            })
            .collect()
    }

    async fn mark_paid(&self, id: i64, user_id: i64) -> Result<bool, anyhow::Error> {
        let updated = self
            .pool
            .get()
            .await?
            .execute(
                "UPDATE bills SET payment_status = 'paid' WHERE id = $1 AND user_id = $2 AND payment_status = 'unpaid'",
                &[&id, &user_id],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn set_status(
        &self,
        id: i64,
        status: BillStatus,
    ) -> Result<Option<Bill>, anyhow::Error> {
        let row = self
            .pool
            .get()
            .await?
            .query_opt(
                r#"UPDATE bills SET status = $2 WHERE id = $1
                    RETURNING id, user_id, account_type, account_number, amount, bill_image, status, payment_status, created_at
                "#,
                &[&id, &status.as_str()],
            )
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_bill(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_bills(&self, ids: &[i64], user_id: i64) -> Result<u64, anyhow::Error> {
        let claimed = self
            .pool
            .get()
            .await?
            .execute(
                "UPDATE bills SET user_id = $2 WHERE id = ANY($1) AND user_id IS NULL",
                &[&ids.to_vec(), &user_id],
            )
            .await?;
        Ok(claimed)
    }
}

fn row_to_bill(row: &Row) -> Result<Bill, anyhow::Error> {
    let account_type = AccountType::from_str(&row.get::<usize, String>(2))?;
    let status = BillStatus::from_str(&row.get::<usize, String>(6))?;
    let payment_status = PaymentStatus::from_str(&row.get::<usize, String>(7))?;

    Ok(Bill {
        id: row.get(0),
        user_id: row.get(1),
        account_type,
        account_number: row.get(3),
        amount: row.get(4),
        bill_image: row.get(5),
        status,
        payment_status,
        created_at: row.get(8),
    })
}
