use axum::extract::Multipart;
use tracing::error;

use crate::{
    Ctx,
    db::bill::{AccountType, Bill, BillWithOwner, NewBill},
    web::{
        bill::data::BillSubmission,
        error::Error,
        session::SessionUser,
    },
};

pub mod data;
pub mod rest;
pub mod ssr;

/// Bill form fields plus the csrf token, read out of a multipart body.
#[derive(Debug, Default)]
pub struct BillForm {
    pub submission: BillSubmission,
    pub csrf_token: Option<String>,
}

pub(crate) async fn read_bill_form(multipart: &mut Multipart) -> Result<BillForm, Error> {
    let read_err = |_| Error::BadRequest("malformed form data".to_string());
    let mut form = BillForm::default();

    while let Some(field) = multipart.next_field().await.map_err(read_err)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "accountType" => form.submission.account_type = field.text().await.map_err(read_err)?,
            "accountNumber" => {
                form.submission.account_number = field.text().await.map_err(read_err)?
            }
            "amount" => form.submission.amount = field.text().await.map_err(read_err)?,
            "csrf_token" => form.csrf_token = Some(field.text().await.map_err(read_err)?),
            "billImage" => {
                let bytes = field.bytes().await.map_err(read_err)?;
                // browsers send an empty part when no file was picked
                if !bytes.is_empty() {
                    form.submission.image = Some(bytes.to_vec());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Persist a validated submission and drop the affected list caches.
pub(crate) async fn create_bill(
    ctx: &Ctx,
    owner: Option<i64>,
    submission: &BillSubmission,
) -> Result<Bill, Error> {
    let account_type: AccountType = submission
        .account_type
        .parse()
        .map_err(|_| Error::BadRequest("invalid account type".to_string()))?;

    let bill_image = match &submission.image {
        Some(bytes) => Some(ctx.files.store_image(bytes).await.map_err(|e| {
            error!("Error storing bill image: {e}");
            Error::Internal
        })?),
        None => None,
    };

    let bill = ctx
        .bill_store
        .add_bill(&NewBill {
            user_id: owner,
            account_type,
            account_number: submission.account_number.clone(),
            amount: submission.amount.clone(),
            bill_image,
        })
        .await
        .map_err(|e| {
            error!("Error persisting bill: {e}");
            Error::Internal
        })?;

    ctx.bill_cache.invalidate_admin().await;
    if let Some(user_id) = owner {
        ctx.bill_cache.invalidate_user(user_id).await;
    }

    Ok(bill)
}

/// The only path that moves a bill to `paid`. Invalidates the caches
/// before returning so the next list read sees the new state.
pub(crate) async fn pay_bill(ctx: &Ctx, user: &SessionUser, bill_id: i64) -> Result<(), Error> {
    let updated = ctx
        .bill_store
        .mark_paid(bill_id, user.id)
        .await
        .map_err(|e| {
            error!("Error paying bill {bill_id}: {e}");
            Error::Internal
        })?;

    if !updated {
        return match ctx.bill_store.bill_for_user(bill_id, user.id).await {
            Ok(Some(_)) => Err(Error::BadRequest("bill is already paid".to_string())),
            Ok(None) => Err(Error::NotFound("bill not found".to_string())),
            Err(e) => {
                error!("Error fetching bill {bill_id}: {e}");
                Err(Error::Internal)
            }
        };
    }

    ctx.bill_cache.invalidate_user(user.id).await;
    ctx.bill_cache.invalidate_admin().await;
    Ok(())
}

/// The user's bill list, read through the cache.
pub(crate) async fn user_bills(ctx: &Ctx, user_id: i64) -> Result<Vec<Bill>, Error> {
    if let Some(bills) = ctx.bill_cache.user_bills(user_id).await {
        return Ok(bills);
    }

    let bills = ctx.bill_store.bills_for_user(user_id).await.map_err(|e| {
        error!("Error fetching bills for user {user_id}: {e}");
        Error::Internal
    })?;
    ctx.bill_cache.put_user_bills(user_id, bills.clone()).await;
    Ok(bills)
}

/// All bills with their owner, read through the cache.
pub(crate) async fn admin_bills(ctx: &Ctx) -> Result<Vec<BillWithOwner>, Error> {
    if let Some(bills) = ctx.bill_cache.admin_bills().await {
        return Ok(bills);
    }

    let bills = ctx.bill_store.all_bills().await.map_err(|e| {
        error!("Error fetching all bills: {e}");
        Error::Internal
    })?;
    ctx.bill_cache.put_admin_bills(bills.clone()).await;
    Ok(bills)
}
