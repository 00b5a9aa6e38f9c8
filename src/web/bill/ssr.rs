use std::str::FromStr;

use axum::{
    Form,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect},
};
use chrono::Utc;
use tower_sessions::Session;
use tracing::{error, warn};

use crate::{
    Ctx,
    db::bill::{Bill, BillStatus},
    web::{
        Result,
        bill::{
            self,
            data::{AdminBillRow, BillFormState, BillRow, PayData, StatusData},
        },
        csrf::{gen_csrf, verify_csrf},
        error::Error,
        flash::{Flash, set_flash, take_flash},
        rate_limit::RealIp,
        session::Auth,
        templates::{AdminTemplate, DashboardTemplate, HomeTemplate, HtmlTemplate, PayTemplate},
    },
};

fn to_rows(bills: &[Bill]) -> Vec<BillRow> {
    let now = Utc::now();
    bills.iter().map(|b| BillRow::from_bill(b, now)).collect()
}

async fn flash_or_log(session: &Session) -> Option<Flash> {
    take_flash(session).await.unwrap_or_else(|e| {
        error!("Error taking flash message: {e}");
        None
    })
}

/// The session user's bills. Without a session the route does not exist
/// as far as the visitor can tell.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth))]
pub async fn dashboard(
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
) -> Result<impl IntoResponse> {
    let Some(user) = auth.user() else {
        return Err(Error::NotFound("Page Not Found".to_string()));
    };

    let bills = bill::user_bills(&ctx, user.id).await?;
    let template = DashboardTemplate {
        flash: flash_or_log(&session).await,
        csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
        bills: to_rows(&bills),
        form: BillFormState::default(),
        auth,
    };
    Ok(HtmlTemplate(template))
}

/// Landing page form action: anyone may submit a bill; an anonymous
/// submission is remembered in the session and the visitor is sent to
/// signup to create the account it will belong to.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, multipart))]
pub async fn submit_landing(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return Err(Error::TooManyRequests);
    }

    let form = bill::read_bill_form(&mut multipart).await?;
    verify_csrf(form.csrf_token.as_deref().unwrap_or_default(), &session)
        .await
        .map_err(|_| Error::Unauthorized)?;

    let errors = form.submission.validate();
    if !errors.is_empty() {
        let template = HomeTemplate {
            auth,
            flash: None,
            csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
            form: BillFormState::with_errors(&form.submission, errors),
        };
        return Ok(HtmlTemplate(template).into_response());
    }

    let owner = auth.user().map(|u| u.id);
    let created = bill::create_bill(&ctx, owner, &form.submission).await?;
    if owner.is_none()
        && let Err(e) = bill::rest::remember_pending_bill(&session, created.id).await
    {
        error!("Error remembering pending bill {}: {e}", created.id);
    }

    set_flash(
        &session,
        Flash::success("Bill information saved. Let's create your account."),
    )
    .await
    .map_err(|_| Error::Internal)?;
    Ok(Redirect::to("/signup").into_response())
}

/// Dashboard form action for adding a bill to the signed-in account.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, multipart))]
pub async fn submit_dashboard(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let Some(user) = auth.user().cloned() else {
        return Err(Error::Unauthorized);
    };

    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return Err(Error::TooManyRequests);
    }

    let form = bill::read_bill_form(&mut multipart).await?;
    verify_csrf(form.csrf_token.as_deref().unwrap_or_default(), &session)
        .await
        .map_err(|_| Error::Unauthorized)?;

    let errors = form.submission.validate();
    if !errors.is_empty() {
        // re-render the dashboard with the form state and inline errors
        let bills = bill::user_bills(&ctx, user.id).await?;
        let template = DashboardTemplate {
            auth,
            flash: None,
            csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
            bills: to_rows(&bills),
            form: BillFormState::with_errors(&form.submission, errors),
        };
        return Ok(HtmlTemplate(template).into_response());
    }

    bill::create_bill(&ctx, Some(user.id), &form.submission).await?;

    set_flash(
        &session,
        Flash::success("Bill has been added to your account."),
    )
    .await
    .map_err(|_| Error::Internal)?;
    Ok(Redirect::to("/dashboard").into_response())
}

/// Confirmation step before paying: shows the bill details and asks the
/// user to confirm.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth))]
pub async fn pay_confirm(
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let Some(user) = auth.user() else {
        return Err(Error::NotFound("Page Not Found".to_string()));
    };

    let found = ctx
        .bill_store
        .bill_for_user(id, user.id)
        .await
        .map_err(|e| {
            error!("Error fetching bill {id}: {e}");
            Error::Internal
        })?;
    let Some(found) = found else {
        return Err(Error::NotFound("bill not found".to_string()));
    };

    let row = BillRow::from_bill(&found, Utc::now());
    if row.paid {
        if let Err(e) = set_flash(&session, Flash::error("bill is already paid")).await {
            error!("Error setting flash message: {e}");
        }
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let template = PayTemplate {
        auth,
        csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
        bill: row,
    };
    Ok(HtmlTemplate(template).into_response())
}

/// Pay action behind the confirmation step.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, payload))]
pub async fn pay(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    Path(id): Path<i64>,
    Form(payload): Form<PayData>,
) -> Result<impl IntoResponse> {
    let Some(user) = auth.user() else {
        return Err(Error::Unauthorized);
    };

    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return Err(Error::TooManyRequests);
    }

    verify_csrf(&payload.csrf_token, &session)
        .await
        .map_err(|_| Error::Unauthorized)?;

    let flash = match bill::pay_bill(&ctx, user, id).await {
        Ok(()) => Flash::success("Payment processed successfully."),
        Err(Error::BadRequest(msg)) => Flash::error(&msg),
        Err(e) => return Err(e),
    };
    if let Err(e) = set_flash(&session, flash).await {
        error!("Error setting flash message: {e}");
    }
    Ok(Redirect::to("/dashboard"))
}

/// All bills on the platform. The route itself carries no authorization
/// check; only the approve/reject controls require an admin session.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth))]
pub async fn admin(
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
) -> Result<impl IntoResponse> {
    let bills = bill::admin_bills(&ctx).await?;
    let template = AdminTemplate {
        flash: flash_or_log(&session).await,
        csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
        bills: bills.iter().map(AdminBillRow::from_bill).collect(),
        auth,
    };
    Ok(HtmlTemplate(template))
}

/// Admin approval decision, the `pending -> approved | rejected` leg of a
/// bill's lifecycle.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, payload))]
pub async fn admin_set_status(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    Path(id): Path<i64>,
    Form(payload): Form<StatusData>,
) -> Result<impl IntoResponse> {
    if !auth.is_admin() {
        return Err(Error::Unauthorized);
    }

    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return Err(Error::TooManyRequests);
    }

    verify_csrf(&payload.csrf_token, &session)
        .await
        .map_err(|_| Error::Unauthorized)?;

    let status = BillStatus::from_str(&payload.status)
        .map_err(|_| Error::BadRequest("invalid status".to_string()))?;
    if status == BillStatus::Pending {
        return Err(Error::BadRequest("invalid status".to_string()));
    }

    let updated = ctx.bill_store.set_status(id, status).await.map_err(|e| {
        error!("Error updating status of bill {id}: {e}");
        Error::Internal
    })?;
    let Some(updated) = updated else {
        return Err(Error::NotFound("bill not found".to_string()));
    };

    ctx.bill_cache.invalidate_admin().await;
    if let Some(owner) = updated.user_id {
        ctx.bill_cache.invalidate_user(owner).await;
    }

    if let Err(e) = set_flash(&session, Flash::success("Bill status updated.")).await {
        error!("Error setting flash message: {e}");
    }
    Ok(Redirect::to("/admin"))
}
