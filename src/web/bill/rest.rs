use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use tracing::{error, warn};

use crate::{
    Ctx,
    web::{
        ErrorResp, PENDING_BILLS, SuccessResp, bill,
        error::Error,
        rate_limit::RealIp,
        session::Auth,
    },
};

fn json_error(err: &Error) -> Response {
    let (status, msg) = match err {
        Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
        Error::Unauthorized => (StatusCode::UNAUTHORIZED, "not logged in"),
        Error::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "Please try again later"),
        Error::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
    };
    (status, Json(ErrorResp::new(msg))).into_response()
}

/// The session user's bills, newest first.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, auth))]
pub async fn list_bills(auth: Auth, State(ctx): State<Ctx>) -> Response {
    let Some(user) = auth.user() else {
        return json_error(&Error::Unauthorized);
    };

    match bill::user_bills(&ctx, user.id).await {
        Ok(bills) => Json(bills).into_response(),
        Err(e) => json_error(&e),
    }
}

/// Accepts a multipart bill submission. Works without a session: a bill
/// submitted from the landing page is held unowned and remembered in the
/// session until signup claims it.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, multipart))]
pub async fn create_bill(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    mut multipart: Multipart,
) -> Response {
    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return json_error(&Error::TooManyRequests);
    }

    let form = match bill::read_bill_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => return json_error(&e),
    };

    let errors = form.submission.validate();
    if let Some(msg) = errors.first() {
        return json_error(&Error::BadRequest(msg.to_string()));
    }

    let owner = auth.user().map(|u| u.id);
    let created = match bill::create_bill(&ctx, owner, &form.submission).await {
        Ok(bill) => bill,
        Err(e) => return json_error(&e),
    };

    if owner.is_none()
        && let Err(e) = remember_pending_bill(&session, created.id).await
    {
        error!("Error remembering pending bill {}: {e}", created.id);
    }

    (StatusCode::CREATED, Json(created)).into_response()
}

/// Requests the `unpaid -> paid` transition for the session user's bill.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, auth))]
pub async fn pay_bill(
    RealIp(ip): RealIp,
    auth: Auth,
    State(ctx): State<Ctx>,
    Path(id): Path<i64>,
) -> Response {
    let Some(user) = auth.user() else {
        return json_error(&Error::Unauthorized);
    };

    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return json_error(&Error::TooManyRequests);
    }

    match bill::pay_bill(&ctx, user, id).await {
        Ok(()) => Json(SuccessResp::new("Payment processed successfully.")).into_response(),
        Err(e) => json_error(&e),
    }
}

/// Every bill on the platform with its owner's username. There is no
/// authorization check here, mirroring the admin dashboard route.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx))]
pub async fn admin_bills(State(ctx): State<Ctx>) -> Response {
    match bill::admin_bills(&ctx).await {
        Ok(bills) => Json(bills).into_response(),
        Err(e) => json_error(&e),
    }
}

pub(crate) async fn remember_pending_bill(
    session: &Session,
    bill_id: i64,
) -> Result<(), anyhow::Error> {
    let mut pending: Vec<i64> = session.get(PENDING_BILLS).await?.unwrap_or_default();
    pending.push(bill_id);
    session.insert(PENDING_BILLS, &pending).await?;
    Ok(())
}
