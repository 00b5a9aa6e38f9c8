use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{error, warn};

use crate::{
    Ctx,
    web::{
        ErrorResp, USER_KEY,
        error::Error,
        rate_limit::RealIp,
        session::Auth,
        user::{
            self, DEFAULT_LOGIN_FAILURE, INVALID_CREDENTIALS_FORMAT,
            data::ApiCredentials,
        },
    },
};

/// Login result as the session consumers expect it: `ok` plus an optional
/// failure message.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResp {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, payload))]
pub async fn register(
    RealIp(ip): RealIp,
    session: Session,
    State(ctx): State<Ctx>,
    Json(payload): Json<ApiCredentials>,
) -> Response {
    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), None);
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResp::new("Please try again later")),
        )
            .into_response();
    }

    if !payload.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResp::new(INVALID_CREDENTIALS_FORMAT)),
        )
            .into_response();
    }

    match user::create_account(&ctx, &session, &payload.username, &payload.password).await {
        Ok(session_user) => (StatusCode::CREATED, Json(session_user)).into_response(),
        Err(Error::BadRequest(msg)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResp::new(&msg))).into_response()
        }
        Err(e) => {
            error!("Error registering {}: {e}", payload.username);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResp::new("internal server error")),
            )
                .into_response()
        }
    }
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, payload))]
pub async fn login(
    RealIp(ip): RealIp,
    session: Session,
    State(ctx): State<Ctx>,
    Json(payload): Json<ApiCredentials>,
) -> Response {
    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), Some(&payload.username));
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResp::new("Please try again later")),
        )
            .into_response();
    }

    if !payload.validate() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResp {
                ok: false,
                message: Some(DEFAULT_LOGIN_FAILURE.to_string()),
            }),
        )
            .into_response();
    }

    let Some(session_user) = user::authenticate(&ctx, &payload.username, &payload.password).await
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(LoginResp {
                ok: false,
                message: Some(DEFAULT_LOGIN_FAILURE.to_string()),
            }),
        )
            .into_response();
    };

    if let Err(e) = session.insert(USER_KEY, &session_user).await {
        error!("Error putting user in session: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResp::new("internal server error")),
        )
            .into_response();
    }

    Json(LoginResp {
        ok: true,
        message: None,
    })
    .into_response()
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(session))]
pub async fn logout(session: Session) -> Response {
    if let Err(e) = session.delete().await {
        error!("Error logging out: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResp::new("internal server error")),
        )
            .into_response();
    }
    Json(LoginResp {
        ok: true,
        message: None,
    })
    .into_response()
}

/// The current session user, for clients restoring their session state.
#[tracing::instrument(level = tracing::Level::DEBUG, skip(auth))]
pub async fn current_user(auth: Auth) -> Response {
    match auth.user() {
        Some(user) => Json(user).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResp::new("not logged in")),
        )
            .into_response(),
    }
}
