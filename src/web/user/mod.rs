use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{error, warn};

pub mod data;
pub mod rest;

use crate::{
    Ctx,
    web::{
        PENDING_BILLS, Result, USER_KEY,
        csrf::{gen_csrf, verify_csrf},
        error::Error,
        flash::take_flash,
        rate_limit::RealIp,
        session::{Auth, SessionUser},
        templates::{HtmlTemplate, LoginTemplate, SignupTemplate},
        user::data::{LoginData, SignupData},
    },
};

pub const DEFAULT_LOGIN_FAILURE: &str = "User not found. Please check your credentials.";
pub const USERNAME_TAKEN: &str = "An account with this email already exists.";
pub const INVALID_CREDENTIALS_FORMAT: &str =
    "Enter a valid email address and a password of at least 8 characters.";

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hashing password: {e}"))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Credential check against the user store. `None` means the credentials
/// don't match an account; callers fall back to the default failure text.
pub(crate) async fn authenticate(
    ctx: &Ctx,
    username: &str,
    password: &str,
) -> Option<SessionUser> {
    let user = match ctx.user_store.get_by_username(username).await {
        Ok(Some(user)) => user,
        Ok(None) => return None,
        Err(e) => {
            error!("Error fetching user {username}: {e}");
            return None;
        }
    };

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(SessionUser {
        id: user.id,
        username: user.username,
        is_admin: user.is_admin,
    })
}

/// Create the account, claim bills submitted before signup and start the
/// session.
pub(crate) async fn create_account(
    ctx: &Ctx,
    session: &Session,
    username: &str,
    password: &str,
) -> Result<SessionUser> {
    let existing = ctx
        .user_store
        .get_by_username(username)
        .await
        .map_err(|e| {
            error!("Error fetching user {username}: {e}");
            Error::Internal
        })?;
    if existing.is_some() {
        return Err(Error::BadRequest(USERNAME_TAKEN.to_string()));
    }

    let password_hash = hash_password(password).map_err(|e| {
        error!("Error hashing password: {e}");
        Error::Internal
    })?;

    let user = ctx
        .user_store
        .create_user(username, &password_hash)
        .await
        .map_err(|e| {
            error!("Error creating user {username}: {e}");
            Error::Internal
        })?;

    claim_pending_bills(ctx, session, user.id).await;

    let session_user = SessionUser {
        id: user.id,
        username: user.username,
        is_admin: user.is_admin,
    };
    session
        .insert(USER_KEY, &session_user)
        .await
        .map_err(|e| {
            error!("Error putting user in session: {e}");
            Error::Internal
        })?;

    Ok(session_user)
}

/// Attach bills submitted from the landing page before the account existed.
async fn claim_pending_bills(ctx: &Ctx, session: &Session, user_id: i64) {
    let pending: Vec<i64> = match session.remove(PENDING_BILLS).await {
        Ok(Some(ids)) => ids,
        Ok(None) => return,
        Err(e) => {
            error!("Error reading pending bills from session: {e}");
            return;
        }
    };
    if pending.is_empty() {
        return;
    }

    match ctx.bill_store.claim_bills(&pending, user_id).await {
        Ok(claimed) => {
            if claimed > 0 {
                ctx.bill_cache.invalidate_user(user_id).await;
                ctx.bill_cache.invalidate_admin().await;
            }
        }
        Err(e) => error!("Error claiming bills {pending:?} for user {user_id}: {e}"),
    }
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(session, auth))]
pub async fn login(session: Session, auth: Auth) -> Result<impl IntoResponse> {
    let template = LoginTemplate {
        flash: take_flash(&session).await.unwrap_or_else(|e| {
            error!("Error taking flash message: {e}");
            None
        }),
        csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
        error: None,
        username: String::new(),
        auth,
    };
    Ok(HtmlTemplate(template))
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, payload))]
pub async fn do_login(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    Form(payload): Form<LoginData>,
) -> Result<impl IntoResponse> {
    let mut rate_limiter = ctx.rate_limiter.lock().await;
    let allowed = rate_limiter.check(&ip.to_string(), Some(&payload.username));
    drop(rate_limiter);
    if !allowed {
        warn!("Rate limited req from {}", &ip.to_string());
        return Err(Error::TooManyRequests);
    }

    verify_csrf(&payload.csrf_token, &session)
        .await
        .map_err(|_| Error::Unauthorized)?;

    if !payload.validate() {
        return login_failure(&session, auth, &payload.username, INVALID_CREDENTIALS_FORMAT).await;
    }

    let Some(user) = authenticate(&ctx, &payload.username, &payload.password).await else {
        return login_failure(&session, auth, &payload.username, DEFAULT_LOGIN_FAILURE).await;
    };

    session.insert(USER_KEY, &user).await.map_err(|e| {
        error!("Error putting user in session: {e}");
        Error::Internal
    })?;

    Ok(Redirect::to("/dashboard").into_response())
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(session, auth))]
pub async fn signup(session: Session, auth: Auth) -> Result<impl IntoResponse> {
    let template = SignupTemplate {
        flash: take_flash(&session).await.unwrap_or_else(|e| {
            error!("Error taking flash message: {e}");
            None
        }),
        csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
        error: None,
        username: String::new(),
        auth,
    };
    Ok(HtmlTemplate(template))
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(ctx, session, auth, payload))]
pub async fn do_signup(
    RealIp(ip): RealIp,
    session: Session,
    auth: Auth,
    State(ctx): State<Ctx>,
    Form(payload): Form<SignupData>,
) -> Result<impl IntoResponse> {
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

    if !payload.validate() {
        return signup_failure(&session, auth, &payload.username, INVALID_CREDENTIALS_FORMAT).await;
    }

    match create_account(&ctx, &session, &payload.username, &payload.password).await {
        Ok(_) => Ok(Redirect::to("/dashboard").into_response()),
        Err(Error::BadRequest(msg)) => signup_failure(&session, auth, &payload.username, &msg).await,
        Err(e) => Err(e),
    }
}

/// Re-render the login form with the failure text inline.
async fn login_failure(
    session: &Session,
    auth: Auth,
    username: &str,
    message: &str,
) -> Result<Response> {
    Ok(HtmlTemplate(LoginTemplate {
        flash: None,
        csrf_token: gen_csrf(session).await.map_err(|_| Error::Internal)?,
        error: Some(message.to_string()),
        username: username.to_string(),
        auth,
    })
    .into_response())
}

/// Re-render the signup form with the failure text inline.
async fn signup_failure(
    session: &Session,
    auth: Auth,
    username: &str,
    message: &str,
) -> Result<Response> {
    Ok(HtmlTemplate(SignupTemplate {
        flash: None,
        csrf_token: gen_csrf(session).await.map_err(|_| Error::Internal)?,
        error: Some(message.to_string()),
        username: username.to_string(),
        auth,
    })
    .into_response())
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(session))]
pub async fn logout(session: Session) -> Result<impl IntoResponse> {
    session.delete().await.map_err(|e| {
        error!("Error logging out: {e}");
        Error::Internal
    })?;
    Ok(Redirect::to("/"))
}
