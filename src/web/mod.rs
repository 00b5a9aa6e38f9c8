use axum::{
    Router,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tower_sessions::{
    Expiry, Session, SessionManagerLayer,
    cookie::{SameSite, time::Duration},
};

use crate::{
    Config, Ctx,
    web::{
        bill::data::BillFormState,
        csrf::gen_csrf,
        error::Error,
        flash::take_flash,
        session::Auth,
        templates::{HomeTemplate, HtmlTemplate},
    },
};

mod bill;
pub mod cache;
mod csrf;
mod error;
pub mod files;
mod flash;
pub mod rate_limit;
pub mod session;
mod templates;
mod user;

pub type Result<T> = std::result::Result<T, error::Error>;

pub const SESSION_EXPIRATION_SEC: i64 = 60 * 30; // 30 min
pub const CSRF_TOKEN: &str = "csrf_token";
pub const USER_KEY: &str = "user";
pub const FLASH_KEY: &str = "flash";
pub const PENDING_BILLS: &str = "pending_bills";

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResp {
    pub error: String,
}

impl ErrorResp {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResp {
    pub message: String,
}

impl SuccessResp {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

pub fn router(ctx: Ctx, cfg: &Config) -> Router {
    let sessions = SessionManagerLayer::new(ctx.session_store.clone())
        .with_secure(cfg.cookie_secure)
        .with_domain(cfg.domain.clone())
        .with_same_site(SameSite::Strict)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            SESSION_EXPIRATION_SEC,
        )))
        .with_http_only(true);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(
            "/api/bills",
            get(bill::rest::list_bills).post(bill::rest::create_bill),
        )
        .route("/api/bills/{id}/pay", post(bill::rest::pay_bill))
        .route("/api/admin/bills", get(bill::rest::admin_bills))
        .route("/api/register", post(user::rest::register))
        .route("/api/login", post(user::rest::login))
        .route("/api/logout", post(user::rest::logout))
        .route("/api/user", get(user::rest::current_user))
        .layer(cors);

    let web = Router::new()
        .nest_service(
            "/static",
            ServeDir::new(format!("{}/static", env!("CARGO_MANIFEST_DIR"))),
        )
        .nest_service("/uploads", ServeDir::new(ctx.files.dir()))
        .route("/health", get(health))
        .route("/", get(home))
        .route("/bills", post(bill::ssr::submit_landing))
        .route("/login", get(user::login).post(user::do_login))
        .route("/signup", get(user::signup).post(user::do_signup))
        .route("/logout", get(user::logout))
        .route("/dashboard", get(bill::ssr::dashboard))
        .route("/dashboard/bills", post(bill::ssr::submit_dashboard))
        .route(
            "/dashboard/bills/{id}/pay",
            get(bill::ssr::pay_confirm).post(bill::ssr::pay),
        )
        .route("/admin", get(bill::ssr::admin))
        .route("/admin/bills/{id}/status", post(bill::ssr::admin_set_status))
        .merge(api)
        .fallback(not_found)
        .layer(sessions);
    Router::new().merge(web).with_state(ctx)
}

async fn health() -> Result<&'static str> {
    Ok("OK")
}

#[tracing::instrument(level = tracing::Level::DEBUG, skip(session, auth))]
pub async fn home(session: Session, auth: Auth) -> Result<impl IntoResponse> {
    let flash = take_flash(&session).await.unwrap_or_else(|e| {
        tracing::error!("Error taking flash message: {e}");
        None
    });
    Ok(HtmlTemplate(HomeTemplate {
        auth,
        flash,
        csrf_token: gen_csrf(&session).await.map_err(|_| Error::Internal)?,
        form: BillFormState::default(),
    }))
}

async fn not_found() -> Error {
    Error::NotFound("Page Not Found".to_string())
}
