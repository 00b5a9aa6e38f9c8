use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::web::{
    bill::data::{AdminBillRow, BillFormState, BillRow},
    flash::Flash,
    session::Auth,
};

use super::error::Error;

pub struct HtmlTemplate<T>(pub T);

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub error: String,
}

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                tracing::error!("Error rendering template: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error rendering template",
                )
                    .into_response()
            }
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub auth: Auth,
    pub flash: Option<Flash>,
    pub csrf_token: String,
    pub form: BillFormState,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub auth: Auth,
    pub flash: Option<Flash>,
    pub csrf_token: String,
    pub error: Option<String>,
    pub username: String,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub auth: Auth,
    pub flash: Option<Flash>,
    pub csrf_token: String,
    pub error: Option<String>,
    pub username: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub auth: Auth,
    pub flash: Option<Flash>,
    pub csrf_token: String,
    pub bills: Vec<BillRow>,
    pub form: BillFormState,
}

#[derive(Template)]
#[template(path = "pay.html")]
pub struct PayTemplate {
    pub auth: Auth,
    pub csrf_token: String,
    pub bill: BillRow,
}

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub auth: Auth,
    pub flash: Option<Flash>,
    pub csrf_token: String,
    pub bills: Vec<AdminBillRow>,
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let response = match self {
            Error::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("Internal Server Error"),
            ),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, String::from("Unauthorized")),
            Error::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                String::from("Please try again later"),
            ),
        };

        (
            response.0,
            HtmlTemplate(ErrorTemplate { error: response.1 }),
        )
            .into_response()
    }
}
