use std::net::SocketAddr;

use axum::{Extension, extract::ConnectInfo, http::StatusCode};
use axum_test::{
    TestServer, TestServerConfig,
    multipart::{MultipartForm, Part},
};
use billpay::{Config, Ctx, web};
use serde_json::{Value, json};

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn test_config(upload_dir: &str) -> Config {
    Config {
        address: "127.0.0.1:0".parse().unwrap(),
        domain: "localhost".to_string(),
        cookie_secure: false,
        log_level: "debug".to_string(),
        db_user: String::new(),
        db_password: String::new(),
        db_name: String::new(),
        db_host: String::new(),
        upload_dir: upload_dir.to_string(),
    }
}

fn test_server() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path().to_str().unwrap());
    let ctx = Ctx::in_memory(&cfg).unwrap();

    let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    let app = web::router(ctx, &cfg).layer(Extension(ConnectInfo(addr)));

    let config = TestServerConfig {
        save_cookies: true,
        ..TestServerConfig::default()
    };
    (TestServer::new_with_config(app, config), dir)
}

fn bill_form(account_type: &str, account_number: &str, amount: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("accountType", account_type)
        .add_text("accountNumber", account_number)
        .add_text("amount", amount)
}

/// Pulls the csrf token out of a rendered form.
fn csrf_from(html: &str) -> String {
    let marker = "name=\"csrf_token\" value=\"";
    let start = html.find(marker).expect("csrf token in page") + marker.len();
    let end = html[start..].find('"').expect("closing quote") + start;
    html[start..end].to_string()
}

async fn register(server: &TestServer, username: &str) {
    let res = server
        .post("/api/register")
        .json(&json!({"username": username, "password": "password1"}))
        .await;
    res.assert_status(StatusCode::CREATED);
}

async fn create_bill(server: &TestServer, account_number: &str, amount: &str) -> Value {
    let res = server
        .post("/api/bills")
        .multipart(bill_form("business", account_number, amount))
        .await;
    res.assert_status(StatusCode::CREATED);
    res.json::<Value>()
}

#[tokio::test]
async fn landing_flow_submits_bill_and_redirects_to_signup() {
    let (server, _dir) = test_server();

    let home = server.get("/").await;
    home.assert_status_ok();
    let csrf = csrf_from(&home.text());

    let res = server
        .post("/bills")
        .multipart(bill_form("business", "ACC12345", "100.00").add_text("csrf_token", csrf))
        .await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/signup");

    // the success notice greets the visitor on the signup page
    let signup = server.get("/signup").await;
    signup.assert_status_ok();
    let signup_html = signup.text();
    assert!(signup_html.contains("Bill information saved. Let&#x27;s create your account."));

    let res = server
        .post("/signup")
        .form(&[
            ("csrf_token", csrf_from(&signup_html).as_str()),
            ("username", "new@example.com"),
            ("password", "password1"),
        ])
        .await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/dashboard");

    // the pre-signup bill now belongs to the fresh account
    let bills = server.get("/api/bills").await.json::<Value>();
    let bills = bills.as_array().unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0]["accountNumber"], "ACC12345");
}

#[tokio::test]
async fn dashboard_is_not_found_without_a_session() {
    let (server, _dir) = test_server();

    let res = server.get("/dashboard").await;
    res.assert_status_not_found();
}

#[tokio::test]
async fn unknown_routes_fall_through_to_not_found() {
    let (server, _dir) = test_server();

    let res = server.get("/no-such-page").await;
    res.assert_status_not_found();
    assert!(res.text().contains("Page Not Found"));
}

#[tokio::test]
async fn short_account_number_never_reaches_the_store() {
    let (server, _dir) = test_server();

    let res = server
        .post("/api/bills")
        .multipart(bill_form("business", "AC1", "100.00"))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    let body = res.json::<Value>();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("Account number must be at least 5 characters")
    );

    // nothing was persisted
    let all = server.get("/api/admin/bills").await.json::<Value>();
    assert_eq!(all.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn amount_must_carry_two_decimals_or_none() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let res = server
        .post("/api/bills")
        .multipart(bill_form("business", "ACC12345", "12.5"))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let res = server
        .post("/api/bills")
        .multipart(bill_form("business", "ACC12345", "12.50"))
        .await;
    res.assert_status(StatusCode::CREATED);

    let res = server
        .post("/api/bills")
        .multipart(bill_form("business", "ACC12345", "12"))
        .await;
    res.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn created_bill_matches_the_contract_shape() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let bill = create_bill(&server, "ACC12345", "100.00").await;
    assert!(bill["id"].is_i64());
    assert_eq!(bill["accountType"], "business");
    assert_eq!(bill["accountNumber"], "ACC12345");
    assert_eq!(bill["amount"], "100.00");
    assert_eq!(bill["status"], "pending");
    assert_eq!(bill["paymentStatus"], "unpaid");
    assert!(bill["createdAt"].is_string());
    // no image was uploaded, so no image entry
    assert!(bill.get("billImage").is_none());
}

#[tokio::test]
async fn bill_list_refreshes_after_a_submission() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    // prime the cached (empty) list first
    let bills = server.get("/api/bills").await.json::<Value>();
    assert_eq!(bills.as_array().unwrap().len(), 0);

    create_bill(&server, "ACC12345", "100.00").await;

    let bills = server.get("/api/bills").await.json::<Value>();
    assert_eq!(bills.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn paying_transitions_a_bill_exactly_once() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let bill = create_bill(&server, "ACC12345", "100.00").await;
    let id = bill["id"].as_i64().unwrap();

    let res = server.post(&format!("/api/bills/{id}/pay")).await;
    res.assert_status_ok();

    let bills = server.get("/api/bills").await.json::<Value>();
    assert_eq!(bills[0]["paymentStatus"], "paid");

    let res = server.post(&format!("/api/bills/{id}/pay")).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>()["error"], "bill is already paid");
}

#[tokio::test]
async fn paying_requires_a_session() {
    let (server, _dir) = test_server();

    let res = server.post("/api/bills/1/pay").await;
    res.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pay_control_is_disabled_once_paid() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let bill = create_bill(&server, "ACC12345", "100.00").await;
    let id = bill["id"].as_i64().unwrap();

    let dashboard = server.get("/dashboard").await.text();
    assert!(dashboard.contains(&format!("/dashboard/bills/{id}/pay")));
    assert!(!dashboard.contains("disabled"));

    server
        .post(&format!("/api/bills/{id}/pay"))
        .await
        .assert_status_ok();

    let dashboard = server.get("/dashboard").await.text();
    assert!(!dashboard.contains(&format!("/dashboard/bills/{id}/pay")));
    assert!(dashboard.contains("disabled"));
}

#[tokio::test]
async fn login_failure_reports_the_default_message() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;
    server.post("/api/logout").await.assert_status_ok();

    let res = server
        .post("/api/login")
        .json(&json!({"username": "user@example.com", "password": "wrong-password"}))
        .await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    let body = res.json::<Value>();
    assert_eq!(body["ok"], false);
    assert_eq!(
        body["message"],
        "User not found. Please check your credentials."
    );

    // same text inline on the login page
    let login = server.get("/login").await.text();
    let res = server
        .post("/login")
        .form(&[
            ("csrf_token", csrf_from(&login).as_str()),
            ("username", "user@example.com"),
            ("password", "wrong-password"),
        ])
        .await;
    res.assert_status_ok();
    assert!(res.text().contains("User not found. Please check your credentials."));
}

#[tokio::test]
async fn successful_login_opens_the_dashboard() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;
    server.post("/api/logout").await.assert_status_ok();
    server.get("/dashboard").await.assert_status_not_found();

    let login = server.get("/login").await.text();
    let res = server
        .post("/login")
        .form(&[
            ("csrf_token", csrf_from(&login).as_str()),
            ("username", "user@example.com"),
            ("password", "password1"),
        ])
        .await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/dashboard");

    server.get("/dashboard").await.assert_status_ok();
}

#[tokio::test]
async fn admin_listing_is_reachable_without_a_session() {
    let (server, _dir) = test_server();

    create_bill(&server, "ACC12345", "100.00").await;

    let res = server.get("/api/admin/bills").await;
    res.assert_status_ok();
    let bills = res.json::<Value>();
    let bills = bills.as_array().unwrap();
    assert_eq!(bills.len(), 1);
    // unclaimed bill, so no username entry yet
    assert!(bills[0].get("username").is_none());

    server.get("/admin").await.assert_status_ok();
}

#[tokio::test]
async fn admin_decision_requires_an_admin_session() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let bill = create_bill(&server, "ACC12345", "100.00").await;
    let id = bill["id"].as_i64().unwrap();

    // the decision forms are not even rendered for a non-admin session
    let admin = server.get("/admin").await.text();
    assert!(!admin.contains("/status"));

    let res = server
        .post(&format!("/admin/bills/{id}/status"))
        .form(&[("csrf_token", "irrelevant"), ("status", "approved")])
        .await;
    res.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_signup_is_rejected() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let res = server
        .post("/api/register")
        .json(&json!({"username": "user@example.com", "password": "password1"}))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        res.json::<Value>()["error"],
        "An account with this email already exists."
    );
}

#[tokio::test]
async fn uploaded_image_is_stored_and_served() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let mut png = PNG_MAGIC.to_vec();
    png.extend_from_slice(&[0u8; 64]);

    let form = bill_form("residential", "ACC12345", "55.00").add_part(
        "billImage",
        Part::bytes(png).file_name("bill.png").mime_type("image/png"),
    );
    let res = server.post("/api/bills").multipart(form).await;
    res.assert_status(StatusCode::CREATED);

    let image_path = res.json::<Value>()["billImage"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(image_path.starts_with("/uploads/"));

    server.get(&image_path).await.assert_status_ok();
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let (server, _dir) = test_server();
    register(&server, "user@example.com").await;

    let form = bill_form("residential", "ACC12345", "55.00").add_part(
        "billImage",
        Part::bytes(b"definitely not an image".to_vec())
            .file_name("bill.png")
            .mime_type("image/png"),
    );
    let res = server.post("/api/bills").multipart(form).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>()["error"], "File is not a recognized image");
}

#[tokio::test]
async fn current_user_follows_the_session() {
    let (server, _dir) = test_server();

    server
        .get("/api/user")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    register(&server, "user@example.com").await;
    let user = server.get("/api/user").await.json::<Value>();
    assert_eq!(user["username"], "user@example.com");
    assert_eq!(user["isAdmin"], false);

    server.post("/api/logout").await.assert_status_ok();
    server
        .get("/api/user")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
