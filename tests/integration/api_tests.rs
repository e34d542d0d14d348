//! API integration tests against a running server.
//!
//! They expect an admin `KC_TEST_EMAIL` / `KC_TEST_PASSWORD` (defaults below)
//! to exist already.

use reqwest::Client;
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:5001/api/v1";

fn credentials() -> (String, String) {
    (
        std::env::var("KC_TEST_EMAIL").unwrap_or_else(|_| "librarian@school.edu".to_string()),
        std::env::var("KC_TEST_PASSWORD").unwrap_or_else(|_| "librarian123".to_string()),
    )
}

/// Helper to get an admin token
async fn get_auth_token(client: &Client) -> String {
    let (email, password) = credentials();
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Document ids unlikely to collide between runs
fn unique_id() -> i64 {
    chrono::Utc::now().timestamp_micros() % 1_000_000_000
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();
    let (email, password) = credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (email, _) = credentials();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": "wrong-password" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/borrowers/blocked", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_book_loan_round_trip() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let document_id = unique_id();
    let barcode = format!("IT-{}", document_id);

    let response = client
        .post(format!("{}/borrowers", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "document_id": document_id,
            "first_name": "Integration",
            "last_name": "Test",
            "email": "integration@school.edu"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/assets/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "code": barcode, "title": "Cien años de soledad" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/assets/books/checkout", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "borrower_id": document_id,
            "asset": { "code": barcode },
            "due_date": "2030-12-01"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["due_date"], "12/01/2030");

    let response = client
        .post(format!("{}/assets/books/checkin", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "asset": { "code": barcode } }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);

    let response = client
        .delete(format!("{}/assets/books/item?code={}", BASE_URL, barcode))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore]
async fn test_active_loans() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/assets/devices/active", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
    assert!(body["data"].is_array());
    assert!(body["anomalies"].is_array());
}
