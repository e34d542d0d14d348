//! Router tests: the full HTTP stack over the in-memory ledger store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use knowledge_centre_server::{
    api,
    config::AppConfig,
    models::{
        admin::AdminClaims,
        asset::AssetClass,
        borrower::{Borrower, CreateBorrower},
    },
    repository::{InMemoryStore, Repository},
    services::{audit::LogAuditSink, email::EmailService, Services},
    AppState,
};

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
    token: String,
}

fn test_app() -> TestApp {
    let config = AppConfig::default();

    // Admin accounts are never touched by these tests, so the pool never connects
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .unwrap();
    let store = Arc::new(InMemoryStore::new());
    let services = Services::new(
        &config,
        Repository::new(pool),
        store.clone(),
        Arc::new(EmailService::new(config.email.clone(), config.notifications.timeout())),
        Arc::new(LogAuditSink),
        None,
    );

    let now = Utc::now().timestamp();
    let token = AdminClaims {
        sub: "librarian@school.edu".to_string(),
        admin_id: 1,
        name: "Marta Gil".to_string(),
        exp: now + 3600,
        iat: now,
    }
    .create_token(&config.auth.jwt_secret)
    .unwrap();

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    TestApp {
        router: api::router(state),
        store,
        token,
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));

        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn borrower(&self, document_id: i64) {
        let (status, _) = self
            .send(
                Method::POST,
                "/borrowers",
                Some(json!({
                    "document_id": document_id,
                    "first_name": "Sofia",
                    "last_name": "Mendez",
                    "grade": "10",
                    "section": "B",
                    "email": format!("sofia{}@school.edu", document_id)
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn device(&self, number: i32) {
        let (status, _) = self
            .send(
                Method::POST,
                "/assets/devices",
                Some(json!({ "code": "ipad", "number": number, "title": "iPad 9th gen" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ready_reports_store_outage() {
    let app = test_app();
    let (status, _) = app.send(Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    app.store.set_offline(true);
    let (status, body) = app.send(Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 3);
}

#[tokio::test]
async fn test_ledger_routes_require_token() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/api/v1/assets/devices/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_class_is_rejected() {
    let app = test_app();
    let (status, body) = app.send(Method::GET, "/assets/laptops", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
    assert_eq!(body["code"], 18);
}

#[tokio::test]
async fn test_checkout_checkin_flow() {
    let app = test_app();
    app.borrower(42).await;
    app.borrower(43).await;
    app.device(1).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkout",
            Some(json!({ "borrower_id": "42", "asset": { "code": "IPAD", "number": 1 } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["borrower_id"], 42);

    let (status, body) = app.send(Method::GET, "/assets/devices/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert!(body["anomalies"].as_array().unwrap().is_empty());
    assert_eq!(body["data"][0]["borrower"]["document_id"], 42);

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkout",
            Some(json!({ "borrower_id": 43, "asset": { "code": "IPAD", "number": 1 } })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 7);

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkin",
            Some(json!({ "asset": { "code": "IPAD", "number": 1 }, "conditions": "fine" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkin",
            Some(json!({ "asset": { "code": "IPAD", "number": 1 } })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 13);

    let (status, body) = app.send(Method::GET, "/borrowers/42/history/devices", None).await;
    assert_eq!(status, StatusCode::OK);
    let history = body.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0]["checked_in_at"].is_string());
}

#[tokio::test]
async fn test_checkout_error_mapping() {
    let app = test_app();
    app.borrower(7).await;
    app.device(2).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkout",
            Some(json!({ "borrower_id": 999, "asset": { "code": "IPAD", "number": 2 } })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 4);

    let (status, _) = app
        .send(
            Method::PUT,
            "/borrowers/7/blocked",
            Some(json!({ "blocked": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkout",
            Some(json!({ "borrower_id": 7, "asset": { "code": "IPAD", "number": 2 } })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 12);

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/books/checkout",
            Some(json!({ "borrower_id": 7, "asset": { "code": "BK-001" } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 18);
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = test_app();
    app.borrower(5).await;
    app.device(4).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/assets/devices/checkout",
            Some(json!({ "borrower_id": 5, "asset": { "code": "IPAD", "number": "abc" } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
    assert_eq!(body["code"], 18);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/v1/borrowers")
                .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"document_id\": 6,"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], 18);

    let (status, _) = app.send(Method::GET, "/assets/devices/item?code=IPAD&number=4", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_item_lookup_and_delete_guard() {
    let app = test_app();
    app.borrower(5).await;
    app.device(3).await;

    app.send(
        Method::POST,
        "/assets/devices/checkout",
        Some(json!({ "borrower_id": 5, "asset": { "code": "IPAD", "number": 3 } })),
    )
    .await;

    let (status, body) = app
        .send(Method::GET, "/assets/devices/item?code=ipad&number=3", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["holder"]["document_id"], 5);

    let (status, body) = app
        .send(Method::DELETE, "/assets/devices/item?code=IPAD&number=3", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 15);

    let (status, _) = app
        .send(Method::GET, "/assets/devices/item?code=IPAD&number=99", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_active_view_reports_flag_without_asset() {
    let app = test_app();
    let mut borrower = Borrower::register(CreateBorrower {
        document_id: 31,
        first_name: "Tomas".into(),
        last_name: "Ruiz".into(),
        grade: None,
        section: None,
        email: "tomas@school.edu".into(),
    });
    borrower.loans.set(AssetClass::Device, true);
    app.store.put_borrower(borrower).await;

    let (status, body) = app.send(Method::GET, "/assets/devices/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
    assert_eq!(body["anomalies"][0]["kind"], "borrower_without_asset");
    assert_eq!(body["anomalies"][0]["borrower"]["document_id"], 31);
}
