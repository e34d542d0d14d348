//! API handlers for the Knowledge Centre REST endpoints

pub mod assets;
pub mod auth;
pub mod borrowers;
pub mod events;
pub mod health;
pub mod openapi;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult, LendingError},
    models::{admin::AdminClaims, asset::AssetClass},
    AppState,
};

/// Extractor for the authenticated admin from the JWT bearer token
pub struct AuthenticatedAdmin(pub AdminClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        if !auth_header.starts_with("Bearer ") {
            return Err(AppError::Authentication("Invalid authorization header format".to_string()));
        }

        let token = &auth_header[7..];

        let claims = AdminClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedAdmin(claims))
    }
}

/// JSON request body whose rejections render as the usual error envelope
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Lending(LendingError::InvalidInput(rejection.body_text()))
    }
}

/// Plain success body
#[derive(Serialize, ToSchema)]
pub struct OkResponse {
    /// Always `ok`
    pub status: String,
    pub msg: String,
}

impl OkResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            msg: msg.into(),
        }
    }
}

/// Asset class from a path segment (`books`, `devices`, ...)
pub(crate) fn parse_class(raw: &str) -> AppResult<AssetClass> {
    raw.parse::<AssetClass>()
        .map_err(|e| LendingError::InvalidInput(e).into())
}

/// Build the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Realtime
        .route("/events", get(events::stream_events))
        // Borrowers
        .route("/borrowers", post(borrowers::register_borrower))
        .route("/borrowers/blocked", get(borrowers::list_blocked))
        .route("/borrowers/:id", get(borrowers::get_borrower))
        .route("/borrowers/:id/blocked", put(borrowers::set_blocked))
        .route("/borrowers/:id/history/:class", get(borrowers::loan_history))
        .route("/borrowers/:id/reminders/:class", post(borrowers::remind_borrower))
        // Assets
        .route(
            "/assets/:class",
            get(assets::list_assets).post(assets::register_asset),
        )
        .route("/assets/:class/available", get(assets::list_available))
        .route("/assets/:class/active", get(assets::list_active_loans))
        .route("/assets/:class/checkout", post(assets::checkout))
        .route("/assets/:class/checkin", post(assets::checkin))
        .route("/assets/:class/reminders", post(assets::remind_holders))
        .route(
            "/assets/:class/item",
            get(assets::get_item).delete(assets::delete_item),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
