//! Admin authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::admin::{AdminInfo, SignupRequest},
    AppState,
};

use super::{AppJson, AuthenticatedAdmin};

/// Login request
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// JWT access token
    pub token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    pub admin: AdminInfo,
}

/// Create an admin account (allow-listed e-mails only)
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Admin created", body = AdminInfo),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "E-mail not allowed"),
        (status = 409, description = "Admin already exists")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(request): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<AdminInfo>)> {
    let admin = state.services.auth.signup(request).await?;
    Ok((StatusCode::CREATED, Json(admin)))
}

/// Authenticate and get a JWT
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, admin) = state
        .services
        .auth
        .login(&request.email, &request.password)
        .await?;

    tracing::info!("Admin {} logged in", admin.email);

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.services.auth.expiration_seconds(),
        admin: AdminInfo::from(&admin),
    }))
}

/// Get the current admin
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current admin", body = AdminInfo),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
) -> AppResult<Json<AdminInfo>> {
    let admin = state.services.auth.get_admin(claims.admin_id).await?;
    Ok(Json(admin))
}
