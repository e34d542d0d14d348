//! Borrower registry endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::borrower::{Borrower, BorrowerLoanEntry, BorrowerSummary, CreateBorrower, UpdateBlocked},
    AppState,
};

use super::{parse_class, AppJson, AuthenticatedAdmin, OkResponse};

/// Register a borrower
#[utoipa::path(
    post,
    path = "/borrowers",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    request_body = CreateBorrower,
    responses(
        (status = 201, description = "Borrower registered", body = Borrower),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Document id already registered")
    )
)]
pub async fn register_borrower(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    AppJson(data): AppJson<CreateBorrower>,
) -> AppResult<(StatusCode, Json<Borrower>)> {
    let borrower = state
        .services
        .borrowers
        .register_borrower(data, &claims.sub)
        .await?;
    Ok((StatusCode::CREATED, Json(borrower)))
}

/// List blocked borrowers
#[utoipa::path(
    get,
    path = "/borrowers/blocked",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Blocked borrowers", body = Vec<BorrowerSummary>)
    )
)]
pub async fn list_blocked(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
) -> AppResult<Json<Vec<BorrowerSummary>>> {
    let borrowers = state.services.borrowers.list_blocked().await?;
    Ok(Json(borrowers))
}

/// Get borrower by document id
#[utoipa::path(
    get,
    path = "/borrowers/{id}",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrower document id")),
    responses(
        (status = 200, description = "Borrower details", body = Borrower),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn get_borrower(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(id): Path<i64>,
) -> AppResult<Json<Borrower>> {
    let borrower = state.services.borrowers.get_borrower(id).await?;
    Ok(Json(borrower))
}

/// Block or unblock a borrower
#[utoipa::path(
    put,
    path = "/borrowers/{id}/blocked",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrower document id")),
    request_body = UpdateBlocked,
    responses(
        (status = 200, description = "Borrower updated", body = Borrower),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn set_blocked(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path(id): Path<i64>,
    AppJson(data): AppJson<UpdateBlocked>,
) -> AppResult<Json<Borrower>> {
    let borrower = state
        .services
        .borrowers
        .set_blocked(id, data.blocked, &claims.sub)
        .await?;
    Ok(Json(borrower))
}

/// Loan history of a borrower for one asset class
#[utoipa::path(
    get,
    path = "/borrowers/{id}/history/{class}",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Borrower document id"),
        ("class" = String, Path, description = "books, devices, calculators or textbooks")
    ),
    responses(
        (status = 200, description = "Loan history, oldest first", body = Vec<BorrowerLoanEntry>),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn loan_history(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path((id, class)): Path<(i64, String)>,
) -> AppResult<Json<Vec<BorrowerLoanEntry>>> {
    let class = parse_class(&class)?;
    let history = state.services.borrowers.history(id, class).await?;
    Ok(Json(history))
}

/// E-mail a borrower about the asset of a class they hold
#[utoipa::path(
    post,
    path = "/borrowers/{id}/reminders/{class}",
    tag = "borrowers",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Borrower document id"),
        ("class" = String, Path, description = "books, devices, calculators or textbooks")
    ),
    responses(
        (status = 200, description = "Reminder sent", body = OkResponse),
        (status = 404, description = "Borrower not found or holds nothing of the class"),
        (status = 502, description = "E-mail delivery failed")
    )
)]
pub async fn remind_borrower(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path((id, class)): Path<(i64, String)>,
) -> AppResult<Json<OkResponse>> {
    let class = parse_class(&class)?;
    let msg = state
        .services
        .reminders
        .remind_borrower(id, class, &claims.sub)
        .await?;
    Ok(Json(OkResponse::new(msg)))
}
