//! Asset registry and lending endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        asset::{Asset, AssetDetails, AssetKey, AssetKeyInput, CreateAsset, DueDate},
        loan::{ActiveLoan, CheckinRequest, CheckoutRequest, Confirmation, LoanAnomaly},
    },
    AppState,
};

use super::{parse_class, AppJson, AuthenticatedAdmin, OkResponse};

/// Checkout or checkin result
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    /// Always `ok`
    pub status: String,
    pub msg: String,
    pub asset: AssetKey,
    pub borrower_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDate>,
}

impl From<Confirmation> for LoanResponse {
    fn from(confirmation: Confirmation) -> Self {
        Self {
            status: "ok".to_string(),
            msg: confirmation.msg,
            asset: confirmation.asset,
            borrower_id: confirmation.borrower_id,
            due_date: confirmation.due_date,
        }
    }
}

/// Active loans of a class with the anomalies found while pairing them
#[derive(Serialize, ToSchema)]
pub struct ActiveLoansResponse {
    /// Always `ok`
    pub status: String,
    pub msg: String,
    pub data: Vec<ActiveLoan>,
    pub anomalies: Vec<LoanAnomaly>,
}

/// Bulk reminder result
#[derive(Serialize, ToSchema)]
pub struct RemindersResponse {
    /// Always `ok`
    pub status: String,
    pub msg: String,
    /// Number of borrowers e-mailed
    pub notified: usize,
}

/// List every registered asset of a class
#[utoipa::path(
    get,
    path = "/assets/{class}",
    tag = "assets",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    responses(
        (status = 200, description = "Assets of the class", body = Vec<Asset>),
        (status = 400, description = "Unknown asset class")
    )
)]
pub async fn list_assets(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(class): Path<String>,
) -> AppResult<Json<Vec<Asset>>> {
    let class = parse_class(&class)?;
    let assets = state.services.catalog.list_assets(class).await?;
    Ok(Json(assets))
}

/// Register a new asset
#[utoipa::path(
    post,
    path = "/assets/{class}",
    tag = "assets",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    request_body = CreateAsset,
    responses(
        (status = 201, description = "Asset registered", body = Asset),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Asset already registered")
    )
)]
pub async fn register_asset(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path(class): Path<String>,
    AppJson(data): AppJson<CreateAsset>,
) -> AppResult<(StatusCode, Json<Asset>)> {
    let class = parse_class(&class)?;
    let asset = state
        .services
        .catalog
        .register_asset(class, data, &claims.sub)
        .await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

/// List assets of a class that can be checked out
#[utoipa::path(
    get,
    path = "/assets/{class}/available",
    tag = "assets",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    responses(
        (status = 200, description = "Available assets", body = Vec<Asset>)
    )
)]
pub async fn list_available(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(class): Path<String>,
) -> AppResult<Json<Vec<Asset>>> {
    let class = parse_class(&class)?;
    let assets = state.services.catalog.list_available(class).await?;
    Ok(Json(assets))
}

/// Get one asset and its current holder
#[utoipa::path(
    get,
    path = "/assets/{class}/item",
    tag = "assets",
    security(("bearer_auth" = [])),
    params(
        ("class" = String, Path, description = "books, devices, calculators or textbooks"),
        AssetKeyInput
    ),
    responses(
        (status = 200, description = "Asset details", body = AssetDetails),
        (status = 404, description = "Asset not found")
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(class): Path<String>,
    Query(key): Query<AssetKeyInput>,
) -> AppResult<Json<AssetDetails>> {
    let key = key.into_key(parse_class(&class)?)?;
    let details = state.services.catalog.lookup_holder(&key).await?;
    Ok(Json(details))
}

/// Delete an asset that is not on loan
#[utoipa::path(
    delete,
    path = "/assets/{class}/item",
    tag = "assets",
    security(("bearer_auth" = [])),
    params(
        ("class" = String, Path, description = "books, devices, calculators or textbooks"),
        AssetKeyInput
    ),
    responses(
        (status = 200, description = "Asset deleted", body = OkResponse),
        (status = 404, description = "Asset not found"),
        (status = 409, description = "Asset is on loan")
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path(class): Path<String>,
    Query(key): Query<AssetKeyInput>,
) -> AppResult<Json<OkResponse>> {
    let key = key.into_key(parse_class(&class)?)?;
    state.services.catalog.delete_asset(&key, &claims.sub).await?;
    Ok(Json(OkResponse::new(format!("The {} was deleted.", key))))
}

/// Check an asset out to a borrower
#[utoipa::path(
    post,
    path = "/assets/{class}/checkout",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Asset checked out", body = LoanResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Borrower or asset not found"),
        (status = 409, description = "Asset already on loan"),
        (status = 422, description = "Borrower blocked or already holding this class"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path(class): Path<String>,
    AppJson(request): AppJson<CheckoutRequest>,
) -> AppResult<Json<LoanResponse>> {
    let class = parse_class(&class)?;
    let confirmation = state
        .services
        .ledger
        .checkout(class, request, &claims.sub)
        .await?;
    Ok(Json(confirmation.into()))
}

/// Check an asset back in
#[utoipa::path(
    post,
    path = "/assets/{class}/checkin",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Asset checked in", body = LoanResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Asset not on loan or holder missing"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn checkin(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path(class): Path<String>,
    AppJson(request): AppJson<CheckinRequest>,
) -> AppResult<Json<LoanResponse>> {
    let class = parse_class(&class)?;
    let confirmation = state
        .services
        .ledger
        .checkin(class, request, &claims.sub)
        .await?;
    Ok(Json(confirmation.into()))
}

/// Who holds what, plus any inconsistencies between the two collections
#[utoipa::path(
    get,
    path = "/assets/{class}/active",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    responses(
        (status = 200, description = "Active loans", body = ActiveLoansResponse),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_active_loans(
    State(state): State<AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(class): Path<String>,
) -> AppResult<Json<ActiveLoansResponse>> {
    let class = parse_class(&class)?;
    let view = state.services.ledger.list_active_loans(class).await?;

    let msg = if view.anomalies.is_empty() {
        format!("{} {} on loan", view.loans.len(), class)
    } else {
        format!(
            "{} {} on loan, {} anomalies found",
            view.loans.len(),
            class,
            view.anomalies.len()
        )
    };

    Ok(Json(ActiveLoansResponse {
        status: "ok".to_string(),
        msg,
        data: view.loans,
        anomalies: view.anomalies,
    }))
}

/// E-mail every current holder of a class
#[utoipa::path(
    post,
    path = "/assets/{class}/reminders",
    tag = "lending",
    security(("bearer_auth" = [])),
    params(("class" = String, Path, description = "books, devices, calculators or textbooks")),
    responses(
        (status = 200, description = "Reminders sent", body = RemindersResponse),
        (status = 502, description = "E-mail delivery failed")
    )
)]
pub async fn remind_holders(
    State(state): State<AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    Path(class): Path<String>,
) -> AppResult<Json<RemindersResponse>> {
    let class = parse_class(&class)?;
    let notified = state
        .services
        .reminders
        .remind_all(class, &claims.sub)
        .await?;

    Ok(Json(RemindersResponse {
        status: "ok".to_string(),
        msg: format!("{} borrowers holding {} were reminded.", notified, class),
        notified,
    }))
}
