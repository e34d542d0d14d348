//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{assets, auth, borrowers, events, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Knowledge Centre API",
        version = "1.0.0",
        description = "Lending ledger for the school library: books, devices, calculators and textbooks"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::signup,
        auth::login,
        auth::me,
        // Events
        events::stream_events,
        // Borrowers
        borrowers::register_borrower,
        borrowers::list_blocked,
        borrowers::get_borrower,
        borrowers::set_blocked,
        borrowers::loan_history,
        borrowers::remind_borrower,
        // Assets
        assets::list_assets,
        assets::register_asset,
        assets::list_available,
        assets::get_item,
        assets::delete_item,
        // Lending
        assets::checkout,
        assets::checkin,
        assets::list_active_loans,
        assets::remind_holders,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            crate::models::admin::AdminInfo,
            crate::models::admin::SignupRequest,
            // Borrowers
            crate::models::borrower::Borrower,
            crate::models::borrower::BorrowerSummary,
            crate::models::borrower::BorrowerLoanEntry,
            crate::models::borrower::LoanFlags,
            crate::models::borrower::CreateBorrower,
            crate::models::borrower::UpdateBlocked,
            // Assets
            crate::models::asset::Asset,
            crate::models::asset::AssetClass,
            crate::models::asset::AssetKey,
            crate::models::asset::AssetKeyInput,
            crate::models::asset::AssetSummary,
            crate::models::asset::AssetDetails,
            crate::models::asset::CreateAsset,
            crate::models::asset::DueDate,
            crate::models::asset::RentalEntry,
            // Lending
            crate::models::loan::CheckoutRequest,
            crate::models::loan::CheckinRequest,
            crate::models::loan::ActiveLoan,
            crate::models::loan::LoanAnomaly,
            assets::LoanResponse,
            assets::ActiveLoansResponse,
            assets::RemindersResponse,
            super::OkResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Admin authentication"),
        (name = "events", description = "Realtime ledger events"),
        (name = "borrowers", description = "Borrower registry"),
        (name = "assets", description = "Asset registry"),
        (name = "lending", description = "Checkout, checkin and active loans")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
