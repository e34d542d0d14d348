//! Error types for the Knowledge Centre server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::asset::{AssetClass, AssetKey};

/// Numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    StoreUnavailable = 3,
    NoSuchBorrower = 4,
    NoSuchAsset = 5,
    AssetUnavailable = 7,
    Duplicate = 8,
    AlreadyHolding = 11,
    BorrowerBlocked = 12,
    AssetNotOnLoan = 13,
    HolderNotFound = 14,
    AssetInCirculation = 15,
    BadValue = 18,
}

/// Failures of the lending protocol and of the ledger store.
///
/// Precondition failures are detected before any write. When a store write
/// fails after the first half of a checkout or checkin has committed, the
/// ledger undoes that half before returning the error; if the undo fails too,
/// the half-applied state is recorded as an anomaly in the audit log.
#[derive(Error, Debug)]
pub enum LendingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Borrower {0} does not appear in our database")]
    BorrowerNotFound(i64),

    #[error("Borrower {0} is blocked and cannot check out items")]
    BorrowerBlocked(i64),

    #[error("Borrower {borrower_id} currently has a {} on loan", .class.label())]
    BorrowerAlreadyHolding { borrower_id: i64, class: AssetClass },

    #[error("The {0} is not registered in our database")]
    AssetNotFound(AssetKey),

    #[error("The {0} is currently on loan")]
    AssetUnavailable(AssetKey),

    #[error("The {0} is not registered as on loan")]
    AssetNotOnLoan(AssetKey),

    #[error("The {key} is held by borrower {holder}, who does not appear in our database")]
    HolderNotFound { key: AssetKey, holder: i64 },

    #[error("The {0} is in circulation and cannot be deleted")]
    AssetInCirculation(AssetKey),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
}

/// Result type alias for ledger operations
pub type LendingResult<T> = Result<T, LendingError>;

impl LendingError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            LendingError::InvalidInput(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            LendingError::BorrowerNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchBorrower),
            LendingError::AssetNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchAsset),
            LendingError::BorrowerBlocked(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::BorrowerBlocked)
            }
            LendingError::BorrowerAlreadyHolding { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::AlreadyHolding)
            }
            LendingError::AssetUnavailable(_) => (StatusCode::CONFLICT, ErrorCode::AssetUnavailable),
            LendingError::AssetNotOnLoan(_) => (StatusCode::CONFLICT, ErrorCode::AssetNotOnLoan),
            LendingError::HolderNotFound { .. } => (StatusCode::CONFLICT, ErrorCode::HolderNotFound),
            LendingError::AssetInCirculation(_) => {
                (StatusCode::CONFLICT, ErrorCode::AssetInCirculation)
            }
            LendingError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable)
            }
        }
    }

    /// Message shown to the caller
    pub fn public_message(&self) -> String {
        match self {
            LendingError::StoreUnavailable(_) => {
                "Cannot reach the database. Please try again in a moment.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error(transparent)]
    Lending(#[from] LendingError),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always `Error`
    pub status: String,
    pub code: u32,
    pub error: String,
    pub msg: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchAsset, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::StoreUnavailable,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::Notification(msg) => {
                tracing::warn!("Notification failed: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::Failure,
                    "An error occurred while sending the email notification".to_string(),
                )
            }
            AppError::Lending(err) => {
                if let LendingError::StoreUnavailable(e) = err {
                    tracing::error!("Store unavailable: {:?}", e);
                }
                let (status, code) = err.status_and_code();
                (status, code, err.public_message())
            }
        };

        let body = Json(ErrorResponse {
            status: "Error".to_string(),
            code: code as u32,
            error: format!("{:?}", code),
            msg,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lending_error_status_mapping() {
        let key = AssetKey::new(AssetClass::Book, "bk-001", None).unwrap();

        assert_eq!(
            LendingError::AssetUnavailable(key.clone()).status_and_code(),
            (StatusCode::CONFLICT, ErrorCode::AssetUnavailable)
        );
        assert_eq!(
            LendingError::BorrowerBlocked(7).status_and_code().0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LendingError::StoreUnavailable(sqlx::Error::PoolTimedOut).status_and_code().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            LendingError::AssetNotOnLoan(key).to_string(),
            "The book BK-001 is not registered as on loan"
        );
    }

    #[test]
    fn test_store_unavailable_hides_driver_detail() {
        let err = LendingError::StoreUnavailable(sqlx::Error::PoolTimedOut);
        assert!(!err.public_message().contains("pool"));
    }
}
