//! Checkout/checkin requests, confirmations and the active loans view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    asset::{AssetClass, AssetKey, AssetKeyInput, AssetSummary, DueDate},
    borrower::BorrowerSummary,
};
use crate::error::{LendingError, LendingResult};

/// Borrower document id, accepted as a JSON number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BorrowerIdInput {
    Number(i64),
    Text(String),
}

impl BorrowerIdInput {
    pub fn parse(&self) -> LendingResult<i64> {
        let id = match self {
            BorrowerIdInput::Number(n) => *n,
            BorrowerIdInput::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                LendingError::InvalidInput(format!("Invalid borrower id: '{}'", s))
            })?,
        };
        if id <= 0 {
            return Err(LendingError::InvalidInput(format!("Invalid borrower id: {}", id)));
        }
        Ok(id)
    }
}

/// Parse an optional borrower id, which is required for checkout
pub fn require_borrower_id(input: Option<&BorrowerIdInput>) -> LendingResult<i64> {
    input
        .ok_or_else(|| LendingError::InvalidInput("A borrower id is required".to_string()))?
        .parse()
}

/// Blank condition notes are treated as absent
pub fn normalize_conditions(conditions: Option<String>) -> Option<String> {
    conditions
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Checkout request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Borrower document id
    #[schema(value_type = Option<i64>, example = 20231045)]
    pub borrower_id: Option<BorrowerIdInput>,
    pub asset: Option<AssetKeyInput>,
    /// `YYYY-MM-DD` or `MM/DD/YYYY`; required for books
    pub due_date: Option<String>,
    pub conditions: Option<String>,
}

impl CheckoutRequest {
    pub fn asset_key(&self, class: AssetClass) -> LendingResult<AssetKey> {
        self.asset.clone().unwrap_or_default().into_key(class)
    }
}

/// Checkin request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckinRequest {
    pub asset: Option<AssetKeyInput>,
    pub conditions: Option<String>,
}

impl CheckinRequest {
    pub fn asset_key(&self, class: AssetClass) -> LendingResult<AssetKey> {
        self.asset.clone().unwrap_or_default().into_key(class)
    }
}

/// Result of a successful checkout or checkin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Confirmation {
    pub msg: String,
    pub asset: AssetKey,
    pub borrower_id: i64,
    pub due_date: Option<DueDate>,
}

/// One consistent borrower/asset pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActiveLoan {
    pub borrower: BorrowerSummary,
    pub asset: AssetSummary,
    pub checked_out_at: Option<DateTime<Utc>>,
}

/// Inconsistency found while joining borrowers and assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoanAnomaly {
    /// Borrower flagged as holding, but no unavailable asset points back
    BorrowerWithoutAsset { borrower: BorrowerSummary },
    /// Asset on loan to a holder who is missing or not flagged
    AssetWithoutBorrower {
        asset: AssetSummary,
        holder: Option<i64>,
    },
    /// Consistent pair, but the asset has no open rental entry for the holder
    MissingOpenEntry { borrower: BorrowerSummary, asset: AssetSummary },
    /// Borrower pointed at by more than one unavailable asset of the class
    DuplicateHolding { borrower: BorrowerSummary, asset: AssetSummary },
}

impl std::fmt::Display for LoanAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoanAnomaly::BorrowerWithoutAsset { borrower } => write!(
                f,
                "borrower {} is flagged as holding an asset but none is on loan to them",
                borrower.document_id
            ),
            LoanAnomaly::AssetWithoutBorrower { asset, holder } => match holder {
                Some(holder) => write!(
                    f,
                    "{} is on loan to borrower {} who is missing or not flagged",
                    asset.key, holder
                ),
                None => write!(f, "{} is unavailable without a holder", asset.key),
            },
            LoanAnomaly::MissingOpenEntry { borrower, asset } => write!(
                f,
                "{} is on loan to borrower {} without an open rental entry",
                asset.key, borrower.document_id
            ),
            LoanAnomaly::DuplicateHolding { borrower, asset } => write!(
                f,
                "borrower {} holds more than one {}, extra: {}",
                borrower.document_id,
                asset.key.class.label(),
                asset.key
            ),
        }
    }
}

/// Active loans of one class plus any anomalies found while building it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActiveLoansView {
    pub class: AssetClass,
    pub loans: Vec<ActiveLoan>,
    pub anomalies: Vec<LoanAnomaly>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrower_id_accepts_numbers_and_numeric_strings() {
        let from_number: BorrowerIdInput = serde_json::from_str("1045").unwrap();
        let from_text: BorrowerIdInput = serde_json::from_str("\" 1045 \"").unwrap();
        assert_eq!(from_number.parse().unwrap(), 1045);
        assert_eq!(from_text.parse().unwrap(), 1045);

        let bad: BorrowerIdInput = serde_json::from_str("\"abc\"").unwrap();
        assert!(matches!(bad.parse(), Err(LendingError::InvalidInput(_))));
        assert!(BorrowerIdInput::Number(-3).parse().is_err());
        assert!(require_borrower_id(None).is_err());
    }

    #[test]
    fn test_blank_conditions_are_dropped() {
        assert_eq!(normalize_conditions(Some("   ".into())), None);
        assert_eq!(
            normalize_conditions(Some(" scratched screen ".into())).as_deref(),
            Some("scratched screen")
        );
    }

    #[test]
    fn test_checkout_request_builds_key() {
        let req: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "borrower_id": "77",
            "asset": { "code": "casio fx", "number": 12 }
        }))
        .unwrap();
        let key = req.asset_key(AssetClass::Calculator).unwrap();
        assert_eq!(key.to_string(), "calculator CASIO FX #12");
    }
}
