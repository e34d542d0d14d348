//! Lendable asset model: asset classes, natural keys, due dates and rental history

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{Decode, Encode, Postgres};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::borrower::BorrowerSummary;
use crate::error::{LendingError, LendingResult};

// ---------------------------------------------------------------------------
// AssetClass
// ---------------------------------------------------------------------------

/// Circulating asset families, each with its own key shape and loan flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AssetClass {
    #[serde(rename = "books")]
    Book,
    #[serde(rename = "devices")]
    Device,
    #[serde(rename = "calculators")]
    Calculator,
    #[serde(rename = "textbooks")]
    Textbook,
}

impl AssetClass {
    pub const ALL: [AssetClass; 4] = [
        AssetClass::Book,
        AssetClass::Device,
        AssetClass::Calculator,
        AssetClass::Textbook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Book => "books",
            AssetClass::Device => "devices",
            AssetClass::Calculator => "calculators",
            AssetClass::Textbook => "textbooks",
        }
    }

    /// Singular, human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            AssetClass::Book => "book",
            AssetClass::Device => "device",
            AssetClass::Calculator => "calculator",
            AssetClass::Textbook => "textbook",
        }
    }

    /// Column of `borrowers` carrying the on-loan flag for this class
    pub fn loan_flag_column(&self) -> &'static str {
        match self {
            AssetClass::Book => "has_book_on_loan",
            AssetClass::Device => "has_device_on_loan",
            AssetClass::Calculator => "has_calculator_on_loan",
            AssetClass::Textbook => "has_textbook_on_loan",
        }
    }

    /// Devices, calculators and textbooks are identified by a name plus a unit number
    pub fn is_numbered(&self) -> bool {
        !matches!(self, AssetClass::Book)
    }

    pub fn requires_due_date(&self) -> bool {
        matches!(self, AssetClass::Book)
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "books" | "book" => Ok(AssetClass::Book),
            "devices" | "device" => Ok(AssetClass::Device),
            "calculators" | "calculator" => Ok(AssetClass::Calculator),
            "textbooks" | "textbook" => Ok(AssetClass::Textbook),
            _ => Err(format!("Invalid asset class: {}", s)),
        }
    }
}

// SQLx conversion for AssetClass
impl sqlx::Type<Postgres> for AssetClass {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for AssetClass {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for AssetClass {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

// ---------------------------------------------------------------------------
// AssetKey
// ---------------------------------------------------------------------------

/// Natural key of one circulating unit.
///
/// `code` is the barcode for books, the device type for devices and
/// calculators, and the title for textbooks. It is always stored trimmed and
/// upper-cased so lookups behave case-insensitively. `number` is the unit or
/// sample number, and is `0` for books.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AssetKey {
    pub class: AssetClass,
    pub code: String,
    pub number: i32,
}

impl AssetKey {
    /// Build a canonical key, rejecting malformed parts
    pub fn new(class: AssetClass, code: &str, number: Option<i32>) -> LendingResult<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LendingError::InvalidInput(format!(
                "A {} identifier is required",
                class.label()
            )));
        }

        let number = if class.is_numbered() {
            match number {
                Some(n) if n > 0 => n,
                Some(n) => {
                    return Err(LendingError::InvalidInput(format!(
                        "Invalid {} number: {}",
                        class.label(),
                        n
                    )))
                }
                None => {
                    return Err(LendingError::InvalidInput(format!(
                        "A {} number is required",
                        class.label()
                    )))
                }
            }
        } else {
            0
        };

        Ok(Self {
            class,
            code: code.to_uppercase(),
            number,
        })
    }

    /// Key without the class label, e.g. `BK-001` or `IPAD #3`
    pub fn reference(&self) -> String {
        if self.class.is_numbered() {
            format!("{} #{}", self.code, self.number)
        } else {
            self.code.clone()
        }
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.class.label(), self.reference())
    }
}

/// Asset key as received from a client, validated into an [`AssetKey`]
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssetKeyInput {
    /// Barcode, device type or textbook title
    pub code: Option<String>,
    /// Device or sample number (not used for books)
    pub number: Option<i32>,
}

impl AssetKeyInput {
    pub fn into_key(self, class: AssetClass) -> LendingResult<AssetKey> {
        let code = self.code.ok_or_else(|| {
            LendingError::InvalidInput(format!("A {} identifier is required", class.label()))
        })?;
        AssetKey::new(class, &code, self.number)
    }
}

// ---------------------------------------------------------------------------
// DueDate
// ---------------------------------------------------------------------------

/// Calendar due date, rendered as `MM/DD/YYYY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
#[schema(value_type = String, example = "12/01/2024")]
pub struct DueDate(NaiveDate);

impl DueDate {
    pub const FORMAT: &'static str = "%m/%d/%Y";
    const ISO_FORMAT: &'static str = "%Y-%m-%d";

    /// Accepts `YYYY-MM-DD` (normalized) or `MM/DD/YYYY`
    pub fn parse(input: &str) -> LendingResult<Self> {
        let input = input.trim();
        NaiveDate::parse_from_str(input, Self::ISO_FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(input, Self::FORMAT))
            .map(Self)
            .map_err(|_| {
                LendingError::InvalidInput(format!(
                    "Invalid due date '{}', expected YYYY-MM-DD or MM/DD/YYYY",
                    input
                ))
            })
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DueDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl std::fmt::Display for DueDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for DueDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DueDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DueDate::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// One checkout/checkin pair in an asset's rental history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RentalEntry {
    pub borrower_id: i64,
    pub due_date: Option<DueDate>,
    pub checked_out_at: DateTime<Utc>,
    /// `None` while the loan is open
    pub checked_in_at: Option<DateTime<Utc>>,
    pub conditions: Option<String>,
}

impl RentalEntry {
    pub fn is_open(&self) -> bool {
        self.checked_in_at.is_none()
    }
}

/// A circulating unit: book copy, device, calculator or textbook sample
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Asset {
    pub key: AssetKey,
    pub title: String,
    /// Author, ISBN, vendor, material type... carried as-is
    #[schema(value_type = Object)]
    pub attributes: serde_json::Value,
    pub available: bool,
    /// Document id of the borrower holding the asset
    pub current_holder: Option<i64>,
    pub rental_history: Vec<RentalEntry>,
    pub crea_date: DateTime<Utc>,
}

impl Asset {
    /// A freshly registered, available asset
    pub fn new(key: AssetKey, title: String, attributes: serde_json::Value) -> Self {
        Self {
            key,
            title,
            attributes,
            available: true,
            current_holder: None,
            rental_history: Vec::new(),
            crea_date: Utc::now(),
        }
    }

    /// Open rental entry belonging to `borrower_id`
    pub fn open_entry_for(&self, borrower_id: i64) -> Option<&RentalEntry> {
        self.rental_history
            .iter()
            .rev()
            .find(|entry| entry.is_open() && entry.borrower_id == borrower_id)
    }

    pub fn has_open_entry(&self) -> bool {
        self.rental_history.iter().any(RentalEntry::is_open)
    }

    pub fn summary(&self) -> AssetSummary {
        let due_date = self
            .current_holder
            .and_then(|holder| self.open_entry_for(holder))
            .and_then(|entry| entry.due_date);

        AssetSummary {
            key: self.key.clone(),
            title: self.title.clone(),
            due_date,
        }
    }
}

/// Short asset representation for loan listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssetSummary {
    pub key: AssetKey,
    pub title: String,
    pub due_date: Option<DueDate>,
}

/// An asset together with whoever holds it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssetDetails {
    pub asset: Asset,
    pub holder: Option<BorrowerSummary>,
}

/// Register asset request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAsset {
    /// Barcode, device type or textbook title
    #[validate(length(min = 1, message = "Identifier is required"))]
    pub code: String,
    /// Device or sample number (not used for books)
    pub number: Option<i32>,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[schema(value_type = Option<Object>)]
    pub attributes: Option<serde_json::Value>,
}
