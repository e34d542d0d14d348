//! Borrower model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::asset::{AssetClass, AssetKey, DueDate};

/// Per-class "currently holds one" flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanFlags {
    pub has_book_on_loan: bool,
    pub has_device_on_loan: bool,
    pub has_calculator_on_loan: bool,
    pub has_textbook_on_loan: bool,
}

impl LoanFlags {
    pub fn get(&self, class: AssetClass) -> bool {
        match class {
            AssetClass::Book => self.has_book_on_loan,
            AssetClass::Device => self.has_device_on_loan,
            AssetClass::Calculator => self.has_calculator_on_loan,
            AssetClass::Textbook => self.has_textbook_on_loan,
        }
    }

    pub fn set(&mut self, class: AssetClass, value: bool) {
        match class {
            AssetClass::Book => self.has_book_on_loan = value,
            AssetClass::Device => self.has_device_on_loan = value,
            AssetClass::Calculator => self.has_calculator_on_loan = value,
            AssetClass::Textbook => self.has_textbook_on_loan = value,
        }
    }
}

/// Loan history entry on the borrower side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowerLoanEntry {
    pub asset: AssetKey,
    pub due_date: Option<DueDate>,
    pub checked_out_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub conditions: Option<String>,
}

impl BorrowerLoanEntry {
    pub fn is_open(&self) -> bool {
        self.checked_in_at.is_none()
    }
}

/// Student or staff member allowed to borrow
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Borrower {
    /// School document id
    pub document_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub section: Option<String>,
    pub email: String,
    pub blocked: bool,
    pub loans: LoanFlags,
    pub history: Vec<BorrowerLoanEntry>,
    pub crea_date: DateTime<Utc>,
}

impl Borrower {
    /// A new, unblocked borrower with no loans
    pub fn register(data: CreateBorrower) -> Self {
        Self {
            document_id: data.document_id,
            first_name: data.first_name.trim().to_string(),
            last_name: data.last_name.trim().to_string(),
            grade: data.grade,
            section: data.section,
            email: data.email.trim().to_lowercase(),
            blocked: false,
            loans: LoanFlags::default(),
            history: Vec::new(),
            crea_date: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn history_for(&self, class: AssetClass) -> impl Iterator<Item = &BorrowerLoanEntry> {
        self.history.iter().filter(move |e| e.asset.class == class)
    }

    pub fn open_entries(&self, class: AssetClass) -> impl Iterator<Item = &BorrowerLoanEntry> {
        self.history_for(class).filter(|e| e.is_open())
    }

    pub fn summary(&self) -> BorrowerSummary {
        BorrowerSummary {
            document_id: self.document_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            grade: self.grade.clone(),
            section: self.section.clone(),
            email: self.email.clone(),
        }
    }
}

/// Short borrower representation for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowerSummary {
    pub document_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub grade: Option<String>,
    pub section: Option<String>,
    pub email: String,
}

/// Register borrower request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBorrower {
    #[validate(range(min = 1, message = "Document id must be positive"))]
    pub document_id: i64,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub grade: Option<String>,
    pub section: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

/// Block or unblock request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBlocked {
    pub blocked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(document_id: i64) -> CreateBorrower {
        CreateBorrower {
            document_id,
            first_name: " Ana ".into(),
            last_name: "Pérez".into(),
            grade: Some("10".into()),
            section: Some("B".into()),
            email: "Ana.Perez@School.edu".into(),
        }
    }

    #[test]
    fn test_register_normalizes_fields() {
        let borrower = Borrower::register(create(1001));
        assert_eq!(borrower.first_name, "Ana");
        assert_eq!(borrower.email, "ana.perez@school.edu");
        assert!(!borrower.blocked);
        assert_eq!(borrower.loans, LoanFlags::default());
    }

    #[test]
    fn test_loan_flags_are_independent_per_class() {
        let mut flags = LoanFlags::default();
        flags.set(AssetClass::Device, true);
        assert!(flags.get(AssetClass::Device));
        assert!(!flags.get(AssetClass::Book));
        assert!(!flags.get(AssetClass::Calculator));
        flags.set(AssetClass::Device, false);
        assert_eq!(flags, LoanFlags::default());
    }

    #[test]
    fn test_create_borrower_validation() {
        assert!(create(5).validate().is_ok());

        let mut bad = create(0);
        assert!(bad.validate().is_err());
        bad = create(5);
        bad.email = "not-an-email".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_history_filters_by_class() {
        let mut borrower = Borrower::register(create(7));
        borrower.history.push(BorrowerLoanEntry {
            asset: AssetKey::new(AssetClass::Book, "B1", None).unwrap(),
            due_date: None,
            checked_out_at: Utc::now(),
            checked_in_at: Some(Utc::now()),
            conditions: None,
        });
        borrower.history.push(BorrowerLoanEntry {
            asset: AssetKey::new(AssetClass::Device, "IPAD", Some(1)).unwrap(),
            due_date: None,
            checked_out_at: Utc::now(),
            checked_in_at: None,
            conditions: None,
        });

        assert_eq!(borrower.history_for(AssetClass::Book).count(), 1);
        assert_eq!(borrower.open_entries(AssetClass::Book).count(), 0);
        assert_eq!(borrower.open_entries(AssetClass::Device).count(), 1);
    }
}
