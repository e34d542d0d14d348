//! Data models for the Knowledge Centre

pub mod admin;
pub mod asset;
pub mod borrower;
pub mod loan;

// Re-export commonly used types
pub use admin::{Admin, AdminClaims, AdminInfo};
pub use asset::{Asset, AssetClass, AssetDetails, AssetKey, AssetSummary, DueDate, RentalEntry};
pub use borrower::{Borrower, BorrowerLoanEntry, BorrowerSummary, LoanFlags};
pub use loan::{ActiveLoan, ActiveLoansView, Confirmation, LoanAnomaly};
