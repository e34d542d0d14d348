//! Repository layer for database operations

pub mod admins;
pub mod assets;
pub mod audit;
pub mod borrowers;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::LendingResult,
    models::{
        asset::{Asset, AssetClass, AssetKey, RentalEntry},
        borrower::{Borrower, BorrowerLoanEntry},
    },
};

pub use memory::InMemoryStore;

/// Outcome of an asset deletion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// The asset is on loan and was left in place
    InCirculation,
}

/// Asset side of a completed release
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedLoan {
    pub holder: i64,
    /// The rental entry that was closed, if one was open
    pub closed_entry: Option<RentalEntry>,
}

/// Persistence seam of the lending ledger.
///
/// Each method touches a single entity (one borrower or one asset) and is
/// atomic on its own. The conditional methods (`claim_asset`,
/// `release_asset`, `open_borrower_loan`) only apply when the entity is in
/// the expected state and report whether they did, so two concurrent callers
/// can never both win the same transition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_borrower(&self, document_id: i64) -> LendingResult<Option<Borrower>>;

    /// Returns false when the document id already exists
    async fn insert_borrower(&self, borrower: &Borrower) -> LendingResult<bool>;

    async fn list_blocked_borrowers(&self) -> LendingResult<Vec<Borrower>>;

    /// Returns false when the borrower does not exist
    async fn set_borrower_blocked(&self, document_id: i64, blocked: bool) -> LendingResult<bool>;

    /// Borrowers whose flag for `class` is set
    async fn list_holding_borrowers(&self, class: AssetClass) -> LendingResult<Vec<Borrower>>;

    async fn find_asset(&self, key: &AssetKey) -> LendingResult<Option<Asset>>;

    /// Returns false when the key already exists
    async fn insert_asset(&self, asset: &Asset) -> LendingResult<bool>;

    async fn list_assets(
        &self,
        class: AssetClass,
        available: Option<bool>,
    ) -> LendingResult<Vec<Asset>>;

    async fn delete_asset(&self, key: &AssetKey) -> LendingResult<DeleteOutcome>;

    /// available -> unavailable, holder and open entry set from `entry`
    async fn claim_asset(&self, key: &AssetKey, entry: &RentalEntry) -> LendingResult<bool>;

    /// Undo a claim still held by `borrower_id`, dropping its open entry
    async fn revert_asset_claim(&self, key: &AssetKey, borrower_id: i64) -> LendingResult<()>;

    /// unavailable -> available, only while held by `holder`; `None` if not applied
    async fn release_asset(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<Option<ReleasedLoan>>;

    /// Undo a release: available -> unavailable for `holder`, reopening the
    /// entry closed at `checked_in_at` with its previous conditions
    async fn reclaim_asset(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool>;

    /// Flag false -> true for the entry's class, appending the entry
    async fn open_borrower_loan(
        &self,
        document_id: i64,
        entry: &BorrowerLoanEntry,
    ) -> LendingResult<bool>;

    /// Flag true -> false and close the open entry for `key`; false if either was missing
    async fn close_borrower_loan(
        &self,
        document_id: i64,
        key: &AssetKey,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool>;

    async fn ping(&self) -> LendingResult<()>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub borrowers: borrowers::BorrowersRepository,
    pub assets: assets::AssetsRepository,
    pub admins: admins::AdminsRepository,
    pub audit: audit::AuditRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            borrowers: borrowers::BorrowersRepository::new(pool.clone()),
            assets: assets::AssetsRepository::new(pool.clone()),
            admins: admins::AdminsRepository::new(pool.clone()),
            audit: audit::AuditRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl LedgerStore for Repository {
    async fn find_borrower(&self, document_id: i64) -> LendingResult<Option<Borrower>> {
        self.borrowers.find(document_id).await
    }

    async fn insert_borrower(&self, borrower: &Borrower) -> LendingResult<bool> {
        self.borrowers.insert(borrower).await
    }

    async fn list_blocked_borrowers(&self) -> LendingResult<Vec<Borrower>> {
        self.borrowers.list_blocked().await
    }

    async fn set_borrower_blocked(&self, document_id: i64, blocked: bool) -> LendingResult<bool> {
        self.borrowers.set_blocked(document_id, blocked).await
    }

    async fn list_holding_borrowers(&self, class: AssetClass) -> LendingResult<Vec<Borrower>> {
        self.borrowers.list_holding(class).await
    }

    async fn find_asset(&self, key: &AssetKey) -> LendingResult<Option<Asset>> {
        self.assets.find(key).await
    }

    async fn insert_asset(&self, asset: &Asset) -> LendingResult<bool> {
        self.assets.insert(asset).await
    }

    async fn list_assets(
        &self,
        class: AssetClass,
        available: Option<bool>,
    ) -> LendingResult<Vec<Asset>> {
        self.assets.list(class, available).await
    }

    async fn delete_asset(&self, key: &AssetKey) -> LendingResult<DeleteOutcome> {
        self.assets.delete(key).await
    }

    async fn claim_asset(&self, key: &AssetKey, entry: &RentalEntry) -> LendingResult<bool> {
        self.assets.claim(key, entry).await
    }

    async fn revert_asset_claim(&self, key: &AssetKey, borrower_id: i64) -> LendingResult<()> {
        self.assets.revert_claim(key, borrower_id).await
    }

    async fn release_asset(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<Option<ReleasedLoan>> {
        self.assets.release(key, holder, checked_in_at, conditions).await
    }

    async fn reclaim_asset(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool> {
        self.assets.reclaim(key, holder, checked_in_at, conditions).await
    }

    async fn open_borrower_loan(
        &self,
        document_id: i64,
        entry: &BorrowerLoanEntry,
    ) -> LendingResult<bool> {
        self.borrowers.open_loan(document_id, entry).await
    }

    async fn close_borrower_loan(
        &self,
        document_id: i64,
        key: &AssetKey,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool> {
        self.borrowers
            .close_loan(document_id, key, checked_in_at, conditions)
            .await
    }

    async fn ping(&self) -> LendingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
