//! In-process ledger store, used by tests and local tooling

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DeleteOutcome, LedgerStore, ReleasedLoan};
use crate::{
    error::{LendingError, LendingResult},
    models::{
        asset::{Asset, AssetClass, AssetKey, RentalEntry},
        borrower::{Borrower, BorrowerLoanEntry},
    },
};

/// Ledger store backed by two maps, one lock per collection.
///
/// Every operation takes exactly one lock, so it has the same
/// per-entity atomicity as a single-row transaction.
#[derive(Default)]
pub struct InMemoryStore {
    borrowers: RwLock<HashMap<i64, Borrower>>,
    assets: RwLock<HashMap<AssetKey, Asset>>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with `StoreUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Store a borrower record as-is, replacing any existing one
    pub async fn put_borrower(&self, borrower: Borrower) {
        self.borrowers.write().await.insert(borrower.document_id, borrower);
    }

    /// Store an asset record as-is, replacing any existing one
    pub async fn put_asset(&self, asset: Asset) {
        self.assets.write().await.insert(asset.key.clone(), asset);
    }

    /// Copy of both collections
    pub async fn snapshot(&self) -> (Vec<Borrower>, Vec<Asset>) {
        let borrowers = self.borrowers.read().await.values().cloned().collect();
        let assets = self.assets.read().await.values().cloned().collect();
        (borrowers, assets)
    }

    fn check_online(&self) -> LendingResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LendingError::StoreUnavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn sort_borrowers(borrowers: &mut [Borrower]) {
    borrowers.sort_by(|a, b| {
        (&a.last_name, &a.first_name, a.document_id).cmp(&(&b.last_name, &b.first_name, b.document_id))
    });
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn find_borrower(&self, document_id: i64) -> LendingResult<Option<Borrower>> {
        self.check_online()?;
        Ok(self.borrowers.read().await.get(&document_id).cloned())
    }

    async fn insert_borrower(&self, borrower: &Borrower) -> LendingResult<bool> {
        self.check_online()?;
        let mut borrowers = self.borrowers.write().await;
        if borrowers.contains_key(&borrower.document_id) {
            return Ok(false);
        }
        borrowers.insert(borrower.document_id, borrower.clone());
        Ok(true)
    }

    async fn list_blocked_borrowers(&self) -> LendingResult<Vec<Borrower>> {
        self.check_online()?;
        let mut blocked: Vec<Borrower> = self
            .borrowers
            .read()
            .await
            .values()
            .filter(|b| b.blocked)
            .cloned()
            .collect();
        sort_borrowers(&mut blocked);
        Ok(blocked)
    }

    async fn set_borrower_blocked(&self, document_id: i64, blocked: bool) -> LendingResult<bool> {
        self.check_online()?;
        match self.borrowers.write().await.get_mut(&document_id) {
            Some(borrower) => {
                borrower.blocked = blocked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_holding_borrowers(&self, class: AssetClass) -> LendingResult<Vec<Borrower>> {
        self.check_online()?;
        let mut holding: Vec<Borrower> = self
            .borrowers
            .read()
            .await
            .values()
            .filter(|b| b.loans.get(class))
            .cloned()
            .collect();
        sort_borrowers(&mut holding);
        Ok(holding)
    }

    async fn find_asset(&self, key: &AssetKey) -> LendingResult<Option<Asset>> {
        self.check_online()?;
        Ok(self.assets.read().await.get(key).cloned())
    }

    async fn insert_asset(&self, asset: &Asset) -> LendingResult<bool> {
        self.check_online()?;
        let mut assets = self.assets.write().await;
        if assets.contains_key(&asset.key) {
            return Ok(false);
        }
        assets.insert(asset.key.clone(), asset.clone());
        Ok(true)
    }

    async fn list_assets(
        &self,
        class: AssetClass,
        available: Option<bool>,
    ) -> LendingResult<Vec<Asset>> {
        self.check_online()?;
        let mut listed: Vec<Asset> = self
            .assets
            .read()
            .await
            .values()
            .filter(|a| a.key.class == class)
            .filter(|a| available.map_or(true, |wanted| a.available == wanted))
            .cloned()
            .collect();
        listed.sort_by(|a, b| (&a.key.code, a.key.number).cmp(&(&b.key.code, b.key.number)));
        Ok(listed)
    }

    async fn delete_asset(&self, key: &AssetKey) -> LendingResult<DeleteOutcome> {
        self.check_online()?;
        let mut assets = self.assets.write().await;
        match assets.get(key) {
            None => Ok(DeleteOutcome::NotFound),
            Some(asset) if !asset.available => Ok(DeleteOutcome::InCirculation),
            Some(_) => {
                assets.remove(key);
                Ok(DeleteOutcome::Deleted)
            }
        }
    }

    async fn claim_asset(&self, key: &AssetKey, entry: &RentalEntry) -> LendingResult<bool> {
        self.check_online()?;
        let mut assets = self.assets.write().await;
        match assets.get_mut(key) {
            Some(asset) if asset.available => {
                asset.available = false;
                asset.current_holder = Some(entry.borrower_id);
                asset.rental_history.push(entry.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revert_asset_claim(&self, key: &AssetKey, borrower_id: i64) -> LendingResult<()> {
        self.check_online()?;
        let mut assets = self.assets.write().await;
        if let Some(asset) = assets.get_mut(key) {
            if asset.current_holder == Some(borrower_id) {
                asset.available = true;
                asset.current_holder = None;
                asset
                    .rental_history
                    .retain(|e| !(e.is_open() && e.borrower_id == borrower_id));
            }
        }
        Ok(())
    }

    async fn release_asset(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<Option<ReleasedLoan>> {
        self.check_online()?;
        let mut assets = self.assets.write().await;
        let Some(asset) = assets.get_mut(key) else {
            return Ok(None);
        };
        if asset.available || asset.current_holder != Some(holder) {
            return Ok(None);
        }

        asset.available = true;
        asset.current_holder = None;

        let closed_entry = asset
            .rental_history
            .iter_mut()
            .rev()
            .find(|e| e.is_open() && e.borrower_id == holder)
            .map(|entry| {
                entry.checked_in_at = Some(checked_in_at);
                if conditions.is_some() {
                    entry.conditions = conditions;
                }
                entry.clone()
            });

        Ok(Some(ReleasedLoan {
            holder,
            closed_entry,
        }))
    }

    async fn reclaim_asset(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool> {
        self.check_online()?;
        let mut assets = self.assets.write().await;
        match assets.get_mut(key) {
            Some(asset) if asset.available => {
                asset.available = false;
                asset.current_holder = Some(holder);
                if let Some(entry) = asset
                    .rental_history
                    .iter_mut()
                    .rev()
                    .find(|e| e.borrower_id == holder && e.checked_in_at == Some(checked_in_at))
                {
                    entry.checked_in_at = None;
                    entry.conditions = conditions;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_borrower_loan(
        &self,
        document_id: i64,
        entry: &BorrowerLoanEntry,
    ) -> LendingResult<bool> {
        self.check_online()?;
        let mut borrowers = self.borrowers.write().await;
        match borrowers.get_mut(&document_id) {
            Some(borrower) if !borrower.loans.get(entry.asset.class) => {
                borrower.loans.set(entry.asset.class, true);
                borrower.history.push(entry.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn close_borrower_loan(
        &self,
        document_id: i64,
        key: &AssetKey,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool> {
        self.check_online()?;
        let mut borrowers = self.borrowers.write().await;
        let Some(borrower) = borrowers.get_mut(&document_id) else {
            return Ok(false);
        };

        let cleared = borrower.loans.get(key.class);
        borrower.loans.set(key.class, false);

        let closed = match borrower
            .history
            .iter_mut()
            .rev()
            .find(|e| e.is_open() && &e.asset == key)
        {
            Some(entry) => {
                entry.checked_in_at = Some(checked_in_at);
                if conditions.is_some() {
                    entry.conditions = conditions;
                }
                true
            }
            None => false,
        };

        Ok(cleared && closed)
    }

    async fn ping(&self) -> LendingResult<()> {
        self.check_online()
    }
}
