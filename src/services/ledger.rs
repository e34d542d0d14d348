//! Lending ledger: checkout, checkin and the active loans view.
//!
//! A loan touches two records, the asset and the borrower, and the store only
//! guarantees atomicity per record. Checkout therefore claims the asset first
//! with a conditional update, then sets the borrower flag with another one,
//! and releases the asset again if the second step loses a race. Checkin runs
//! the same two steps in reverse. Anything a crash leaves half-done shows up
//! as an anomaly in [`LendingLedger::list_active_loans`].

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;

use crate::{
    error::{LendingError, LendingResult},
    models::{
        asset::{Asset, AssetClass, AssetKey, DueDate, RentalEntry},
        borrower::{Borrower, BorrowerLoanEntry},
        loan::{
            normalize_conditions, require_borrower_id, ActiveLoan, ActiveLoansView, CheckinRequest,
            CheckoutRequest, Confirmation, LoanAnomaly,
        },
    },
    repository::LedgerStore,
    services::{
        audit::AuditSink,
        email::{self, Notification, Notifier},
        events::{EventBus, LedgerEvent},
        redis::{self, RedisService},
    },
};

#[derive(Clone)]
pub struct LendingLedger {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    events: Arc<EventBus>,
    cache: Option<RedisService>,
    notify_timeout: Duration,
}

impl LendingLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        events: Arc<EventBus>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
            events,
            cache: None,
            notify_timeout,
        }
    }

    pub fn with_cache(mut self, cache: Option<RedisService>) -> Self {
        self.cache = cache;
        self
    }

    /// Lend one asset of `class` to a borrower.
    ///
    /// Preconditions are checked in a fixed order and the first failure is
    /// returned; no record is modified unless all of them pass. Failures are
    /// written to the audit log like successes.
    pub async fn checkout(
        &self,
        class: AssetClass,
        request: CheckoutRequest,
        acting_admin: &str,
    ) -> LendingResult<Confirmation> {
        let result = self.try_checkout(class, request, acting_admin).await;
        if let Err(err) = &result {
            self.record_failure("Checkout", class, err, acting_admin).await;
        }
        result
    }

    async fn try_checkout(
        &self,
        class: AssetClass,
        request: CheckoutRequest,
        acting_admin: &str,
    ) -> LendingResult<Confirmation> {
        let borrower_id = require_borrower_id(request.borrower_id.as_ref())?;
        let key = request.asset_key(class)?;
        let due_date = parse_due_date(class, request.due_date.as_deref())?;
        let conditions = normalize_conditions(request.conditions);

        let borrower = self
            .store
            .find_borrower(borrower_id)
            .await?
            .ok_or(LendingError::BorrowerNotFound(borrower_id))?;

        if borrower.blocked {
            return Err(LendingError::BorrowerBlocked(borrower_id));
        }
        if borrower.loans.get(class) {
            return Err(LendingError::BorrowerAlreadyHolding { borrower_id, class });
        }

        let asset = self
            .store
            .find_asset(&key)
            .await?
            .ok_or_else(|| LendingError::AssetNotFound(key.clone()))?;

        if !asset.available {
            return Err(LendingError::AssetUnavailable(key));
        }

        let now = Utc::now();
        let rental = RentalEntry {
            borrower_id,
            due_date,
            checked_out_at: now,
            checked_in_at: None,
            conditions: conditions.clone(),
        };
        if !self.store.claim_asset(&key, &rental).await? {
            return Err(LendingError::AssetUnavailable(key));
        }

        let loan = BorrowerLoanEntry {
            asset: key.clone(),
            due_date,
            checked_out_at: now,
            checked_in_at: None,
            conditions,
        };
        match self.store.open_borrower_loan(borrower_id, &loan).await {
            Ok(true) => {}
            Ok(false) => {
                self.revert_claim(&key, borrower_id).await;
                return Err(LendingError::BorrowerAlreadyHolding { borrower_id, class });
            }
            Err(e) => {
                self.revert_claim(&key, borrower_id).await;
                return Err(e);
            }
        }

        let msg = match due_date {
            Some(due) => format!(
                "The {} was checked out to {} and is due on {}.",
                key,
                borrower.full_name(),
                due
            ),
            None => format!("The {} was checked out to {}.", key, borrower.full_name()),
        };

        tracing::info!(
            asset = %key,
            borrower_id,
            admin = acting_admin,
            "Checkout finished successfully"
        );

        email::dispatch(
            self.notifier.clone(),
            Notification::checkout(&borrower, &key, &asset.title, due_date),
            self.notify_timeout,
        );
        self.record(format!(
            "The {} was checked out to {} ({}). Process finished successfully by {}.",
            key,
            borrower.full_name(),
            borrower_id,
            acting_admin
        ))
        .await;
        self.publish_change(class, "checkout").await;

        Ok(Confirmation {
            msg,
            asset: key,
            borrower_id,
            due_date,
        })
    }

    /// Take back the asset identified in `request` from whoever holds it
    pub async fn checkin(
        &self,
        class: AssetClass,
        request: CheckinRequest,
        acting_admin: &str,
    ) -> LendingResult<Confirmation> {
        let result = self.try_checkin(class, request, acting_admin).await;
        if let Err(err) = &result {
            self.record_failure("Checkin", class, err, acting_admin).await;
        }
        result
    }

    async fn try_checkin(
        &self,
        class: AssetClass,
        request: CheckinRequest,
        acting_admin: &str,
    ) -> LendingResult<Confirmation> {
        let key = request.asset_key(class)?;
        let conditions = normalize_conditions(request.conditions);

        let asset = self
            .store
            .find_asset(&key)
            .await?
            .ok_or_else(|| LendingError::AssetNotOnLoan(key.clone()))?;

        if asset.available {
            return Err(LendingError::AssetNotOnLoan(key));
        }
        let Some(holder_id) = asset.current_holder else {
            tracing::warn!("{} is unavailable without a holder", key);
            return Err(LendingError::AssetNotOnLoan(key));
        };

        let holder = match self.store.find_borrower(holder_id).await? {
            Some(holder) => holder,
            None => {
                let err = LendingError::HolderNotFound {
                    key: key.clone(),
                    holder: holder_id,
                };
                tracing::warn!("Checkin refused: {}", err);
                self.record(format!("Anomaly: {}. Reported to {}.", err, acting_admin))
                    .await;
                return Err(err);
            }
        };

        let now = Utc::now();
        let released = self
            .store
            .release_asset(&key, holder_id, now, conditions.clone())
            .await?
            .ok_or_else(|| LendingError::AssetNotOnLoan(key.clone()))?;

        if released.closed_entry.is_none() {
            self.report_anomaly(format!(
                "{} was on loan to borrower {} without an open rental entry",
                key, holder_id
            ))
            .await;
        }

        match self
            .store
            .close_borrower_loan(holder_id, &key, now, conditions)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.report_anomaly(format!(
                    "borrower {} had no open loan entry or flag for the {}",
                    holder_id, key
                ))
                .await;
            }
            Err(e) => {
                tracing::error!(
                    asset = %key,
                    borrower_id = holder_id,
                    "Asset released but borrower record could not be updated: {}",
                    e
                );
                let previous = asset
                    .open_entry_for(holder_id)
                    .and_then(|entry| entry.conditions.clone());
                self.restore_release(&key, holder_id, now, previous).await;
                return Err(e);
            }
        }

        let due_date = released
            .closed_entry
            .as_ref()
            .and_then(|entry| entry.due_date)
            .or_else(|| asset.open_entry_for(holder_id).and_then(|e| e.due_date));

        let mut msg = format!(
            "The {} checked out by {} was returned successfully.",
            key,
            holder.full_name()
        );
        if let Some(due) = due_date {
            msg.push_str(&format!(" It was due on {}.", due));
        }

        tracing::info!(
            asset = %key,
            borrower_id = holder_id,
            admin = acting_admin,
            "Checkin finished successfully"
        );

        email::dispatch(
            self.notifier.clone(),
            Notification::checkin(&holder, &key),
            self.notify_timeout,
        );
        self.record(format!(
            "The {} checked out by {} ({}) was returned successfully. Process finished successfully by {}.",
            key,
            holder.full_name(),
            holder_id,
            acting_admin
        ))
        .await;
        self.publish_change(class, "checkin").await;

        Ok(Confirmation {
            msg,
            asset: key,
            borrower_id: holder_id,
            due_date,
        })
    }

    /// Pair on-loan assets of `class` with flagged borrowers, reporting
    /// anything that does not line up
    pub async fn list_active_loans(&self, class: AssetClass) -> LendingResult<ActiveLoansView> {
        let on_loan = self.store.list_assets(class, Some(false)).await?;
        let holders = self.store.list_holding_borrowers(class).await?;

        let view = build_active_view(class, &on_loan, &holders);

        for anomaly in &view.anomalies {
            self.report_anomaly(anomaly.to_string()).await;
        }

        self.events.publish(LedgerEvent::snapshot(
            class,
            view.loans.len(),
            view.anomalies.len(),
        ));

        Ok(view)
    }

    async fn revert_claim(&self, key: &AssetKey, borrower_id: i64) {
        if let Err(e) = self.store.revert_asset_claim(key, borrower_id).await {
            tracing::error!(
                asset = %key,
                borrower_id,
                "Failed to release asset after an aborted checkout: {}",
                e
            );
            self.record(format!(
                "Anomaly: the {} stayed claimed for borrower {} after an aborted checkout",
                key, borrower_id
            ))
            .await;
        }
    }

    /// Put a released asset back on loan after the borrower side of a
    /// checkin failed
    async fn restore_release(
        &self,
        key: &AssetKey,
        holder_id: i64,
        checked_in_at: chrono::DateTime<Utc>,
        previous_conditions: Option<String>,
    ) {
        match self
            .store
            .reclaim_asset(key, holder_id, checked_in_at, previous_conditions)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.report_anomaly(format!(
                    "the {} was returned but could not be put back on loan to borrower {}, whose record still shows it",
                    key, holder_id
                ))
                .await;
            }
            Err(e) => {
                tracing::error!(asset = %key, borrower_id = holder_id, "Failed to restore loan: {}", e);
                self.report_anomaly(format!(
                    "the {} was returned but borrower {} still has it on record",
                    key, holder_id
                ))
                .await;
            }
        }
    }

    async fn record_failure(
        &self,
        operation: &str,
        class: AssetClass,
        err: &LendingError,
        acting_admin: &str,
    ) {
        tracing::info!(admin = acting_admin, "{} of a {} refused: {}", operation, class.label(), err);
        self.record(format!(
            "{} of a {} by {}. Process finished unsuccessfully as: {}.",
            operation,
            class.label(),
            acting_admin,
            err
        ))
        .await;
    }

    async fn report_anomaly(&self, description: String) {
        tracing::warn!("Ledger anomaly: {}", description);
        self.record(format!("Anomaly: {}", description)).await;
    }

    async fn record(&self, text: String) {
        self.audit.append(Utc::now(), &text).await;
    }

    async fn publish_change(&self, class: AssetClass, operation: &str) {
        self.events.publish(LedgerEvent::changed(class, operation));
        redis::invalidate(self.cache.as_ref(), class).await;
    }
}

fn parse_due_date(class: AssetClass, raw: Option<&str>) -> LendingResult<Option<DueDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => DueDate::parse(raw).map(Some),
        None if class.requires_due_date() => Err(LendingError::InvalidInput(format!(
            "A due date is required to check out a {}",
            class.label()
        ))),
        None => Ok(None),
    }
}

/// Join on-loan assets with flagged borrowers by `current_holder`
pub fn build_active_view(
    class: AssetClass,
    on_loan: &[Asset],
    holders: &[Borrower],
) -> ActiveLoansView {
    let by_id: HashMap<i64, &Borrower> = holders.iter().map(|b| (b.document_id, b)).collect();
    let mut paired: HashSet<i64> = HashSet::new();
    let mut loans = Vec::new();
    let mut anomalies = Vec::new();

    for asset in on_loan.iter().filter(|a| a.key.class == class && !a.available) {
        let summary = asset.summary();

        let Some(holder_id) = asset.current_holder else {
            anomalies.push(LoanAnomaly::AssetWithoutBorrower {
                asset: summary,
                holder: None,
            });
            continue;
        };
        let Some(borrower) = by_id.get(&holder_id) else {
            anomalies.push(LoanAnomaly::AssetWithoutBorrower {
                asset: summary,
                holder: Some(holder_id),
            });
            continue;
        };
        if !paired.insert(holder_id) {
            anomalies.push(LoanAnomaly::DuplicateHolding {
                borrower: borrower.summary(),
                asset: summary,
            });
            continue;
        }

        let checked_out_at = asset.open_entry_for(holder_id).map(|e| e.checked_out_at);
        if checked_out_at.is_none() {
            anomalies.push(LoanAnomaly::MissingOpenEntry {
                borrower: borrower.summary(),
                asset: summary.clone(),
            });
        }
        loans.push(ActiveLoan {
            borrower: borrower.summary(),
            asset: summary,
            checked_out_at,
        });
    }

    for borrower in holders {
        if !paired.contains(&borrower.document_id) {
            anomalies.push(LoanAnomaly::BorrowerWithoutAsset {
                borrower: borrower.summary(),
            });
        }
    }

    ActiveLoansView {
        class,
        loans,
        anomalies,
    }
}
