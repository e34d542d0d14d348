//! Borrower registry service

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult, LendingError},
    models::{
        asset::AssetClass,
        borrower::{Borrower, BorrowerLoanEntry, BorrowerSummary, CreateBorrower},
    },
    repository::LedgerStore,
    services::audit::AuditSink,
};

#[derive(Clone)]
pub struct BorrowersService {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
}

impl BorrowersService {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub async fn register_borrower(
        &self,
        data: CreateBorrower,
        acting_admin: &str,
    ) -> AppResult<Borrower> {
        data.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let borrower = Borrower::register(data);
        if !self.store.insert_borrower(&borrower).await? {
            return Err(AppError::Conflict(format!(
                "A borrower with document {} already exists",
                borrower.document_id
            )));
        }

        tracing::info!("Registered borrower {}", borrower.document_id);
        self.audit
            .append(
                Utc::now(),
                &format!(
                    "Borrower {} ({}) was registered by {}.",
                    borrower.full_name(),
                    borrower.document_id,
                    acting_admin
                ),
            )
            .await;

        Ok(borrower)
    }

    pub async fn get_borrower(&self, document_id: i64) -> AppResult<Borrower> {
        Ok(self
            .store
            .find_borrower(document_id)
            .await?
            .ok_or(LendingError::BorrowerNotFound(document_id))?)
    }

    /// Loan history of one class, oldest first
    pub async fn history(
        &self,
        document_id: i64,
        class: AssetClass,
    ) -> AppResult<Vec<BorrowerLoanEntry>> {
        let borrower = self.get_borrower(document_id).await?;
        Ok(borrower.history_for(class).cloned().collect())
    }

    pub async fn list_blocked(&self) -> AppResult<Vec<BorrowerSummary>> {
        Ok(self
            .store
            .list_blocked_borrowers()
            .await?
            .iter()
            .map(Borrower::summary)
            .collect())
    }

    /// Block or unblock a borrower; returns the updated record
    pub async fn set_blocked(
        &self,
        document_id: i64,
        blocked: bool,
        acting_admin: &str,
    ) -> AppResult<Borrower> {
        if !self.store.set_borrower_blocked(document_id, blocked).await? {
            return Err(LendingError::BorrowerNotFound(document_id).into());
        }

        let action = if blocked { "blocked" } else { "unblocked" };
        tracing::info!("Borrower {} {}", document_id, action);
        self.audit
            .append(
                Utc::now(),
                &format!("Borrower {} was {} by {}.", document_id, action, acting_admin),
            )
            .await;

        self.get_borrower(document_id).await
    }
}
