//! Reminder e-mails to borrowers holding assets

use std::{sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    error::{AppError, AppResult, LendingError},
    models::asset::AssetClass,
    repository::LedgerStore,
    services::{
        audit::AuditSink,
        email::{self, Notification, Notifier},
    },
};

/// Unlike checkout/checkin mails, a reminder is the whole operation, so
/// delivery is awaited and its failure returned to the caller.
#[derive(Clone)]
pub struct RemindersService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl RemindersService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
            timeout,
        }
    }

    /// Remind one borrower about the asset of `class` they hold
    pub async fn remind_borrower(
        &self,
        document_id: i64,
        class: AssetClass,
        acting_admin: &str,
    ) -> AppResult<String> {
        let borrower = self
            .store
            .find_borrower(document_id)
            .await?
            .ok_or(LendingError::BorrowerNotFound(document_id))?;

        let entry = borrower
            .open_entries(class)
            .last()
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Borrower {} has no {} on loan",
                    document_id,
                    class.label()
                ))
            })?;

        email::deliver(
            self.notifier.as_ref(),
            Notification::reminder(&borrower, &entry.asset, entry.due_date),
            self.timeout,
        )
        .await
        .map_err(|e| AppError::Notification(e.to_string()))?;

        self.audit
            .append(
                Utc::now(),
                &format!(
                    "Borrower {} was reminded about the {} by {}.",
                    document_id, entry.asset, acting_admin
                ),
            )
            .await;

        Ok(format!(
            "{} was notified by email about the {}.",
            borrower.full_name(),
            entry.asset
        ))
    }

    /// Remind every current holder of `class` with a single Bcc message.
    /// Returns the number of borrowers notified.
    pub async fn remind_all(&self, class: AssetClass, acting_admin: &str) -> AppResult<usize> {
        let holders = self.store.list_holding_borrowers(class).await?;
        if holders.is_empty() {
            return Ok(0);
        }

        let emails: Vec<String> = holders.iter().map(|b| b.email.clone()).collect();
        let count = emails.len();

        email::deliver(
            self.notifier.as_ref(),
            Notification::reminder_all(emails, class.label()),
            self.timeout,
        )
        .await
        .map_err(|e| AppError::Notification(e.to_string()))?;

        tracing::info!("Reminded {} holders of {}", count, class);
        self.audit
            .append(
                Utc::now(),
                &format!(
                    "{} holders of {} were reminded by {}.",
                    count, class, acting_admin
                ),
            )
            .await;

        Ok(count)
    }
}
