//! Audit trail of ledger operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::repository::audit::AuditRepository;

/// Append-only record of who did what.
///
/// Appending never fails from the caller's point of view: sinks log their
/// own errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, at: DateTime<Utc>, text: &str);
}

/// Writes audit records to the `audit_log` table
pub struct DatabaseAuditSink {
    repository: AuditRepository,
}

impl DatabaseAuditSink {
    pub fn new(repository: AuditRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl AuditSink for DatabaseAuditSink {
    async fn append(&self, at: DateTime<Utc>, text: &str) {
        if let Err(e) = self.repository.insert(at, text).await {
            tracing::error!(error = %e, audit = text, "Failed to write audit record");
        }
    }
}

/// Emits audit records as tracing events only
#[derive(Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn append(&self, at: DateTime<Utc>, text: &str) {
        tracing::info!(target: "audit", at = %at.format("%m/%d/%Y %H:%M:%S"), "{}", text);
    }
}
