//! Business logic services

pub mod audit;
pub mod auth;
pub mod borrowers;
pub mod catalog;
pub mod email;
pub mod events;
pub mod ledger;
pub mod redis;
pub mod reminders;

use std::sync::Arc;

use crate::{config::AppConfig, repository::{LedgerStore, Repository}};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub ledger: ledger::LendingLedger,
    pub catalog: catalog::CatalogService,
    pub borrowers: borrowers::BorrowersService,
    pub reminders: reminders::RemindersService,
    pub auth: auth::AuthService,
    pub events: Arc<events::EventBus>,
    store: Arc<dyn LedgerStore>,
}

impl Services {
    /// Wire every service around one ledger store.
    ///
    /// `repository` backs admin accounts; `store` backs borrowers and assets.
    pub fn new(
        config: &AppConfig,
        repository: Repository,
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn email::Notifier>,
        audit: Arc<dyn audit::AuditSink>,
        cache: Option<redis::RedisService>,
    ) -> Self {
        let events = Arc::new(events::EventBus::default());
        let timeout = config.notifications.timeout();

        Self {
            ledger: ledger::LendingLedger::new(
                store.clone(),
                notifier.clone(),
                audit.clone(),
                events.clone(),
                timeout,
            )
            .with_cache(cache.clone()),
            catalog: catalog::CatalogService::new(store.clone(), audit.clone()).with_cache(cache),
            borrowers: borrowers::BorrowersService::new(store.clone(), audit.clone()),
            reminders: reminders::RemindersService::new(store.clone(), notifier, audit, timeout),
            auth: auth::AuthService::new(repository, config.auth.clone()),
            events,
            store,
        }
    }

    /// Check that the ledger store answers
    pub async fn ping_store(&self) -> crate::error::LendingResult<()> {
        self.store.ping().await
    }
}
