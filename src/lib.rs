//! Knowledge Centre lending server
//!
//! REST JSON API for the school Knowledge Centre: borrowers, books, devices,
//! calculators and textbook samples, and the ledger that lends them out.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult, LendingError, LendingResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
