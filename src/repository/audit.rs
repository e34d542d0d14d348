//! Audit log repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

#[derive(Clone)]
pub struct AuditRepository {
    pool: Pool<Postgres>,
}

impl AuditRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, logged_at: DateTime<Utc>, text: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO audit_log (logged_at, text) VALUES ($1, $2)")
            .bind(logged_at)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
