//! Borrowers repository for database operations

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use crate::{
    error::LendingResult,
    models::{
        asset::{AssetClass, AssetKey, DueDate},
        borrower::{Borrower, BorrowerLoanEntry, LoanFlags},
    },
};

const BORROWER_COLUMNS: &str = "document_id, first_name, last_name, grade, section, email, blocked, \
     has_book_on_loan, has_device_on_loan, has_calculator_on_loan, has_textbook_on_loan, crea_date";

#[derive(Clone)]
pub struct BorrowersRepository {
    pool: Pool<Postgres>,
}

impl BorrowersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrower by document id, with loan history
    pub async fn find(&self, document_id: i64) -> LendingResult<Option<Borrower>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM borrowers WHERE document_id = $1",
            BORROWER_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut borrowers = vec![borrower_from_row(&row)?];
                self.attach_history(&mut borrowers).await?;
                Ok(borrowers.pop())
            }
            None => Ok(None),
        }
    }

    /// Insert a borrower; returns false when the document id is taken
    pub async fn insert(&self, borrower: &Borrower) -> LendingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO borrowers (document_id, first_name, last_name, grade, section, email,
                                   blocked, crea_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (document_id) DO NOTHING
            "#,
        )
        .bind(borrower.document_id)
        .bind(&borrower.first_name)
        .bind(&borrower.last_name)
        .bind(&borrower.grade)
        .bind(&borrower.section)
        .bind(&borrower.email)
        .bind(borrower.blocked)
        .bind(borrower.crea_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_blocked(&self) -> LendingResult<Vec<Borrower>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM borrowers WHERE blocked ORDER BY last_name, first_name",
            BORROWER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut borrowers = rows
            .iter()
            .map(borrower_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_history(&mut borrowers).await?;
        Ok(borrowers)
    }

    pub async fn set_blocked(&self, document_id: i64, blocked: bool) -> LendingResult<bool> {
        let result = sqlx::query(
            "UPDATE borrowers SET blocked = $2, modif_date = NOW() WHERE document_id = $1",
        )
        .bind(document_id)
        .bind(blocked)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Borrowers whose flag for `class` is set
    pub async fn list_holding(&self, class: AssetClass) -> LendingResult<Vec<Borrower>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM borrowers WHERE {} ORDER BY last_name, first_name",
            BORROWER_COLUMNS,
            class.loan_flag_column()
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut borrowers = rows
            .iter()
            .map(borrower_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_history(&mut borrowers).await?;
        Ok(borrowers)
    }

    /// Set the class flag (only if clear) and append an open history entry, atomically.
    /// Returns false when the flag was already set.
    pub async fn open_loan(&self, document_id: i64, entry: &BorrowerLoanEntry) -> LendingResult<bool> {
        let column = entry.asset.class.loan_flag_column();
        let mut tx = self.pool.begin().await?;

        let flagged = sqlx::query(&format!(
            "UPDATE borrowers SET {col} = TRUE, modif_date = NOW() \
             WHERE document_id = $1 AND NOT {col}",
            col = column
        ))
        .bind(document_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !flagged {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO borrower_loans (document_id, asset_class, asset_code, asset_number,
                                        due_date, checked_out_at, conditions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document_id)
        .bind(entry.asset.class)
        .bind(&entry.asset.code)
        .bind(entry.asset.number)
        .bind(entry.due_date.map(|d| d.date()))
        .bind(entry.checked_out_at)
        .bind(&entry.conditions)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Clear the class flag and close the matching open entry, atomically.
    /// Returns false if either the flag or the open entry was missing.
    pub async fn close_loan(
        &self,
        document_id: i64,
        key: &AssetKey,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool> {
        let column = key.class.loan_flag_column();
        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query(&format!(
            "UPDATE borrowers SET {col} = FALSE, modif_date = NOW() \
             WHERE document_id = $1 AND {col}",
            col = column
        ))
        .bind(document_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let closed = sqlx::query(
            r#"
            UPDATE borrower_loans
            SET checked_in_at = $5, conditions = COALESCE($6, conditions)
            WHERE id = (
                SELECT id FROM borrower_loans
                WHERE document_id = $1 AND asset_class = $2 AND asset_code = $3
                  AND asset_number = $4 AND checked_in_at IS NULL
                ORDER BY checked_out_at DESC, id DESC
                LIMIT 1
            )
            "#,
        )
        .bind(document_id)
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .bind(checked_in_at)
        .bind(conditions)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        tx.commit().await?;
        Ok(cleared && closed)
    }

    async fn attach_history(&self, borrowers: &mut [Borrower]) -> LendingResult<()> {
        if borrowers.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = borrowers.iter().map(|b| b.document_id).collect();

        let rows = sqlx::query(
            r#"
            SELECT document_id, asset_class, asset_code, asset_number, due_date,
                   checked_out_at, checked_in_at, conditions
            FROM borrower_loans
            WHERE document_id = ANY($1)
            ORDER BY checked_out_at, id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_borrower: HashMap<i64, Vec<BorrowerLoanEntry>> = HashMap::new();
        for row in &rows {
            let document_id: i64 = row.try_get("document_id")?;
            by_borrower
                .entry(document_id)
                .or_default()
                .push(loan_entry_from_row(row)?);
        }

        for borrower in borrowers.iter_mut() {
            borrower.history = by_borrower.remove(&borrower.document_id).unwrap_or_default();
        }
        Ok(())
    }
}

fn borrower_from_row(row: &PgRow) -> Result<Borrower, sqlx::Error> {
    Ok(Borrower {
        document_id: row.try_get("document_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        grade: row.try_get("grade")?,
        section: row.try_get("section")?,
        email: row.try_get("email")?,
        blocked: row.try_get("blocked")?,
        loans: LoanFlags {
            has_book_on_loan: row.try_get("has_book_on_loan")?,
            has_device_on_loan: row.try_get("has_device_on_loan")?,
            has_calculator_on_loan: row.try_get("has_calculator_on_loan")?,
            has_textbook_on_loan: row.try_get("has_textbook_on_loan")?,
        },
        history: Vec::new(),
        crea_date: row.try_get("crea_date")?,
    })
}

fn loan_entry_from_row(row: &PgRow) -> Result<BorrowerLoanEntry, sqlx::Error> {
    let due_date: Option<NaiveDate> = row.try_get("due_date")?;
    Ok(BorrowerLoanEntry {
        asset: AssetKey {
            class: row.try_get("asset_class")?,
            code: row.try_get("asset_code")?,
            number: row.try_get("asset_number")?,
        },
        due_date: due_date.map(DueDate::from),
        checked_out_at: row.try_get("checked_out_at")?,
        checked_in_at: row.try_get("checked_in_at")?,
        conditions: row.try_get("conditions")?,
    })
}
