//! Assets repository for database operations

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use super::{DeleteOutcome, ReleasedLoan};
use crate::{
    error::LendingResult,
    models::asset::{Asset, AssetClass, AssetKey, DueDate, RentalEntry},
};

const ASSET_COLUMNS: &str =
    "id, asset_class, code, number, title, attributes, available, current_holder, crea_date";

const RENTAL_COLUMNS: &str = "borrower_id, due_date, checked_out_at, checked_in_at, conditions";

#[derive(Clone)]
pub struct AssetsRepository {
    pool: Pool<Postgres>,
}

impl AssetsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get asset by natural key, with rental history
    pub async fn find(&self, key: &AssetKey) -> LendingResult<Option<Asset>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM assets WHERE asset_class = $1 AND code = $2 AND number = $3",
            ASSET_COLUMNS
        ))
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut assets = vec![asset_from_row(&row)?];
                self.attach_rentals(&mut assets).await?;
                Ok(assets.pop().map(|(_, asset)| asset))
            }
            None => Ok(None),
        }
    }

    /// Insert an asset; returns false when the key is taken
    pub async fn insert(&self, asset: &Asset) -> LendingResult<bool> {
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO assets (asset_class, code, number, title, attributes, available,
                                current_holder, crea_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT assets_natural_key DO NOTHING
            RETURNING id
            "#,
        )
        .bind(asset.key.class)
        .bind(&asset.key.code)
        .bind(asset.key.number)
        .bind(&asset.title)
        .bind(&asset.attributes)
        .bind(asset.available)
        .bind(asset.current_holder)
        .bind(asset.crea_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(false);
        };

        for entry in &asset.rental_history {
            insert_rental(&mut tx, id, entry).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// List assets of a class, optionally filtered on availability
    pub async fn list(&self, class: AssetClass, available: Option<bool>) -> LendingResult<Vec<Asset>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM assets \
             WHERE asset_class = $1 AND ($2::BOOLEAN IS NULL OR available = $2) \
             ORDER BY code, number",
            ASSET_COLUMNS
        ))
        .bind(class)
        .bind(available)
        .fetch_all(&self.pool)
        .await?;

        let mut assets = rows
            .iter()
            .map(asset_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_rentals(&mut assets).await?;
        Ok(assets.into_iter().map(|(_, asset)| asset).collect())
    }

    /// Delete an asset, only while it is available
    pub async fn delete(&self, key: &AssetKey) -> LendingResult<DeleteOutcome> {
        let deleted: Option<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM assets
            WHERE asset_class = $1 AND code = $2 AND number = $3 AND available
            RETURNING id
            "#,
        )
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .fetch_optional(&self.pool)
        .await?;

        if deleted.is_some() {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM assets WHERE asset_class = $1 AND code = $2 AND number = $3)",
        )
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .fetch_one(&self.pool)
        .await?;

        Ok(if exists {
            DeleteOutcome::InCirculation
        } else {
            DeleteOutcome::NotFound
        })
    }

    /// Flip available -> unavailable and append the open entry, atomically.
    /// Returns false if the asset was not available.
    pub async fn claim(&self, key: &AssetKey, entry: &RentalEntry) -> LendingResult<bool> {
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE assets
            SET available = FALSE, current_holder = $4, modif_date = NOW()
            WHERE asset_class = $1 AND code = $2 AND number = $3 AND available
            RETURNING id
            "#,
        )
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .bind(entry.borrower_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(false);
        };

        insert_rental(&mut tx, id, entry).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Undo a claim made for `borrower_id` whose borrower side could not be applied
    pub async fn revert_claim(&self, key: &AssetKey, borrower_id: i64) -> LendingResult<()> {
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE assets
            SET available = TRUE, current_holder = NULL, modif_date = NOW()
            WHERE asset_class = $1 AND code = $2 AND number = $3 AND current_holder = $4
            RETURNING id
            "#,
        )
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .bind(borrower_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = id {
            sqlx::query(
                "DELETE FROM asset_rentals WHERE asset_id = $1 AND borrower_id = $2 AND checked_in_at IS NULL",
            )
            .bind(id)
            .bind(borrower_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Flip unavailable -> available (only while held by `holder`) and close
    /// the holder's open entry, atomically
    pub async fn release(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<Option<ReleasedLoan>> {
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE assets
            SET available = TRUE, current_holder = NULL, modif_date = NOW()
            WHERE asset_class = $1 AND code = $2 AND number = $3
              AND NOT available AND current_holder = $4
            RETURNING id
            "#,
        )
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .bind(holder)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE asset_rentals
            SET checked_in_at = $3, conditions = COALESCE($4, conditions)
            WHERE id = (
                SELECT id FROM asset_rentals
                WHERE asset_id = $1 AND borrower_id = $2 AND checked_in_at IS NULL
                ORDER BY checked_out_at DESC, id DESC
                LIMIT 1
            )
            RETURNING {}
            "#,
            RENTAL_COLUMNS
        ))
        .bind(id)
        .bind(holder)
        .bind(checked_in_at)
        .bind(conditions)
        .fetch_optional(&mut *tx)
        .await?;

        let closed_entry = row.as_ref().map(rental_from_row).transpose()?;

        tx.commit().await?;
        Ok(Some(ReleasedLoan {
            holder,
            closed_entry,
        }))
    }

    /// Undo a release whose borrower side failed: flip available ->
    /// unavailable for `holder` and reopen the entry closed at `checked_in_at`
    pub async fn reclaim(
        &self,
        key: &AssetKey,
        holder: i64,
        checked_in_at: DateTime<Utc>,
        conditions: Option<String>,
    ) -> LendingResult<bool> {
        let mut tx = self.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE assets
            SET available = FALSE, current_holder = $4, modif_date = NOW()
            WHERE asset_class = $1 AND code = $2 AND number = $3 AND available
            RETURNING id
            "#,
        )
        .bind(key.class)
        .bind(&key.code)
        .bind(key.number)
        .bind(holder)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE asset_rentals
            SET checked_in_at = NULL, conditions = $4
            WHERE asset_id = $1 AND borrower_id = $2 AND checked_in_at = $3
            "#,
        )
        .bind(id)
        .bind(holder)
        .bind(checked_in_at)
        .bind(conditions)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn attach_rentals(&self, assets: &mut [(i64, Asset)]) -> LendingResult<()> {
        if assets.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = assets.iter().map(|(id, _)| *id).collect();

        let rows = sqlx::query(&format!(
            "SELECT asset_id, {} FROM asset_rentals WHERE asset_id = ANY($1) ORDER BY checked_out_at, id",
            RENTAL_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_asset: HashMap<i64, Vec<RentalEntry>> = HashMap::new();
        for row in &rows {
            let asset_id: i64 = row.try_get("asset_id")?;
            by_asset.entry(asset_id).or_default().push(rental_from_row(row)?);
        }

        for (id, asset) in assets.iter_mut() {
            asset.rental_history = by_asset.remove(id).unwrap_or_default();
        }
        Ok(())
    }
}

async fn insert_rental(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    asset_id: i64,
    entry: &RentalEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO asset_rentals (asset_id, borrower_id, due_date, checked_out_at,
                                   checked_in_at, conditions)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(asset_id)
    .bind(entry.borrower_id)
    .bind(entry.due_date.map(|d| d.date()))
    .bind(entry.checked_out_at)
    .bind(entry.checked_in_at)
    .bind(&entry.conditions)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn asset_from_row(row: &PgRow) -> Result<(i64, Asset), sqlx::Error> {
    Ok((
        row.try_get("id")?,
        Asset {
            key: AssetKey {
                class: row.try_get("asset_class")?,
                code: row.try_get("code")?,
                number: row.try_get("number")?,
            },
            title: row.try_get("title")?,
            attributes: row.try_get("attributes")?,
            available: row.try_get("available")?,
            current_holder: row.try_get("current_holder")?,
            rental_history: Vec::new(),
            crea_date: row.try_get("crea_date")?,
        },
    ))
}

fn rental_from_row(row: &PgRow) -> Result<RentalEntry, sqlx::Error> {
    let due_date: Option<NaiveDate> = row.try_get("due_date")?;
    Ok(RentalEntry {
        borrower_id: row.try_get("borrower_id")?,
        due_date: due_date.map(DueDate::from),
        checked_out_at: row.try_get("checked_out_at")?,
        checked_in_at: row.try_get("checked_in_at")?,
        conditions: row.try_get("conditions")?,
    })
}
