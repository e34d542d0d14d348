//! Asset registry: registration, lookup, listings and deletion

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult, LendingError},
    models::asset::{Asset, AssetClass, AssetDetails, AssetKey, CreateAsset},
    repository::{DeleteOutcome, LedgerStore},
    services::{
        audit::AuditSink,
        redis::{self, RedisService},
    },
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    cache: Option<RedisService>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<RedisService>) -> Self {
        self.cache = cache;
        self
    }

    /// Register a new, available asset
    pub async fn register_asset(
        &self,
        class: AssetClass,
        data: CreateAsset,
        acting_admin: &str,
    ) -> AppResult<Asset> {
        data.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let key = AssetKey::new(class, &data.code, data.number)?;
        let asset = Asset::new(
            key,
            data.title.trim().to_string(),
            data.attributes.unwrap_or_else(|| serde_json::json!({})),
        );

        if !self.store.insert_asset(&asset).await? {
            return Err(AppError::Conflict(format!(
                "The {} is already registered",
                asset.key
            )));
        }

        tracing::info!("Registered {} ({})", asset.key, asset.title);
        self.audit
            .append(
                Utc::now(),
                &format!("The {} was registered by {}.", asset.key, acting_admin),
            )
            .await;
        redis::invalidate(self.cache.as_ref(), class).await;

        Ok(asset)
    }

    /// Get asset by key, with rental history
    pub async fn get_asset(&self, key: &AssetKey) -> AppResult<Asset> {
        Ok(self
            .store
            .find_asset(key)
            .await?
            .ok_or_else(|| LendingError::AssetNotFound(key.clone()))?)
    }

    /// Asset plus a summary of its current holder
    pub async fn lookup_holder(&self, key: &AssetKey) -> AppResult<AssetDetails> {
        let asset = self.get_asset(key).await?;

        let holder = match asset.current_holder {
            Some(holder_id) => {
                let holder = self.store.find_borrower(holder_id).await?;
                if holder.is_none() {
                    tracing::warn!(
                        "{} is held by borrower {} who does not exist",
                        asset.key,
                        holder_id
                    );
                }
                holder.map(|b| b.summary())
            }
            None => None,
        };

        Ok(AssetDetails { asset, holder })
    }

    pub async fn list_assets(&self, class: AssetClass) -> AppResult<Vec<Asset>> {
        Ok(self.store.list_assets(class, None).await?)
    }

    /// Available units of a class, served from the cache when possible.
    ///
    /// A listing is only cached if no invalidation happened while it was
    /// being read from the store.
    pub async fn list_available(&self, class: AssetClass) -> AppResult<Vec<Asset>> {
        let mut generation = None;
        if let Some(cache) = &self.cache {
            match cache.get_available(class).await {
                Ok(Some(assets)) => {
                    tracing::debug!("Availability cache hit for {}", class);
                    return Ok(assets);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Availability cache read failed: {}", e),
            }
            match cache.generation(class).await {
                Ok(current) => generation = Some(current),
                Err(e) => tracing::warn!("Availability cache read failed: {}", e),
            }
        }

        let assets = self.store.list_assets(class, Some(true)).await?;

        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            match cache.set_available(class, &assets, generation).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!("Listing for {} went stale while reading", class),
                Err(e) => tracing::warn!("Availability cache write failed: {}", e),
            }
        }

        Ok(assets)
    }

    /// Remove an asset from the registry; refused while it is on loan
    pub async fn delete_asset(&self, key: &AssetKey, acting_admin: &str) -> AppResult<()> {
        match self.store.delete_asset(key).await? {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::NotFound => return Err(LendingError::AssetNotFound(key.clone()).into()),
            DeleteOutcome::InCirculation => {
                return Err(LendingError::AssetInCirculation(key.clone()).into())
            }
        }

        tracing::info!("Deleted {}", key);
        self.audit
            .append(
                Utc::now(),
                &format!("The {} was deleted by {}.", key, acting_admin),
            )
            .await;
        redis::invalidate(self.cache.as_ref(), key.class).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::asset::RentalEntry,
        repository::InMemoryStore,
        services::audit::LogAuditSink,
    };

    fn service() -> (Arc<InMemoryStore>, CatalogService) {
        let store = Arc::new(InMemoryStore::new());
        let service = CatalogService::new(store.clone(), Arc::new(LogAuditSink));
        (store, service)
    }

    fn create(code: &str, number: Option<i32>) -> CreateAsset {
        CreateAsset {
            code: code.to_string(),
            number,
            title: "Chromebook".to_string(),
            attributes: Some(serde_json::json!({ "vendor": "Acer" })),
        }
    }

    #[tokio::test]
    async fn test_register_normalizes_and_rejects_duplicates() {
        let (_, service) = service();

        let asset = service
            .register_asset(AssetClass::Device, create(" chromebook ", Some(4)), "admin")
            .await
            .unwrap();
        assert_eq!(asset.key.code, "CHROMEBOOK");
        assert!(asset.available);
        assert_eq!(asset.attributes["vendor"], "Acer");

        let dup = service
            .register_asset(AssetClass::Device, create("CHROMEBOOK", Some(4)), "admin")
            .await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        let missing_number = service
            .register_asset(AssetClass::Device, create("CHROMEBOOK", None), "admin")
            .await;
        assert!(matches!(
            missing_number,
            Err(AppError::Lending(LendingError::InvalidInput(_)))
        ));
    }

    #[tokio::test]
    async fn test_delete_only_while_available() {
        let (store, service) = service();
        let asset = service
            .register_asset(AssetClass::Device, create("IPAD", Some(1)), "admin")
            .await
            .unwrap();
        store
            .claim_asset(
                &asset.key,
                &RentalEntry {
                    borrower_id: 3,
                    due_date: None,
                    checked_out_at: Utc::now(),
                    checked_in_at: None,
                    conditions: None,
                },
            )
            .await
            .unwrap();

        let err = service.delete_asset(&asset.key, "admin").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Lending(LendingError::AssetInCirculation(_))
        ));

        store
            .release_asset(&asset.key, 3, Utc::now(), None)
            .await
            .unwrap();
        service.delete_asset(&asset.key, "admin").await.unwrap();

        let err = service.delete_asset(&asset.key, "admin").await.unwrap_err();
        assert!(matches!(err, AppError::Lending(LendingError::AssetNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_available_without_cache() {
        let (store, service) = service();
        let first = service
            .register_asset(AssetClass::Calculator, create("CASIO", Some(1)), "admin")
            .await
            .unwrap();
        service
            .register_asset(AssetClass::Calculator, create("CASIO", Some(2)), "admin")
            .await
            .unwrap();
        store
            .claim_asset(
                &first.key,
                &RentalEntry {
                    borrower_id: 1,
                    due_date: None,
                    checked_out_at: Utc::now(),
                    checked_in_at: None,
                    conditions: None,
                },
            )
            .await
            .unwrap();

        let available = service.list_available(AssetClass::Calculator).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].key.number, 2);
        assert_eq!(service.list_assets(AssetClass::Calculator).await.unwrap().len(), 2);
        assert!(service.list_assets(AssetClass::Book).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_holder_with_missing_borrower() {
        let (store, service) = service();
        let asset = service
            .register_asset(AssetClass::Device, create("IPAD", Some(2)), "admin")
            .await
            .unwrap();

        let details = service.lookup_holder(&asset.key).await.unwrap();
        assert!(details.holder.is_none());

        store
            .claim_asset(
                &asset.key,
                &RentalEntry {
                    borrower_id: 77,
                    due_date: None,
                    checked_out_at: Utc::now(),
                    checked_in_at: None,
                    conditions: None,
                },
            )
            .await
            .unwrap();
        let details = service.lookup_holder(&asset.key).await.unwrap();
        assert_eq!(details.asset.current_holder, Some(77));
        assert!(details.holder.is_none());
    }
}
