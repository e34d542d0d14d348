//! Redis cache for per-class availability listings

use std::time::Duration;

use redis::{AsyncCommands, Client};

use crate::{
    error::{AppError, AppResult},
    models::asset::{Asset, AssetClass},
};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
    ttl: Duration,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str, ttl: Duration) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client, ttl })
    }

    fn available_key(class: AssetClass) -> String {
        format!("assets:available:{}", class)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Cached available units of a class, if present
    pub async fn get_available(&self, class: AssetClass) -> AppResult<Option<Vec<Asset>>> {
        let mut conn = self.connection().await?;

        let cached: Option<String> = conn
            .get(Self::available_key(class))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read cache: {}", e)))?;

        cached
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| AppError::Internal(format!("Corrupt cache entry: {}", e)))
            })
            .transpose()
    }

    /// Bumped on every invalidation of the class listing
    fn generation_key(class: AssetClass) -> String {
        format!("assets:available:{}:gen", class)
    }

    /// Current invalidation generation of a class listing
    pub async fn generation(&self, class: AssetClass) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        let generation: Option<u64> = conn
            .get(Self::generation_key(class))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read cache generation: {}", e)))?;
        Ok(generation.unwrap_or(0))
    }

    /// Store a listing read while the class was at `generation`.
    ///
    /// Nothing is written if an invalidation happened since; returns whether
    /// the listing was stored.
    pub async fn set_available(
        &self,
        class: AssetClass,
        assets: &[Asset],
        generation: u64,
    ) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(assets)
            .map_err(|e| AppError::Internal(format!("Failed to encode cache entry: {}", e)))?;

        let stored: i32 = redis::Script::new(SET_IF_GENERATION)
            .key(Self::available_key(class))
            .key(Self::generation_key(class))
            .arg(generation)
            .arg(json)
            .arg(self.ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write cache: {}", e)))?;

        Ok(stored == 1)
    }

    pub async fn invalidate_available(&self, class: AssetClass) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .incr(Self::generation_key(class), 1)
            .ignore()
            .del(Self::available_key(class))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to invalidate cache: {}", e)))?;
        Ok(())
    }
}

/// KEYS: listing, generation. ARGV: expected generation, listing, ttl.
const SET_IF_GENERATION: &str = r#"
if (redis.call('GET', KEYS[2]) or '0') == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
"#;

/// Drop the cached availability listing for `class`, logging failures
pub async fn invalidate(cache: Option<&RedisService>, class: AssetClass) {
    if let Some(cache) = cache {
        if let Err(e) = cache.invalidate_available(class).await {
            tracing::warn!(%class, error = %e, "Availability cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::asset::AssetKey;

    async fn service() -> RedisService {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        RedisService::new(&url, Duration::from_secs(30)).await.unwrap()
    }

    fn calculator(number: i32) -> Asset {
        let key = AssetKey::new(AssetClass::Calculator, "CASIO", Some(number)).unwrap();
        Asset::new(key, "Casio fx-82".into(), serde_json::json!({}))
    }

    #[tokio::test]
    #[ignore] // Needs a Redis server: REDIS_URL=... cargo test -- --ignored
    async fn test_listing_read_before_invalidation_is_not_stored() {
        let cache = service().await;
        cache.invalidate_available(AssetClass::Calculator).await.unwrap();

        let stale = cache.generation(AssetClass::Calculator).await.unwrap();
        cache.invalidate_available(AssetClass::Calculator).await.unwrap();
        let stored = cache
            .set_available(AssetClass::Calculator, &[calculator(1)], stale)
            .await
            .unwrap();
        assert!(!stored);
        assert!(cache.get_available(AssetClass::Calculator).await.unwrap().is_none());

        let current = cache.generation(AssetClass::Calculator).await.unwrap();
        assert_eq!(current, stale + 1);
        let stored = cache
            .set_available(AssetClass::Calculator, &[calculator(2)], current)
            .await
            .unwrap();
        assert!(stored);
        let cached = cache.get_available(AssetClass::Calculator).await.unwrap().unwrap();
        assert_eq!(cached[0].key.number, 2);

        cache.invalidate_available(AssetClass::Calculator).await.unwrap();
    }
}
