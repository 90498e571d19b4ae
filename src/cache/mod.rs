/// Caching layer for Sonora
///
/// The shared cache holds paginator counts keyed by query fingerprint.
/// Redis is used when enabled; otherwise an in-process map with expiry
/// stands in so a single instance still benefits.

use crate::error::{SonoraError, SonoraResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Cache layer configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Use Redis (default: false, falls back to the in-process cache)
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub redis_url: String,

    /// Key prefix for all cache entries (default: "sonora:")
    pub key_prefix: String,

    /// Default TTL for cache entries in seconds (default: 300 = 5 minutes)
    pub default_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "sonora:".to_string(),
            default_ttl: 300,
        }
    }
}

impl CacheConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("CACHE_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            default_ttl: std::env::var("CACHE_DEFAULT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl),
        }
    }
}

/// Redis cache client
#[derive(Clone)]
pub struct CacheClient {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl CacheClient {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> SonoraResult<Self> {
        if !config.enabled {
            return Err(SonoraError::Cache(
                "Cache is disabled, cannot create client".to_string(),
            ));
        }

        info!("Connecting to Redis at {}", config.redis_url);

        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            SonoraError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            SonoraError::Cache(format!("Redis connection failed: {}", e))
        })?;

        let client = Self { connection, config };
        client.ping().await?;
        info!("Redis connection established");

        Ok(client)
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> SonoraResult<Option<T>> {
        let cache_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let result: Option<String> = conn.get(&cache_key).await.map_err(|e| {
            warn!("Redis GET failed for {}: {}", cache_key, e);
            SonoraError::Cache(format!("Cache get failed: {}", e))
        })?;

        match result {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Failed to deserialize cached value {}: {}", cache_key, e);
                    let _ = self.delete(key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Set a value in cache with TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> SonoraResult<()> {
        let cache_key = self.build_key(key);
        let json = serde_json::to_string(value)
            .map_err(|e| SonoraError::Cache(format!("Cache serialization failed: {}", e)))?;

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&cache_key, json, ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                warn!("Redis SET failed for {}: {}", cache_key, e);
                SonoraError::Cache(format!("Cache set failed: {}", e))
            })?;

        Ok(())
    }

    /// Delete a value from cache
    pub async fn delete(&self, key: &str) -> SonoraResult<()> {
        let cache_key = self.build_key(key);
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(&cache_key).await.map_err(|e| {
            warn!("Redis DELETE failed for {}: {}", cache_key, e);
            SonoraError::Cache(format!("Cache delete failed: {}", e))
        })?;

        Ok(())
    }

    /// Ping Redis to check connection
    pub async fn ping(&self) -> SonoraResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SonoraError::Cache(format!("Cache ping failed: {}", e)))?;

        if pong != "PONG" {
            return Err(SonoraError::Cache(
                "Unexpected Redis PING response".to_string(),
            ));
        }

        Ok(())
    }
}

/// Shared store for paginator counts
#[async_trait]
pub trait CountCache: Send + Sync {
    async fn get_count(&self, key: &str) -> SonoraResult<Option<i64>>;

    async fn set_count(&self, key: &str, count: i64, ttl: Duration) -> SonoraResult<()>;

    /// Backend name for logs and metrics
    fn backend(&self) -> &'static str;
}

#[async_trait]
impl CountCache for CacheClient {
    async fn get_count(&self, key: &str) -> SonoraResult<Option<i64>> {
        self.get(key).await
    }

    async fn set_count(&self, key: &str, count: i64, ttl: Duration) -> SonoraResult<()> {
        self.set(key, &count, ttl).await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// In-process count cache with per-entry expiry
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (i64, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        before - entries.len()
    }
}

#[async_trait]
impl CountCache for MemoryCache {
    async fn get_count(&self, key: &str) -> SonoraResult<Option<i64>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(count, _)| *count))
    }

    async fn set_count(&self, key: &str, count: i64, ttl: Duration) -> SonoraResult<()> {
        debug!("Cache SET: {} = {} (TTL: {:?})", key, count, ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (count, Instant::now() + ttl));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Cache key category constants
pub mod categories {
    pub const PAGINATOR_COUNT: &str = "paginator_count_";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.key_prefix, "sonora:");
        assert_eq!(config.default_ttl, 300);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set_count("a", 7, Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set_count("b", 9, Duration::from_millis(0))
            .await
            .unwrap();

        assert_eq!(cache.get_count("a").await.unwrap(), Some(7));
        assert_eq!(cache.get_count("b").await.unwrap(), None);
        assert_eq!(cache.get_count("missing").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_disabled_client_refuses_to_connect() {
        let result = CacheClient::new(CacheConfig::default()).await;
        assert!(matches!(result, Err(SonoraError::Cache(_))));
    }
}
