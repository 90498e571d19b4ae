/// Application context and dependency injection
use crate::{
    account::AccountManager,
    cache::{CacheClient, CountCache, MemoryCache},
    config::ServerConfig,
    db,
    error::SonoraResult,
    rate_limit::RateLimiter,
    sounds::SoundStore,
    tickets::{ModerationWorkflow, TicketManager},
    urls::{RouteTable, UrlResolver},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub sound_store: Arc<SoundStore>,
    // Tickets & moderation
    pub ticket_manager: Arc<TicketManager>,
    pub moderation: Arc<ModerationWorkflow>,
    // Shared paginator count cache
    pub count_cache: Arc<dyn CountCache>,
    pub urls: Arc<dyn UrlResolver>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> SonoraResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let count_cache: Arc<dyn CountCache> = if config.cache.enabled {
            match CacheClient::new(config.cache.clone()).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::warn!("Redis unavailable, using in-process count cache: {}", e);
                    Self::memory_cache()
                }
            }
        } else {
            tracing::info!("Redis disabled, using in-process count cache");
            Self::memory_cache()
        };

        Ok(Self::from_parts(config, db, count_cache))
    }

    /// Wire the managers around an existing pool and cache
    pub fn from_parts(config: ServerConfig, db: SqlitePool, count_cache: Arc<dyn CountCache>) -> Self {
        let account_manager = Arc::new(AccountManager::new(
            db.clone(),
            config.authentication.moderator_usernames.clone(),
            chrono::Duration::hours(config.authentication.session_ttl_hours),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            account_manager,
            sound_store: Arc::new(SoundStore::new(db.clone())),
            ticket_manager: Arc::new(TicketManager::new(db.clone())),
            moderation: Arc::new(ModerationWorkflow::new(db.clone())),
            count_cache,
            urls: Arc::new(RouteTable::default()),
            rate_limiter,
            config: Arc::new(config),
            db,
        }
    }

    /// In-process cache with a background sweep of expired counts
    fn memory_cache() -> Arc<dyn CountCache> {
        let cache = Arc::new(MemoryCache::new());
        let sweeper = Arc::clone(&cache);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(600));
            loop {
                interval.tick().await;
                let purged = sweeper.purge_expired().await;
                if purged > 0 {
                    tracing::debug!("Purged {} expired paginator counts", purged);
                }
            }
        });

        cache
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> SonoraResult<()> {
        let dirs = [
            &config.storage.data_directory,
            &config.storage.analysis_directory,
        ];

        for dir in dirs {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        Ok(())
    }

    /// How long a listing count stays cached
    pub fn count_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.listing.count_cache_ttl)
    }

    /// Absolute URL for a named route
    pub fn absolute_url(&self, name: &str, args: &[&str]) -> Option<String> {
        self.urls
            .resolve(name, args)
            .map(|path| crate::urls::prepend_base(&self.config.service.site_domain, &path))
    }
}
