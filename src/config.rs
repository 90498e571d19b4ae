/// Configuration management for Sonora
use crate::cache::CacheConfig;
use crate::error::{SonoraError, SonoraResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub listing: ListingConfig,
    pub moderation: ModerationConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(skip)]
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public domain used to build absolute URLs (e.g. "freesound.example")
    pub site_domain: String,
    pub version: String,
    /// Feed advertised on the front page
    pub rss_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    /// Root of the out-of-band analysis statistics files
    pub analysis_directory: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Usernames granted moderation capability regardless of their account flag
    pub moderator_usernames: Vec<String>,
    pub session_ttl_hours: i64,
}

/// Paginated listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    pub page_size: i64,
    /// Seconds a cached listing count stays valid
    pub count_cache_ttl: u64,
}

/// Moderation dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Days without a reply before a ticket shows up as tardy
    pub tardy_days: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub anonymous_rps: u32,
    pub authenticated_rps: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives used when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SonoraResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("SONORA_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("SONORA_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| SonoraError::Validation("Invalid port number".to_string()))?;
        let site_domain =
            env::var("SONORA_SITE_DOMAIN").unwrap_or_else(|_| format!("{}:{}", hostname, port));
        let version = env::var("SONORA_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let rss_url = env::var("SONORA_RSS_URL")
            .unwrap_or_else(|_| format!("http://{}/blog/feed/", site_domain));

        let data_directory: PathBuf = env::var("SONORA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("SONORA_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("sonora.sqlite"));
        let analysis_directory = env::var("SONORA_ANALYSIS_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("analysis"));

        let moderator_usernames = env::var("SONORA_MODERATORS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let cache = CacheConfig::from_env();

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                site_domain,
                version,
                rss_url,
            },
            storage: StorageConfig {
                data_directory,
                database,
                analysis_directory,
            },
            authentication: AuthConfig {
                moderator_usernames,
                session_ttl_hours: env_or("SONORA_SESSION_TTL_HOURS", 24 * 14),
            },
            listing: ListingConfig {
                page_size: env_or("SONORA_PAGE_SIZE", 20),
                count_cache_ttl: env_or("SONORA_COUNT_CACHE_TTL", cache.default_ttl),
            },
            moderation: ModerationConfig {
                tardy_days: env_or("SONORA_TARDY_DAYS", 2),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("SONORA_RATE_LIMITS_ENABLED", true),
                anonymous_rps: env_or("SONORA_RATE_LIMIT_ANON_RPS", 10),
                authenticated_rps: env_or("SONORA_RATE_LIMIT_AUTH_RPS", 100),
            },
            cache,
            logging: LoggingConfig {
                level: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "sonora=debug,tower_http=debug".to_string()),
                json: env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> SonoraResult<()> {
        if self.service.hostname.is_empty() {
            return Err(SonoraError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.service.site_domain.is_empty() {
            return Err(SonoraError::Validation(
                "Site domain cannot be empty".to_string(),
            ));
        }

        if self.listing.page_size < 1 {
            return Err(SonoraError::Validation(
                "Page size must be at least 1".to_string(),
            ));
        }

        if self.moderation.tardy_days < 0 {
            return Err(SonoraError::Validation(
                "Tardy threshold cannot be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by tests: everything local, nothing from the environment
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8000,
                site_domain: "sonora.test".to_string(),
                version: "test".to_string(),
                rss_url: "http://sonora.test/blog/feed/".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
                analysis_directory: PathBuf::from("./data/analysis"),
            },
            authentication: AuthConfig {
                moderator_usernames: vec![],
                session_ttl_hours: 24,
            },
            listing: ListingConfig {
                page_size: 20,
                count_cache_ttl: 300,
            },
            moderation: ModerationConfig { tardy_days: 2 },
            rate_limit: RateLimitConfig {
                enabled: false,
                anonymous_rps: 10,
                authenticated_rps: 100,
            },
            cache: CacheConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = ServerConfig::for_tests();
        assert!(config.validate().is_ok());

        config.listing.page_size = 0;
        assert!(config.validate().is_err());
    }
}
