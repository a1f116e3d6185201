//! Application configuration loaded from environment variables.
//!
//! Everything here is read once at startup; components receive the values
//! they need by injection rather than reading the environment themselves.

use std::env;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// TMDB API key (public, rate limited)
    pub tmdb_api_key: String,
    /// TMDB API base URL
    pub tmdb_base_url: String,
    /// Fixed catalog genre id (27 = horror)
    pub catalog_genre: u16,
    /// Feed page size for "load more" pagination
    pub feed_page_size: usize,
    /// How long a cached catalog page stays valid
    pub catalog_cache_ttl: Duration,
    /// Maximum number of cached catalog entries before LRU eviction
    pub catalog_cache_capacity: usize,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            tmdb_api_key: "test_api_key".to_string(),
            tmdb_base_url: "https://api.themoviedb.org/3".to_string(),
            catalog_genre: 27,
            feed_page_size: 10,
            catalog_cache_ttl: Duration::from_secs(5 * 60),
            catalog_cache_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            tmdb_api_key: env::var("TMDB_API_KEY").map_err(|_| ConfigError::Missing("TMDB_API_KEY"))?,
            tmdb_base_url: env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),
            catalog_genre: env::var("CATALOG_GENRE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(27),
            feed_page_size: env::var("FEED_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            catalog_cache_ttl: Duration::from_secs(
                env::var("CATALOG_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5 * 60),
            ),
            catalog_cache_capacity: env::var("CATALOG_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("TMDB_API_KEY", "test_key");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.tmdb_api_key, "test_key");
        assert_eq!(config.catalog_genre, 27);
        assert_eq!(config.feed_page_size, 10);
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(300));
    }
}
