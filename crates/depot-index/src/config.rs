//! # Index Configuration
//!
//! Configuration management for the indexation engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DEPOT_BACKEND_URL=https://api.depot.example                        │
//! │     DEPOT_FEED_URL=wss://feed.depot.example/changes                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/depot-inventory/index.toml (Linux)                       │
//! │     ~/Library/Application Support/com.depot.inventory/index.toml (mac) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     page_size = 1000, cache ttl = 7 days, max reconnects = 5           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # index.toml
//! [backend]
//! base_url = "https://api.depot.example"
//! request_timeout_secs = 30
//! page_size = 1000
//!
//! [feed]
//! url = "wss://feed.depot.example/changes"
//! connect_timeout_secs = 10
//!
//! [reconnect]
//! max_attempts = 5
//! initial_backoff_ms = 500
//! max_backoff_secs = 30
//!
//! [cache]
//! enabled = true
//! ttl_days = 7
//!
//! [status]
//! poll_interval_ms = 500
//! pulse_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};

// =============================================================================
// Backend Settings
// =============================================================================

/// Settings for the record backend used by batch loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the record API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for authenticated requests, if the deployment needs one.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Rows fetched per page during batch loads.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    depot_core::DEFAULT_PAGE_SIZE
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            base_url: default_base_url(),
            bearer_token: None,
            request_timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

// =============================================================================
// Feed Settings
// =============================================================================

/// Settings for the change-stream feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// WebSocket URL of the change feed.
    #[serde(default = "default_feed_url")]
    pub url: String,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_feed_url() -> String {
    "ws://localhost:3001/changes".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            url: default_feed_url(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Reconnect Settings
// =============================================================================

/// Settings for the reconnection state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    /// Maximum resubscribe attempts before a store is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_max_attempts() -> u32 {
    depot_core::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        ReconnectSettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Settings for the durable snapshot cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Whether snapshots are persisted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Snapshot freshness window (days).
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    /// Cache directory override. Defaults to the platform cache dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_ttl_days() -> i64 {
    depot_cache::DEFAULT_TTL_DAYS
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_days: default_ttl_days(),
            dir: None,
        }
    }
}

// =============================================================================
// Status Settings
// =============================================================================

/// Settings for the status aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSettings {
    /// Interval between status polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a success pulse stays visible (seconds).
    #[serde(default = "default_pulse_secs")]
    pub pulse_secs: u64,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_pulse_secs() -> u64 {
    5
}

impl Default for StatusSettings {
    fn default() -> Self {
        StatusSettings {
            poll_interval_ms: default_poll_interval(),
            pulse_secs: default_pulse_secs(),
        }
    }
}

// =============================================================================
// Main Index Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [backend]
/// base_url = "https://api.depot.example"
/// page_size = 1000
///
/// [feed]
/// url = "wss://feed.depot.example/changes"
///
/// [reconnect]
/// max_attempts = 5
/// initial_backoff_ms = 500
///
/// [cache]
/// enabled = true
/// ttl_days = 7
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Record backend settings.
    #[serde(default)]
    pub backend: BackendSettings,

    /// Change feed settings.
    #[serde(default)]
    pub feed: FeedSettings,

    /// Reconnection settings.
    #[serde(default)]
    pub reconnect: ReconnectSettings,

    /// Snapshot cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Status aggregator settings.
    #[serde(default)]
    pub status: StatusSettings,
}

impl IndexConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (index.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> IndexResult<Self> {
        let mut config = Self::default();

        // Try to load from config file
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading index config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load index config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> IndexResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| IndexError::ConfigSaveFailed("No config path available".into()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Index config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IndexResult<()> {
        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(IndexError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if !self.feed.url.starts_with("ws://") && !self.feed.url.starts_with("wss://") {
            return Err(IndexError::InvalidUrl(format!(
                "Feed URL must start with ws:// or wss://, got: {}",
                self.feed.url
            )));
        }

        if self.backend.page_size == 0 {
            return Err(IndexError::InvalidConfig(
                "page_size must be greater than 0".into(),
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(IndexError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        if self.cache.ttl_days < 1 {
            return Err(IndexError::InvalidConfig(
                "ttl_days must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Backend URL
        if let Ok(url) = std::env::var("DEPOT_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        // API token
        if let Ok(token) = std::env::var("DEPOT_API_TOKEN") {
            self.backend.bearer_token = Some(token);
        }

        // Feed URL
        if let Ok(url) = std::env::var("DEPOT_FEED_URL") {
            debug!(url = %url, "Overriding feed URL from environment");
            self.feed.url = url;
        }

        // Page size
        if let Ok(size) = std::env::var("DEPOT_PAGE_SIZE") {
            if let Ok(s) = size.parse::<u32>() {
                self.backend.page_size = s;
            }
        }

        // Max reconnect attempts
        if let Ok(attempts) = std::env::var("DEPOT_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<u32>() {
                debug!(attempts = a, "Overriding max reconnect attempts from environment");
                self.reconnect.max_attempts = a;
            }
        }

        // Cache directory
        if let Ok(dir) = std::env::var("DEPOT_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }

        // Cache TTL
        if let Ok(days) = std::env::var("DEPOT_CACHE_TTL_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.cache.ttl_days = d;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "depot", "inventory").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("index.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the backend base URL.
    pub fn backend_url(&self) -> &str {
        &self.backend.base_url
    }

    /// Returns the feed URL.
    pub fn feed_url(&self) -> &str {
        &self.feed.url
    }

    /// Returns the page size for batch loads.
    pub fn page_size(&self) -> u32 {
        self.backend.page_size
    }

    /// Returns the cache TTL as a duration.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache.ttl_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.backend.page_size, 1000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.cache.ttl_days, 7);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = IndexConfig::default();
        assert!(config.validate().is_ok());

        // Non-HTTP backend URL should fail
        config.backend.base_url = "ftp://files.example".to_string();
        assert!(config.validate().is_err());
        config.backend.base_url = "https://api.depot.example".to_string();

        // Non-WebSocket feed URL should fail
        config.feed.url = "http://feed.example".to_string();
        assert!(config.validate().is_err());
        config.feed.url = "wss://feed.example/changes".to_string();
        assert!(config.validate().is_ok());

        // Zero page size should fail
        config.backend.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = IndexConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[backend]"));
        assert!(toml_str.contains("[reconnect]"));
    }

    #[test]
    fn test_toml_partial_file_fills_defaults() {
        let parsed: IndexConfig = toml::from_str(
            r#"
            [backend]
            base_url = "https://api.depot.example"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.backend.base_url, "https://api.depot.example");
        assert_eq!(parsed.backend.page_size, 1000);
        assert_eq!(parsed.reconnect.max_attempts, 5);
    }
}
