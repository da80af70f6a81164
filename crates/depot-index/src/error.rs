//! # Index Error Types
//!
//! Error types for the indexation engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Index Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Backend      │  │       Feed              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  CountFailed    │  │  SubscribeFailed        │ │
//! │  │  ConfigLoad/    │  │  PageFailed     │  │  FeedClosed             │ │
//! │  │  SaveFailed     │  │  MalformedRow   │  │  WebSocketError         │ │
//! │  │  InvalidUrl     │  │  RequestFailed  │  │  MalformedChange        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │     Engine      │   Batch load errors land in IndexStatus.error;    │
//! │  │                 │   feed errors drive the reconnect state machine;  │
//! │  │  Reconnect-     │   nothing here crosses a module boundary.         │
//! │  │  Exhausted      │                                                    │
//! │  │  ChannelError   │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for engine operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Engine error type covering backend, feed, and lifecycle failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum IndexError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Invalid backend or feed URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Backend Errors (batch loads)
    // =========================================================================
    /// The count query failed.
    #[error("Count query failed for {table}: {reason}")]
    CountFailed { table: String, reason: String },

    /// A page fetch failed; the whole load aborts.
    #[error("Page fetch failed for {table} at offset {offset}: {reason}")]
    PageFailed {
        table: String,
        offset: u64,
        reason: String,
    },

    /// A fetched row does not deserialize into the module's record type.
    #[error("Malformed row in {table}: {source}")]
    MalformedRow {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP request failed before yielding a response body.
    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    /// The backend answered with something unusable (bad status, missing
    /// count header, non-array body).
    #[error("Backend response invalid: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Feed Errors (change stream)
    // =========================================================================
    /// Subscribing to a table's change stream failed.
    #[error("Subscribe failed for {table}: {reason}")]
    SubscribeFailed { table: String, reason: String },

    /// The change stream closed; the store enters reconnection.
    #[error("Change feed closed")]
    FeedClosed,

    /// WebSocket protocol error on the feed connection.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// A change frame failed boundary validation.
    #[error("Malformed change event: {0}")]
    MalformedChange(#[from] depot_core::CoreError),

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// Resubscribe attempts exhausted; the store is now failed.
    #[error("Reconnection exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        IndexError::RequestFailed(err.to_string())
    }
}

impl From<url::ParseError> for IndexError {
    fn from(err: url::ParseError) -> Self {
        IndexError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for IndexError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => IndexError::FeedClosed,
            WsError::AlreadyClosed => IndexError::FeedClosed,
            WsError::Protocol(p) => IndexError::WebSocketError(p.to_string()),
            other => IndexError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for IndexError {
    fn from(err: toml::de::Error) -> Self {
        IndexError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for IndexError {
    fn from(err: toml::ser::Error) -> Self {
        IndexError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl IndexError {
    /// Returns true if this error is recoverable by retrying the operation.
    ///
    /// ## Retryable Errors
    /// - Network failures (requests, subscribes, socket errors)
    /// - Aborted loads (count/page failures), via manual reindex
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Schema drift (malformed rows or change frames)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexError::RequestFailed(_)
                | IndexError::InvalidResponse(_)
                | IndexError::CountFailed { .. }
                | IndexError::PageFailed { .. }
                | IndexError::SubscribeFailed { .. }
                | IndexError::FeedClosed
                | IndexError::WebSocketError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidConfig(_)
                | IndexError::ConfigLoadFailed(_)
                | IndexError::ConfigSaveFailed(_)
                | IndexError::InvalidUrl(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(IndexError::RequestFailed("connection refused".into()).is_retryable());
        assert!(IndexError::FeedClosed.is_retryable());
        assert!(IndexError::PageFailed {
            table: "items".into(),
            offset: 2000,
            reason: "500".into()
        }
        .is_retryable());

        assert!(!IndexError::InvalidConfig("bad page size".into()).is_retryable());
        assert!(!IndexError::ReconnectExhausted { attempts: 5 }.is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(IndexError::InvalidUrl("not a url".into()).is_config_error());
        assert!(!IndexError::FeedClosed.is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = IndexError::PageFailed {
            table: "custody_records".into(),
            offset: 3000,
            reason: "timeout".into(),
        };
        assert!(err.to_string().contains("custody_records"));
        assert!(err.to_string().contains("3000"));
    }
}
