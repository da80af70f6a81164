//! # Cache Error Types
//!
//! Failures inside the durable cache layer. Callers of [`crate::CacheStore`]
//! never see these: the store logs them and degrades to a cache miss. They
//! exist as typed values so the storage backends stay honest about what can
//! go wrong and so tests can assert on the failure paths directly.

use thiserror::Error;

// =============================================================================
// Cache Error
// =============================================================================

/// Storage and envelope failures.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The storage backend refused the operation.
    ///
    /// ## When This Occurs
    /// - Quota exhausted on the underlying store
    /// - A poisoned lock in the in-memory backend
    /// - Platform cache directory could not be resolved
    #[error("storage backend error for key '{key}': {reason}")]
    Backend { key: String, reason: String },

    /// Serializing a cache entry to JSON failed.
    #[error("failed to serialize cache entry for key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored entry no longer parses.
    ///
    /// ## When This Occurs
    /// - Record schema changed between releases
    /// - The file was truncated or hand-edited
    ///
    /// The store purges the entry and reports a miss.
    #[error("corrupt cache entry for key '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem error from the file backend.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Creates a Backend error with context.
    pub fn backend(key: &str, reason: impl Into<String>) -> Self {
        CacheError::Backend {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// Unit Tests
// =============================================================================
