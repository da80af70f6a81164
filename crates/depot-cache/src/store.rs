//! # Cache Store
//!
//! The TTL envelope over a [`StorageBackend`]. Payloads are stored as
//! `CacheEntry` JSON with a `written_at` stamp; reads treat anything older
//! than the TTL as absent and purge it on the way out.
//!
//! ## Failure Policy
//! `load`, `save`, and `clear` never fail from the caller's point of view.
//! A broken backend, a full disk, or a corrupt entry degrades to a cache
//! miss and a `warn` log line; the engine must keep working with
//! persistence unavailable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::storage::StorageBackend;

/// Days before a cache entry is considered stale.
pub const DEFAULT_TTL_DAYS: i64 = 7;

// =============================================================================
// Cache Entry
// =============================================================================

/// Stored envelope: the payload plus the write stamp the TTL is measured
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub written_at: DateTime<Utc>,
    pub payload: T,
}

// =============================================================================
// Cache Store
// =============================================================================

/// Durable cache with a TTL. One instance is shared by every module store;
/// payload types are chosen per call.
#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<dyn StorageBackend>,
    ttl: Duration,
}

impl CacheStore {
    /// Creates a store with the default 7-day TTL.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        CacheStore::with_ttl(storage, Duration::days(DEFAULT_TTL_DAYS))
    }

    /// Creates a store with an explicit TTL.
    pub fn with_ttl(storage: Arc<dyn StorageBackend>, ttl: Duration) -> Self {
        CacheStore { storage, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads and unwraps the entry at `key`.
    ///
    /// Returns `None` when the key is absent, the entry is stale (purged as
    /// a side effect), the entry is corrupt (also purged), or the backend
    /// fails. An entry exactly TTL old is still served.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = match self.storage.get(key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&text) {
            Ok(entry) => entry,
            Err(source) => {
                let err = CacheError::Corrupt {
                    key: key.to_string(),
                    source,
                };
                warn!(key = key, error = %err, "purging corrupt cache entry");
                self.clear(key);
                return None;
            }
        };

        let age = Utc::now() - entry.written_at;
        if age > self.ttl {
            debug!(
                key = key,
                age_hours = age.num_hours(),
                "purging stale cache entry"
            );
            self.clear(key);
            return None;
        }

        Some(entry.payload)
    }

    /// Writes `payload` at `key`, stamping the current time. Overwrites
    /// unconditionally.
    pub fn save<T: Serialize>(&self, key: &str, payload: &T) {
        let entry = CacheEntry {
            written_at: Utc::now(),
            payload,
        };

        let text = match serde_json::to_string(&entry) {
            Ok(text) => text,
            Err(source) => {
                let err = CacheError::Serialize {
                    key: key.to_string(),
                    source,
                };
                warn!(key = key, error = %err, "cache write skipped");
                return;
            }
        };

        if let Err(err) = self.storage.set(key, &text) {
            warn!(key = key, error = %err, "cache write failed");
        }
    }

    /// Removes the entry at `key`, if any.
    pub fn clear(&self, key: &str) {
        if let Err(err) = self.storage.remove(key) {
            warn!(key = key, error = %err, "cache clear failed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
