//! # Storage Backend
//!
//! The pluggable key/value seam under the cache store. Values are opaque
//! strings (JSON text in practice); the TTL envelope and all policy live a
//! layer up in [`crate::CacheStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CacheError, CacheResult};

// =============================================================================
// StorageBackend Trait
// =============================================================================

/// Synchronous string key/value storage.
///
/// Implementations must be safe to share across store tasks; every engine
/// store holds the same backend behind an `Arc`.
pub trait StorageBackend: Send + Sync {
    /// Returns the stored value, or `None` if the key is absent.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores the value, overwriting any previous one.
    fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Removes the key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> CacheResult<()>;
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// HashMap-backed storage. The default for tests and for sessions that opt
/// out of on-disk persistence.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::backend(key, "storage mutex poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::backend(key, "storage mutex poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::backend(key, "storage mutex poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove_round_trip() {
        let storage = MemoryStorage::new();

        assert!(storage.get("k").unwrap().is_none());

        storage.set("k", "v1").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v1"));

        storage.set("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));

        storage.remove("k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
    }

    #[test]
    fn test_removing_absent_key_is_fine() {
        let storage = MemoryStorage::new();
        storage.remove("never-set").unwrap();
        assert!(storage.is_empty());
    }
}
