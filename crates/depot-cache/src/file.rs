//! # File Backend
//!
//! On-disk [`StorageBackend`]: one JSON file per key under a root directory.
//! Writes land in a temp file first and are renamed into place, so a crash
//! mid-write leaves the previous entry intact rather than a torn file.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{CacheError, CacheResult};
use crate::storage::StorageBackend;

// =============================================================================
// File Storage
// =============================================================================

/// Directory-of-files storage rooted at a caller-chosen path.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens storage rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FileStorage { root })
    }

    /// Opens storage under the platform cache directory
    /// (e.g. `~/.cache/inventory/index` on Linux).
    pub fn at_default_root() -> CacheResult<Self> {
        let dirs = ProjectDirs::from("com", "depot", "inventory").ok_or_else(|| {
            CacheError::backend("cache-root", "platform cache directory unavailable")
        })?;
        FileStorage::new(dirs.cache_dir().join("index"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for a raw key. Keys carry characters that are not portable
    /// in file names (`:` in tenant-scoped keys), so unsafe characters are
    /// replaced; distinct raw keys must still not collide after that, so
    /// the name also carries a hash of the raw key.
    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);

        self.root
            .join(format!("{sanitized}-{:08x}.json", hasher.finish() as u32))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        fs::create_dir_all(&self.root)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
