//! # depot-cache: Durable Cache Layer for Depot
//!
//! A TTL key/value cache over pluggable local storage. The engine mirrors
//! every committed module snapshot through this crate so the next session
//! can warm-start without a full batch load.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Durable Cache Layer                                │
//! │                                                                         │
//! │   depot-index store task                                                │
//! │        │  load / save / clear (never fail: degrade to miss)             │
//! │        ▼                                                                │
//! │   ┌────────────────────────────────────────────────────┐               │
//! │   │                  CacheStore                        │               │
//! │   │   CacheEntry { written_at, payload } as JSON       │               │
//! │   │   TTL check + stale purge on read                  │               │
//! │   └──────────────────────┬─────────────────────────────┘               │
//! │                          │ StorageBackend (get/set/remove)             │
//! │            ┌─────────────┴──────────────┐                              │
//! │            ▼                            ▼                              │
//! │   ┌─────────────────┐         ┌─────────────────┐                      │
//! │   │  MemoryStorage  │         │   FileStorage   │                      │
//! │   │  (tests, opt-   │         │  one file/key,  │                      │
//! │   │   out sessions) │         │  temp + rename  │                      │
//! │   └─────────────────┘         └─────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`] - The [`CacheStore`] TTL envelope
//! - [`storage`] - The [`StorageBackend`] trait and [`MemoryStorage`]
//! - [`file`] - On-disk [`FileStorage`]
//! - [`error`] - Typed failures (internal; callers see misses)

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod file;
pub mod storage;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CacheError, CacheResult};
pub use file::FileStorage;
pub use storage::{MemoryStorage, StorageBackend};
pub use store::{CacheEntry, CacheStore, DEFAULT_TTL_DAYS};
