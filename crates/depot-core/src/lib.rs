//! # depot-core: Pure Domain Layer for the Depot Indexation Engine
//!
//! This crate is the **heart** of the engine. It holds every decision the
//! engine makes (what a record is, which module it belongs to, how a change
//! event mutates a snapshot, how a reconciliation diff is computed) as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Depot Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Consumers (pages, search, status overlay)       │   │
//! │  │        read IndexStatus + Snapshot, call reindex()              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 depot-index (Engine Layer)                      │   │
//! │  │   batch loader • change feed • reconnect/reconcile • stores    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ depot-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  record   │  │  module   │  │  change   │  │ snapshot  │  │   │
//! │  │   │ Indexable │  │ModuleSpec │  │ RawChange │  │ apply/diff│  │   │
//! │  │   │ ItemRecord│  │ predicates│  │ChangeEvent│  │  algebra  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TIMERS • NO CHANNELS • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 depot-cache (Persistence Layer)                 │   │
//! │  │          TTL envelope over a pluggable storage backend          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`record`] - The [`Indexable`] trait and the concrete inventory records
//! - [`module`] - Module specs: table, cache key, server filter, predicate
//! - [`change`] - Wire change frames and their validated form
//! - [`snapshot`] - In-memory snapshot with apply and reconciliation diff
//! - [`state`] - Indexation state machine values and status projections
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every function is deterministic
//! 2. **No I/O**: network, storage, and timers live in other crates
//! 3. **Validated Boundaries**: untyped wire payloads become typed events
//!    exactly once, at the edge
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod change;
pub mod error;
pub mod module;
pub mod record;
pub mod snapshot;
pub mod state;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use depot_core::Snapshot` instead of
// `use depot_core::snapshot::Snapshot`

pub use change::{ChangeEvent, ChangeKind, RawChange};
pub use error::{CoreError, CoreResult};
pub use module::{Filter, FilterOp, ModuleMeta, ModuleSpec};
pub use record::{
    Custodian, CustodyRecord, DecommissionRecord, Indexable, ItemRecord, LifecycleStatus,
    Location, UnlistedItem,
};
pub use snapshot::{Applied, Snapshot};
pub use state::{IndexStatus, ReconnectionStatus, StatusEntry, StatusKind};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default page size for batch loads.
///
/// ## Why 1000?
/// Large enough that a typical module loads in a handful of round trips,
/// small enough that a single page response stays well under backend row
/// limits. Overridable per module via `ModuleSpec::page_size`.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default cap on consecutive resubscribe attempts before a store gives up
/// and surfaces `failed`. Overridable per module.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
