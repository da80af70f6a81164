//! # Module Specs
//!
//! A *module* is one inventory domain with its own backing table, cache key,
//! server-side filter, and client-side membership predicate. The engine runs
//! one indexation store per module; everything that distinguishes the seven
//! modules from each other lives in the [`ModuleSpec`] values built here, so
//! the store itself stays a single generic implementation.
//!
//! ## The Seven Modules
//! ```text
//! ┌──────────────────┬────────────────────────┬───────────────────────────┐
//! │ Module           │ Backing table          │ Membership predicate      │
//! ├──────────────────┼────────────────────────┼───────────────────────────┤
//! │ active-items     │ items                  │ status == active          │
//! │ obsolete-items   │ items                  │ status == obsolete        │
//! │ decommissions    │ decommission_records   │ (whole table)             │
//! │ custody-records  │ custody_records        │ (whole table)             │
//! │ unlisted-items   │ unlisted_items         │ !resolved                 │
//! │ custodians       │ custodians             │ active                    │
//! │ locations        │ locations              │ (whole table)             │
//! └──────────────────┴────────────────────────┴───────────────────────────┘
//! ```
//!
//! The server filter and the client predicate express the same membership
//! rule twice: the filter keeps batch loads from shipping rows the module
//! will never show, the predicate re-checks every change event because the
//! live feed delivers whole-table events with no server-side filtering.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::record::{
    Custodian, CustodyRecord, DecommissionRecord, Indexable, ItemRecord, LifecycleStatus,
    Location, UnlistedItem,
};
use crate::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_PAGE_SIZE};

// =============================================================================
// Module Metadata
// =============================================================================

/// Display metadata for one module, carried verbatim into status entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ModuleMeta {
    /// Stable machine name ("active-items"). Keys dismissal state and logs.
    pub slug: String,
    /// Human-readable name shown in the status overlay.
    pub label: String,
    /// Icon name understood by the frontend icon set.
    pub icon: String,
    /// Accent/glow color as a CSS hex string.
    pub accent: String,
}

impl ModuleMeta {
    pub fn new(slug: &str, label: &str, icon: &str, accent: &str) -> Self {
        ModuleMeta {
            slug: slug.to_string(),
            label: label.to_string(),
            icon: icon.to_string(),
            accent: accent.to_string(),
        }
    }
}

// =============================================================================
// Server-Side Filter
// =============================================================================

/// Comparison operator for a server-side row restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Column equals a scalar value.
    Eq,
    /// Column IS a boolean/null value (backend "is" semantics).
    Is,
}

/// Declarative restriction applied to count and page queries. Kept as data,
/// not SQL, so backends can render it into their own query dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter {
            column: column.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn is(column: &str, value: bool) -> Self {
        Filter {
            column: column.to_string(),
            op: FilterOp::Is,
            value: Value::Bool(value),
        }
    }
}

// =============================================================================
// Module Spec
// =============================================================================

/// Everything the engine needs to know to index one module.
///
/// The predicate is a plain function pointer so specs stay `Clone` without
/// boxing and the membership rule is trivially testable in isolation.
#[derive(Clone)]
pub struct ModuleSpec<R: Indexable> {
    pub meta: ModuleMeta,
    /// Backing table name, also the change-feed subscription key.
    pub table: &'static str,
    /// Durable cache key prefix; tenant-scoped via [`ModuleSpec::cache_key_for`].
    pub cache_key: &'static str,
    /// Server-side restriction for count and page queries, if any.
    pub filter: Option<Filter>,
    /// Client-side membership rule re-applied to every change event.
    pub predicate: fn(&R) -> bool,
    /// Per-module override of the resubscribe attempt cap.
    pub max_reconnect_attempts: Option<u32>,
    /// Per-module override of the batch load page size.
    pub page_size: Option<u32>,
}

impl<R: Indexable> ModuleSpec<R> {
    /// Effective page size for batch loads.
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Effective cap on consecutive resubscribe attempts.
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
            .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }

    /// Durable cache key scoped to one tenant. A tenant switch must never
    /// surface another tenant's cached records, so the tenant is part of
    /// the key rather than part of the payload.
    pub fn cache_key_for(&self, tenant: &str) -> String {
        format!("{}:{}", self.cache_key, tenant)
    }
}

impl<R: Indexable> std::fmt::Debug for ModuleSpec<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("slug", &self.meta.slug)
            .field("table", &self.table)
            .field("cache_key", &self.cache_key)
            .field("filter", &self.filter)
            .finish()
    }
}

// =============================================================================
// Membership Predicates
// =============================================================================

fn item_is_active(item: &ItemRecord) -> bool {
    item.status == LifecycleStatus::Active
}

fn item_is_obsolete(item: &ItemRecord) -> bool {
    item.status == LifecycleStatus::Obsolete
}

fn unlisted_is_open(item: &UnlistedItem) -> bool {
    !item.resolved
}

fn custodian_is_active(custodian: &Custodian) -> bool {
    custodian.active
}

fn member_always<R: Indexable>(_: &R) -> bool {
    true
}

// =============================================================================
// The Seven Module Constructors
// =============================================================================

impl ModuleSpec<ItemRecord> {
    /// Items currently in service.
    pub fn active_items() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("active-items", "Active Items", "box", "#34d399"),
            table: "items",
            cache_key: "depot.index.active_items",
            filter: Some(Filter::eq("status", "active")),
            predicate: item_is_active,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }

    /// Items retired from service but not yet written off.
    pub fn obsolete_items() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("obsolete-items", "Obsolete Items", "archive", "#fbbf24"),
            table: "items",
            cache_key: "depot.index.obsolete_items",
            filter: Some(Filter::eq("status", "obsolete")),
            predicate: item_is_obsolete,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }
}

impl ModuleSpec<DecommissionRecord> {
    /// Write-off entries, whole table.
    pub fn decommissions() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("decommissions", "Decommission Records", "trash", "#f87171"),
            table: "decommission_records",
            cache_key: "depot.index.decommissions",
            filter: None,
            predicate: member_always,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }
}

impl ModuleSpec<CustodyRecord> {
    /// Custodial assignments, whole table (history included).
    pub fn custody_records() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("custody-records", "Custody Records", "clipboard", "#60a5fa"),
            table: "custody_records",
            cache_key: "depot.index.custody_records",
            filter: None,
            predicate: member_always,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }
}

impl ModuleSpec<UnlistedItem> {
    /// Found-on-premises items awaiting resolution.
    pub fn unlisted_items() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("unlisted-items", "Unlisted Items", "help-circle", "#c084fc"),
            table: "unlisted_items",
            cache_key: "depot.index.unlisted_items",
            filter: Some(Filter::is("resolved", false)),
            predicate: unlisted_is_open,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }
}

impl ModuleSpec<Custodian> {
    /// People who can hold custody; inactive ones are excluded.
    pub fn custodians() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("custodians", "Custodians", "users", "#38bdf8"),
            table: "custodians",
            cache_key: "depot.index.custodians",
            filter: Some(Filter::is("active", true)),
            predicate: custodian_is_active,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }
}

impl ModuleSpec<Location> {
    /// Physical locations, whole table.
    pub fn locations() -> Self {
        ModuleSpec {
            meta: ModuleMeta::new("locations", "Locations", "map-pin", "#4ade80"),
            table: "locations",
            cache_key: "depot.index.locations",
            filter: None,
            predicate: member_always,
            max_reconnect_attempts: None,
            page_size: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
