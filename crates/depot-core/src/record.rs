//! # Record Types
//!
//! The inventory records the engine indexes, and the [`Indexable`] trait
//! every cached record type implements.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Record Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   ItemRecord    │   │  CustodyRecord  │   │ Decommission    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │ Record          │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  ─────────────  │       │
//! │  │  asset_tag      │   │  item_id (FK)   │   │  id (UUID)      │       │
//! │  │  lifecycle      │   │  custodian_id   │   │  item_id (FK)   │       │
//! │  │  status         │   │  returned_at?   │   │  reason         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  UnlistedItem   │   │    Custodian    │   │    Location     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  resolved flag  │   │  active flag    │   │  building/floor │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every record has:
//! - `id`: UUID v4 - immutable, the identity the snapshot algebra keys on
//! - Business ID where one exists (asset_tag, etc.) - human-readable

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Indexable
// =============================================================================

/// A record type the engine can index: load in pages, cache durably, and
/// mutate through change events.
///
/// ## Bound Rationale
/// - `Clone`: snapshots hand owned copies to consumers.
/// - `PartialEq`: reconciliation diffs compare field values, not just ids.
/// - `Serialize + DeserializeOwned`: records cross the cache and wire
///   boundaries as JSON.
/// - `Send + Sync + 'static`: records live inside spawned store tasks.
pub trait Indexable:
    Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable unique identifier. The snapshot algebra keys every upsert,
    /// removal, and diff on this value, and batch loads order pages by it.
    fn record_id(&self) -> &str;
}

// =============================================================================
// Lifecycle Status
// =============================================================================

/// Lifecycle flag determining which item module a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// In service and visible in the active-items module.
    Active,
    /// Retired from service but still on the books.
    Obsolete,
    /// Written off; visible only through decommission records.
    Decommissioned,
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        LifecycleStatus::Active
    }
}

// =============================================================================
// Item Record
// =============================================================================

/// A tracked inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this item belongs to.
    pub tenant_id: String,

    /// Asset tag - business identifier printed on the physical label.
    pub asset_tag: String,

    /// Display name shown in listings and reports.
    pub name: String,

    /// Free-form category (e.g. "laptop", "projector").
    pub category: String,

    /// Location currently holding the item.
    pub location_id: Option<String>,

    /// Custodian currently responsible for the item.
    pub custodian_id: Option<String>,

    /// Acquisition cost in cents (smallest currency unit).
    pub acquisition_cost_cents: Option<i64>,

    /// Lifecycle flag deciding module membership.
    pub status: LifecycleStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Indexable for ItemRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Custody Record
// =============================================================================

/// One custodial assignment of an item to a custodian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustodyRecord {
    pub id: String,
    pub tenant_id: String,
    pub item_id: String,
    pub custodian_id: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub assigned_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub returned_at: Option<DateTime<Utc>>,
}

impl Indexable for CustodyRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Decommission Record
// =============================================================================

/// Write-off entry for an item taken out of service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DecommissionRecord {
    pub id: String,
    pub tenant_id: String,
    pub item_id: String,
    pub reason: String,
    pub approved_by: Option<String>,
    #[ts(as = "String")]
    pub decommissioned_at: DateTime<Utc>,
}

impl Indexable for DecommissionRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Unlisted Item
// =============================================================================

/// An item found on premises with no matching inventory entry. Stays in the
/// unlisted-items module until a clerk resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnlistedItem {
    pub id: String,
    pub tenant_id: String,
    pub description: String,
    pub reported_by: String,
    pub location_id: Option<String>,
    pub resolved: bool,
    #[ts(as = "String")]
    pub reported_at: DateTime<Utc>,
}

impl Indexable for UnlistedItem {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Custodian
// =============================================================================

/// A person who can hold custody of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Custodian {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    /// Inactive custodians are hidden from assignment pickers.
    pub active: bool,
}

impl Indexable for Custodian {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Location
// =============================================================================

/// A physical place items live in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub building: Option<String>,
    pub floor: Option<String>,
}

impl Indexable for Location {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(id: &str, status: LifecycleStatus) -> ItemRecord {
        ItemRecord {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            asset_tag: format!("AT-{id}"),
            name: "Projector".to_string(),
            category: "av".to_string(),
            location_id: None,
            custodian_id: None,
            acquisition_cost_cents: Some(125_000),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_id_is_the_uuid_field() {
        let item = sample_item("item-1", LifecycleStatus::Active);
        assert_eq!(item.record_id(), "item-1");
    }

    #[test]
    fn test_lifecycle_status_serializes_snake_case() {
        let json = serde_json::to_string(&LifecycleStatus::Decommissioned).unwrap();
        assert_eq!(json, r#""decommissioned""#);

        let parsed: LifecycleStatus = serde_json::from_str(r#""obsolete""#).unwrap();
        assert_eq!(parsed, LifecycleStatus::Obsolete);
    }

    #[test]
    fn test_lifecycle_status_defaults_to_active() {
        assert_eq!(LifecycleStatus::default(), LifecycleStatus::Active);
    }

    #[test]
    fn test_item_round_trips_through_json() {
        let item = sample_item("item-2", LifecycleStatus::Obsolete);
        let json = serde_json::to_string(&item).unwrap();
        let back: ItemRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
