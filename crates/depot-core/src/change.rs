//! # Change Events
//!
//! Wire frames from the backend's live feed and their validated, typed form.
//!
//! ## Two Representations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Change Event Pipeline                               │
//! │                                                                         │
//! │   wire (JSON text frame)                                                │
//! │   {"type":"update","before":{...},"after":{...}}                       │
//! │            │                                                            │
//! │            ▼ serde                                                      │
//! │   ┌────────────────┐      into_event::<R>()      ┌──────────────────┐  │
//! │   │   RawChange    │ ──────────────────────────► │  ChangeEvent<R>  │  │
//! │   │ kind + untyped │      validated exactly      │  Insert(R)       │  │
//! │   │ before/after   │      once, at the edge      │  Update(R)       │  │
//! │   └────────────────┘                             │  Delete(id)      │  │
//! │                                                  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything downstream of the boundary works with [`ChangeEvent`] only;
//! untyped `before`/`after` JSON never reaches the snapshot algebra.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CoreError, CoreResult};
use crate::record::Indexable;

// =============================================================================
// Change Kind
// =============================================================================

/// Row operation reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Wire name, for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

// =============================================================================
// Raw Change (wire form)
// =============================================================================

/// One feed frame as delivered: a tagged union of the operation kind and the
/// untyped row images around it. Inserts carry `after`, deletes carry
/// `before` (often key columns only), updates carry both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl RawChange {
    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn insert(after: Value) -> Self {
        RawChange {
            kind: ChangeKind::Insert,
            before: None,
            after: Some(after),
        }
    }

    pub fn update(before: Option<Value>, after: Value) -> Self {
        RawChange {
            kind: ChangeKind::Update,
            before,
            after: Some(after),
        }
    }

    pub fn delete(before: Value) -> Self {
        RawChange {
            kind: ChangeKind::Delete,
            before: Some(before),
            after: None,
        }
    }

    /// Insert frame carrying a typed record.
    pub fn insert_for<R: Indexable>(record: &R) -> CoreResult<Self> {
        Ok(Self::insert(
            serde_json::to_value(record).map_err(CoreError::encode)?,
        ))
    }

    /// Update frame carrying a typed record as the new row image.
    pub fn update_for<R: Indexable>(record: &R) -> CoreResult<Self> {
        Ok(Self::update(
            None,
            serde_json::to_value(record).map_err(CoreError::encode)?,
        ))
    }

    /// Delete frame carrying only the key column, like real feeds do.
    pub fn delete_for<R: Indexable>(record: &R) -> Self {
        Self::delete_by_id(record.record_id())
    }

    /// Delete frame for a bare identifier.
    pub fn delete_by_id(id: &str) -> Self {
        Self::delete(json!({ "id": id }))
    }

    // =========================================================================
    // Wire Serialization
    // =========================================================================

    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(CoreError::encode)
    }

    pub fn from_json(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(CoreError::decode)
    }

    // =========================================================================
    // Boundary Validation
    // =========================================================================

    /// Validates this frame into a typed event, consuming it.
    ///
    /// Inserts and updates require a deserializable `after` image. Deletes
    /// require an extractable string `id` from `before`, falling back to
    /// `after` for feeds that only populate the new-image slot.
    pub fn into_event<R: Indexable>(self) -> CoreResult<ChangeEvent<R>> {
        match self.kind {
            ChangeKind::Insert => {
                let record = Self::record_from(self.after, ChangeKind::Insert)?;
                Ok(ChangeEvent::Insert(record))
            }
            ChangeKind::Update => {
                let record = Self::record_from(self.after, ChangeKind::Update)?;
                Ok(ChangeEvent::Update(record))
            }
            ChangeKind::Delete => {
                let id = Self::id_from(self.before.as_ref())
                    .or_else(|| Self::id_from(self.after.as_ref()))
                    .ok_or(CoreError::MissingIdentifier)?;
                Ok(ChangeEvent::Delete(id))
            }
        }
    }

    fn record_from<R: Indexable>(image: Option<Value>, kind: ChangeKind) -> CoreResult<R> {
        let value = image.ok_or(CoreError::MissingPayload { kind })?;
        serde_json::from_value(value).map_err(|source| CoreError::MalformedRecord { kind, source })
    }

    fn id_from(image: Option<&Value>) -> Option<String> {
        image
            .and_then(|value| value.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// =============================================================================
// Change Event (validated form)
// =============================================================================

/// A validated change event ready for the snapshot algebra.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R: Indexable> {
    /// New row; carries the full record.
    Insert(R),
    /// Changed row; carries the new image. An update to an identifier the
    /// snapshot has never seen is applied as an insert.
    Update(R),
    /// Removed row; carries the identifier only.
    Delete(String),
}

impl<R: Indexable> ChangeEvent<R> {
    /// Identifier the event targets, for logging and diff bookkeeping.
    pub fn record_id(&self) -> &str {
        match self {
            ChangeEvent::Insert(record) | ChangeEvent::Update(record) => record.record_id(),
            ChangeEvent::Delete(id) => id,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert(_) => ChangeKind::Insert,
            ChangeEvent::Update(_) => ChangeKind::Update,
            ChangeEvent::Delete(_) => ChangeKind::Delete,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
