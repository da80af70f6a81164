//! # Module Snapshot
//!
//! The in-memory collection of records for one module, plus the two pure
//! algorithms the engine is built on:
//!
//! - **apply**: mutate the snapshot with one validated change event under a
//!   membership predicate (insert/update/delete rules below)
//! - **diff**: compute the minimal event set that converges this snapshot
//!   onto a freshly loaded one, used by reconciliation after an outage
//!
//! ## Apply Rules
//! ```text
//! ┌──────────┬──────────────────────┬──────────────────────────────────────┐
//! │ Event    │ Predicate on record  │ Effect on snapshot                   │
//! ├──────────┼──────────────────────┼──────────────────────────────────────┤
//! │ insert   │ passes               │ append if id absent, else no-op      │
//! │ insert   │ fails                │ no-op                                │
//! │ update   │ passes               │ replace if present, append if absent │
//! │ update   │ fails                │ remove if present                    │
//! │ delete   │ (not consulted)      │ remove if present                    │
//! └──────────┴──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Updates append when the id is absent because a missed insert followed by
//! an update must still land the record. Updates remove when the predicate
//! fails because a lifecycle flip (active item decommissioned) arrives as an
//! update yet means "leave this module". Every rule is idempotent: replaying
//! an event reproduces the same snapshot.
//!
//! Insertion order is irrelevant to consumers, which is what lets removal
//! use `swap_remove` instead of shifting the tail.

use std::collections::HashMap;

use crate::change::ChangeEvent;
use crate::record::Indexable;

// =============================================================================
// Applied
// =============================================================================

/// What one apply call did to the snapshot. `Unchanged` lets the store skip
/// the durable cache mirror write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Removed,
    Unchanged,
}

impl Applied {
    /// True when the snapshot actually changed.
    pub fn mutated(&self) -> bool {
        !matches!(self, Applied::Unchanged)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Records for one module with an id index for O(1) upsert and removal.
///
/// Invariant: `slots` maps every record's id to its current position in
/// `records`, and nothing else. Holds after every public method returns.
#[derive(Debug, Clone)]
pub struct Snapshot<R: Indexable> {
    records: Vec<R>,
    slots: HashMap<String, usize>,
}

impl<R: Indexable> Default for Snapshot<R> {
    fn default() -> Self {
        Snapshot::new()
    }
}

impl<R: Indexable> Snapshot<R> {
    pub fn new() -> Self {
        Snapshot {
            records: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Builds a snapshot from loaded or cached records. Later duplicates of
    /// an id win, matching upsert semantics.
    pub fn from_records(records: Vec<R>) -> Self {
        let mut snapshot = Snapshot::new();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.slots.get(id).map(|&idx| &self.records[idx])
    }

    /// Borrowed view of the current records, insertion order irrelevant.
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Owned copy handed to consumers and to the cache mirror.
    pub fn to_vec(&self) -> Vec<R> {
        self.records.clone()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace by id if present, append otherwise. Replacing with an equal
    /// record reports `Unchanged`.
    pub fn upsert(&mut self, record: R) -> Applied {
        match self.slots.get(record.record_id()) {
            Some(&idx) => {
                if self.records[idx] == record {
                    Applied::Unchanged
                } else {
                    self.records[idx] = record;
                    Applied::Updated
                }
            }
            None => {
                let idx = self.records.len();
                self.slots.insert(record.record_id().to_string(), idx);
                self.records.push(record);
                Applied::Inserted
            }
        }
    }

    /// Remove by id. The record swapped into the vacated slot gets its
    /// index entry rewritten.
    pub fn remove(&mut self, id: &str) -> Applied {
        let Some(idx) = self.slots.remove(id) else {
            return Applied::Unchanged;
        };
        self.records.swap_remove(idx);
        if idx < self.records.len() {
            let moved_id = self.records[idx].record_id().to_string();
            self.slots.insert(moved_id, idx);
        }
        Applied::Removed
    }

    /// Applies one validated change event under the module's membership
    /// predicate. See the table in the module docs.
    pub fn apply(&mut self, event: ChangeEvent<R>, predicate: fn(&R) -> bool) -> Applied {
        match event {
            ChangeEvent::Insert(record) => {
                if !predicate(&record) || self.contains(record.record_id()) {
                    Applied::Unchanged
                } else {
                    self.upsert(record)
                }
            }
            ChangeEvent::Update(record) => {
                if predicate(&record) {
                    self.upsert(record)
                } else {
                    self.remove(record.record_id())
                }
            }
            ChangeEvent::Delete(id) => self.remove(&id),
        }
    }

    // =========================================================================
    // Reconciliation Diff
    // =========================================================================

    /// Events that converge `self` onto `fresh`: inserts for ids only in
    /// `fresh`, updates where field values differ, deletes for ids only in
    /// `self`. Applying the result to `self` yields a snapshot equal to
    /// `fresh` by id set and field values.
    pub fn diff(&self, fresh: &Snapshot<R>) -> Vec<ChangeEvent<R>> {
        let mut events = Vec::new();

        for record in fresh.records() {
            match self.get(record.record_id()) {
                None => events.push(ChangeEvent::Insert(record.clone())),
                Some(current) if current != record => {
                    events.push(ChangeEvent::Update(record.clone()))
                }
                Some(_) => {}
            }
        }

        for record in self.records() {
            if !fresh.contains(record.record_id()) {
                events.push(ChangeEvent::Delete(record.record_id().to_string()));
            }
        }

        events
    }
}

// =============================================================================
// Tests
// =============================================================================
