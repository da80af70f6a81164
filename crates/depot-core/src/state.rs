//! # Indexation State
//!
//! The state machine values a store publishes and the projections the status
//! surface renders. These are plain data: the engine owns the transitions,
//! the frontend owns the pixels, this module owns the shapes and the pure
//! classification rules between them.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::module::ModuleMeta;
use crate::DEFAULT_MAX_RECONNECT_ATTEMPTS;

// =============================================================================
// Reconnection Status
// =============================================================================

/// Health of a store's change-feed subscription.
///
/// ```text
///    idle ──disconnect──► reconnecting ──resubscribed──► reconciling
///     ▲                        │                              │
///     │                        │ attempts exhausted           │ diff applied
///     │                        ▼                              │
///     │                      failed                           │
///     └──────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectionStatus {
    /// Subscription healthy (or not yet attached).
    Idle,
    /// Stream lost; resubscribing with backoff.
    Reconnecting,
    /// Resubscribed; re-reading the full dataset to recover missed events.
    Reconciling,
    /// Attempts exhausted or reconciliation failed; manual reindex required.
    Failed,
}

impl Default for ReconnectionStatus {
    fn default() -> Self {
        ReconnectionStatus::Idle
    }
}

impl std::fmt::Display for ReconnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectionStatus::Idle => write!(f, "idle"),
            ReconnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ReconnectionStatus::Reconciling => write!(f, "reconciling"),
            ReconnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Index Status
// =============================================================================

/// Public state of one module indexation store. Field names follow the
/// frontend contract, hence the camelCase wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    /// A batch load (initial or reindex) is in flight.
    pub is_indexing: bool,
    /// A snapshot has been committed (from cache or a completed load).
    pub is_indexed: bool,
    /// Records accumulated so far during an active load.
    pub progress: u64,
    /// Expected total from the count query; 0 before the first count.
    pub total: u64,
    /// Last load or reconciliation failure, cleared on the next cycle.
    pub error: Option<String>,
    pub reconnection: ReconnectionStatus,
    /// Resubscribe attempts in the current outage.
    pub reconnection_attempts: u32,
    pub max_reconnection_attempts: u32,
}

impl IndexStatus {
    /// State before boot (and after a reindex reset).
    pub fn pre_boot(max_reconnection_attempts: u32) -> Self {
        IndexStatus {
            is_indexing: false,
            is_indexed: false,
            progress: 0,
            total: 0,
            error: None,
            reconnection: ReconnectionStatus::Idle,
            reconnection_attempts: 0,
            max_reconnection_attempts,
        }
    }
}

impl Default for IndexStatus {
    fn default() -> Self {
        IndexStatus::pre_boot(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }
}

// =============================================================================
// Status Kind
// =============================================================================

/// Severity bucket for one module on the status surface. Variants are
/// declared most severe first so sorting entries ascending by kind puts
/// failures at the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Reconnection exhausted or reconciliation failed.
    Failed,
    /// Batch load failed; module not indexed.
    Error,
    Reconnecting,
    Reconciling,
    Indexing,
    /// Indexed and healthy.
    Ready,
}

impl StatusKind {
    /// Severity classification of a published status. Failure states win
    /// over the error field so an exhausted reconnection is never reported
    /// as a mere load error.
    pub fn classify(status: &IndexStatus) -> StatusKind {
        if status.reconnection == ReconnectionStatus::Failed {
            StatusKind::Failed
        } else if status.error.is_some() {
            StatusKind::Error
        } else if status.reconnection == ReconnectionStatus::Reconnecting {
            StatusKind::Reconnecting
        } else if status.reconnection == ReconnectionStatus::Reconciling {
            StatusKind::Reconciling
        } else if status.is_indexing {
            StatusKind::Indexing
        } else {
            StatusKind::Ready
        }
    }

    /// Whether a module in this state occupies a slot on the status
    /// surface. Ready modules show only while non-empty and not dismissed;
    /// every unhealthy or busy state shows unconditionally.
    pub fn should_display(&self, record_count: u64, dismissed: bool) -> bool {
        match self {
            StatusKind::Ready => record_count > 0 && !dismissed,
            _ => true,
        }
    }
}

// =============================================================================
// Status Entry
// =============================================================================

/// One module's row in the aggregated status feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub meta: ModuleMeta,
    pub kind: StatusKind,
    pub status: IndexStatus,
    pub record_count: u64,
    /// One-shot success flash: set on the first publication after an
    /// indexing cycle completes cleanly, then false.
    pub pulse: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ranks_failed_above_error() {
        let mut status = IndexStatus::default();
        status.error = Some("load failed".to_string());
        status.reconnection = ReconnectionStatus::Failed;
        assert_eq!(StatusKind::classify(&status), StatusKind::Failed);

        status.reconnection = ReconnectionStatus::Idle;
        assert_eq!(StatusKind::classify(&status), StatusKind::Error);
    }

    #[test]
    fn test_classify_walks_down_to_ready() {
        let mut status = IndexStatus::default();
        status.reconnection = ReconnectionStatus::Reconnecting;
        assert_eq!(StatusKind::classify(&status), StatusKind::Reconnecting);

        status.reconnection = ReconnectionStatus::Reconciling;
        assert_eq!(StatusKind::classify(&status), StatusKind::Reconciling);

        status.reconnection = ReconnectionStatus::Idle;
        status.is_indexing = true;
        assert_eq!(StatusKind::classify(&status), StatusKind::Indexing);

        status.is_indexing = false;
        status.is_indexed = true;
        assert_eq!(StatusKind::classify(&status), StatusKind::Ready);
    }

    #[test]
    fn test_kind_order_matches_severity() {
        let mut kinds = vec![
            StatusKind::Ready,
            StatusKind::Indexing,
            StatusKind::Failed,
            StatusKind::Reconciling,
            StatusKind::Error,
            StatusKind::Reconnecting,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                StatusKind::Failed,
                StatusKind::Error,
                StatusKind::Reconnecting,
                StatusKind::Reconciling,
                StatusKind::Indexing,
                StatusKind::Ready,
            ]
        );
    }

    #[test]
    fn test_ready_displays_only_non_empty_and_undismissed() {
        assert!(StatusKind::Ready.should_display(12, false));
        assert!(!StatusKind::Ready.should_display(0, false));
        assert!(!StatusKind::Ready.should_display(12, true));
    }

    #[test]
    fn test_unhealthy_states_display_even_when_dismissed() {
        assert!(StatusKind::Failed.should_display(0, true));
        assert!(StatusKind::Error.should_display(0, true));
        assert!(StatusKind::Indexing.should_display(0, true));
    }

    #[test]
    fn test_status_serializes_with_frontend_field_names() {
        let status = IndexStatus::default();
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"isIndexing\""));
        assert!(json.contains("\"maxReconnectionAttempts\""));
        assert!(json.contains("\"reconnection\":\"idle\""));
    }

    #[test]
    fn test_pre_boot_state_is_quiet() {
        let status = IndexStatus::pre_boot(3);
        assert!(!status.is_indexing);
        assert!(!status.is_indexed);
        assert_eq!(status.total, 0);
        assert_eq!(status.max_reconnection_attempts, 3);
        assert_eq!(StatusKind::classify(&status), StatusKind::Ready);
    }
}
