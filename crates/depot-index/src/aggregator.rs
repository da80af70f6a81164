//! # Status Aggregator
//!
//! Polls every store and publishes one consolidated status feed.
//!
//! ## Aggregation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Status Aggregation                                │
//! │                                                                         │
//! │  every poll tick:                                                       │
//! │    for each module:                                                     │
//! │      kind    = classify(status)        severity bucket                 │
//! │      indexing re-entry → un-dismiss, void any pending auto-hide        │
//! │      indexing → indexed (clean) → pulse + auto-hide window starts      │
//! │      auto-hide window lapsed    → module marked dismissed              │
//! │      shown   = pulse, or should_display(count, dismissed)              │
//! │    entries sorted by severity, then slug                               │
//! │    published only when something changed                               │
//! │                                                                         │
//! │  dismiss(slug) hides a module's READY row; restore(slug) undoes it;    │
//! │  a new indexing cycle also un-dismisses. Unhealthy rows ignore         │
//! │  dismissal.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use depot_core::{Indexable, IndexStatus, ModuleMeta, StatusEntry, StatusKind};

use crate::config::StatusSettings;
use crate::error::{IndexError, IndexResult};
use crate::store::IndexHandle;

// =============================================================================
// Status Source
// =============================================================================

/// Type-erased view of one store, so the aggregator can poll modules with
/// different record types.
#[async_trait]
pub trait StatusSource: Send + Sync {
    fn meta(&self) -> ModuleMeta;
    fn status(&self) -> IndexStatus;
    async fn record_count(&self) -> u64;
}

#[async_trait]
impl<R: Indexable> StatusSource for IndexHandle<R> {
    fn meta(&self) -> ModuleMeta {
        IndexHandle::meta(self).clone()
    }

    fn status(&self) -> IndexStatus {
        IndexHandle::status(self)
    }

    async fn record_count(&self) -> u64 {
        IndexHandle::record_count(self).await
    }
}

// =============================================================================
// Aggregator Commands
// =============================================================================

#[derive(Debug, Clone)]
enum AggregatorCommand {
    Dismiss(String),
    Restore(String),
}

// =============================================================================
// Aggregator Handle
// =============================================================================

/// Handle for reading the consolidated feed and managing dismissals.
#[derive(Clone)]
pub struct AggregatorHandle {
    entries_rx: watch::Receiver<Vec<StatusEntry>>,
    cmd_tx: mpsc::Sender<AggregatorCommand>,
    shutdown_tx: mpsc::Sender<()>,
}

impl AggregatorHandle {
    /// Current entries, most severe first.
    pub fn entries(&self) -> Vec<StatusEntry> {
        self.entries_rx.borrow().clone()
    }

    /// The most severe entry, if anything is on the surface.
    pub fn active(&self) -> Option<StatusEntry> {
        self.entries_rx.borrow().first().cloned()
    }

    /// A receiver that wakes on every feed change.
    pub fn watch_entries(&self) -> watch::Receiver<Vec<StatusEntry>> {
        self.entries_rx.clone()
    }

    /// Hides the module's READY row until restored or until the module
    /// starts a new indexing cycle.
    pub async fn dismiss(&self, slug: impl Into<String>) -> IndexResult<()> {
        self.cmd_tx
            .send(AggregatorCommand::Dismiss(slug.into()))
            .await
            .map_err(|_| IndexError::ChannelError("Aggregator task is gone".into()))
    }

    /// Reverses a dismissal.
    pub async fn restore(&self, slug: impl Into<String>) -> IndexResult<()> {
        self.cmd_tx
            .send(AggregatorCommand::Restore(slug.into()))
            .await
            .map_err(|_| IndexError::ChannelError("Aggregator task is gone".into()))
    }

    /// Stops the aggregator task.
    pub async fn shutdown(&self) -> IndexResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| IndexError::ChannelError("Aggregator task is gone".into()))
    }
}

// =============================================================================
// Status Aggregator
// =============================================================================

/// Per-module bookkeeping between polls.
#[derive(Default)]
struct ModuleTrack {
    was_indexing: bool,
    pulse_until: Option<Instant>,
}

/// Background task polling stores into a consolidated feed.
pub struct StatusAggregator {
    sources: Vec<Arc<dyn StatusSource>>,
    poll_interval: Duration,
    pulse: Duration,
    dismissed: HashSet<String>,
    tracks: HashMap<String, ModuleTrack>,
    entries_tx: watch::Sender<Vec<StatusEntry>>,
    cmd_rx: mpsc::Receiver<AggregatorCommand>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl StatusAggregator {
    /// Creates an aggregator over the given stores and spawns its task.
    pub fn spawn(sources: Vec<Arc<dyn StatusSource>>, settings: &StatusSettings) -> AggregatorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<AggregatorCommand>(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (entries_tx, entries_rx) = watch::channel(Vec::new());

        let aggregator = StatusAggregator {
            sources,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            pulse: Duration::from_secs(settings.pulse_secs),
            dismissed: HashSet::new(),
            tracks: HashMap::new(),
            entries_tx,
            cmd_rx,
            shutdown_rx,
        };

        tokio::spawn(aggregator.run());

        AggregatorHandle {
            entries_rx,
            cmd_tx,
            shutdown_tx,
        }
    }

    async fn run(mut self) {
        info!(modules = self.sources.len(), "Status aggregator starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.refresh().await;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(AggregatorCommand::Dismiss(slug)) => {
                        debug!(module = %slug, "Status row dismissed");
                        self.dismissed.insert(slug);
                        self.refresh().await;
                    }
                    Some(AggregatorCommand::Restore(slug)) => {
                        debug!(module = %slug, "Status row restored");
                        self.dismissed.remove(&slug);
                        self.refresh().await;
                    }
                    None => break,
                },
                _ = self.shutdown_rx.recv() => break,
            }
        }

        info!("Status aggregator stopped");
    }

    /// Polls every source and republishes the feed if it changed.
    async fn refresh(&mut self) {
        let now = Instant::now();
        let mut entries = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let meta = source.meta();
            let status = source.status();
            let record_count = source.record_count().await;
            let kind = StatusKind::classify(&status);

            let track = self.tracks.entry(meta.slug.clone()).or_default();

            // A module re-entering indexing is un-dismissed immediately and
            // any pending auto-hide is void.
            if status.is_indexing {
                track.pulse_until = None;
                self.dismissed.remove(&meta.slug);
            }

            // A clean indexing → indexed edge starts the success pulse and
            // its auto-hide window.
            if track.was_indexing
                && status.is_indexed
                && !status.is_indexing
                && status.error.is_none()
            {
                track.pulse_until = Some(now + self.pulse);
            }
            track.was_indexing = status.is_indexing;

            let pulse = match track.pulse_until {
                Some(until) if now < until => true,
                Some(_) => {
                    // Auto-hide: the window lapsed with no new cycle.
                    track.pulse_until = None;
                    self.dismissed.insert(meta.slug.clone());
                    false
                }
                None => false,
            };

            let dismissed = self.dismissed.contains(&meta.slug);
            if pulse || kind.should_display(record_count, dismissed) {
                entries.push(StatusEntry {
                    meta,
                    kind,
                    status,
                    record_count,
                    pulse,
                });
            }
        }

        entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.meta.slug.cmp(&b.meta.slug)));

        self.entries_tx.send_if_modified(|current| {
            if *current != entries {
                *current = entries;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct FakeSource {
        meta: ModuleMeta,
        status: Mutex<IndexStatus>,
        count: AtomicU64,
    }

    impl FakeSource {
        fn new(slug: &str) -> Arc<Self> {
            Arc::new(FakeSource {
                meta: ModuleMeta::new(slug, slug, "box", "slate"),
                status: Mutex::new(IndexStatus::default()),
                count: AtomicU64::new(0),
            })
        }

        fn erased(self: &Arc<Self>) -> Arc<dyn StatusSource> {
            Arc::clone(self) as Arc<dyn StatusSource>
        }

        fn set_status<F: FnOnce(&mut IndexStatus)>(&self, f: F) {
            f(&mut self.status.lock().expect("status lock poisoned"));
        }

        fn set_count(&self, n: u64) {
            self.count.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StatusSource for FakeSource {
        fn meta(&self) -> ModuleMeta {
            self.meta.clone()
        }

        fn status(&self) -> IndexStatus {
            self.status.lock().expect("status lock poisoned").clone()
        }

        async fn record_count(&self) -> u64 {
            self.count.load(Ordering::SeqCst)
        }
    }

    fn settings() -> StatusSettings {
        StatusSettings {
            poll_interval_ms: 100,
            pulse_secs: 5,
        }
    }

    async fn sync() {
        // Two poll intervals is enough for a refresh to land.
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_module_shows_only_with_records() {
        let source = FakeSource::new("active-items");
        source.set_status(|st| st.is_indexed = true);
        let handle = StatusAggregator::spawn(vec![source.erased()], &settings());

        sync().await;
        assert!(handle.entries().is_empty());

        source.set_count(42);
        sync().await;
        let entries = handle.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, StatusKind::Ready);
        assert_eq!(entries[0].record_count, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_hides_ready_row_and_restore_reverses() {
        let source = FakeSource::new("custodians");
        source.set_status(|st| st.is_indexed = true);
        source.set_count(7);
        let handle = StatusAggregator::spawn(vec![source.erased()], &settings());

        sync().await;
        assert_eq!(handle.entries().len(), 1);

        handle.dismiss("custodians").await.unwrap();
        sync().await;
        assert!(handle.entries().is_empty());

        handle.restore("custodians").await.unwrap();
        sync().await;
        assert_eq!(handle.entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissal_never_hides_failures() {
        let source = FakeSource::new("locations");
        source.set_status(|st| {
            st.reconnection = depot_core::ReconnectionStatus::Failed;
        });
        let handle = StatusAggregator::spawn(vec![source.erased()], &settings());

        handle.dismiss("locations").await.unwrap();
        sync().await;

        let entries = handle.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, StatusKind::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_pulse_then_auto_hide_dismisses_the_row() {
        let source = FakeSource::new("decommissions");
        source.set_status(|st| st.is_indexing = true);
        let handle = StatusAggregator::spawn(vec![source.erased()], &settings());

        sync().await;
        assert_eq!(handle.entries()[0].kind, StatusKind::Indexing);

        // Finish indexing with records present.
        source.set_count(9);
        source.set_status(|st| {
            st.is_indexing = false;
            st.is_indexed = true;
        });
        sync().await;
        let entries = handle.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].pulse);
        assert_eq!(entries[0].kind, StatusKind::Ready);

        // The auto-hide window lapses: the row is dismissed even though the
        // module still holds records.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_indexing_cycle_reverses_dismissal() {
        let source = FakeSource::new("custody-records");
        source.set_status(|st| st.is_indexed = true);
        source.set_count(4);
        let handle = StatusAggregator::spawn(vec![source.erased()], &settings());

        handle.dismiss("custody-records").await.unwrap();
        sync().await;
        assert!(handle.entries().is_empty());

        // A fresh indexing cycle surfaces the module again at once.
        source.set_status(|st| {
            st.is_indexing = true;
            st.is_indexed = false;
        });
        sync().await;
        let entries = handle.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, StatusKind::Indexing);

        // Completing it pulses, then the auto-hide window dismisses again.
        source.set_status(|st| {
            st.is_indexing = false;
            st.is_indexed = true;
        });
        sync().await;
        assert!(handle.entries()[0].pulse);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_entry_is_most_severe() {
        let healthy = FakeSource::new("active-items");
        healthy.set_status(|st| st.is_indexed = true);
        healthy.set_count(10);

        let failed = FakeSource::new("unlisted-items");
        failed.set_status(|st| {
            st.reconnection = depot_core::ReconnectionStatus::Failed;
        });

        let handle = StatusAggregator::spawn(vec![healthy.erased(), failed.erased()], &settings());
        sync().await;

        let active = handle.active().unwrap();
        assert_eq!(active.kind, StatusKind::Failed);
        assert_eq!(active.meta.slug, "unlisted-items");
        assert_eq!(handle.entries().len(), 2);
    }
}
