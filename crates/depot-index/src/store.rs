//! # Module Index Store
//!
//! One background task per module that owns the snapshot end to end.
//!
//! ## Store Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Index Store Lifecycle                             │
//! │                                                                         │
//! │  ┌────────────┐  sign-in   ┌────────────┐  cache hit  ┌────────────┐   │
//! │  │  Waiting   │ ─────────► │  Booting   │ ──────────► │   Live     │   │
//! │  │ (signed    │            │ (cache or  │             │ (stream    │   │
//! │  │   out)     │ ◄───────── │ batch load)│  full load  │  applies)  │   │
//! │  └────────────┘  sign-out  └─────┬──────┘ ──────────► └─────┬──────┘   │
//! │        ▲                         │ load failed              │ stream   │
//! │        │                         ▼                          │ lost     │
//! │        │                   ┌────────────┐                   ▼          │
//! │        │                   │   Idle     │            ┌────────────┐    │
//! │        └────────────────── │ (error or  │ ◄────────  │ Reconnect/ │    │
//! │          reindex reboots   │  failed)   │ exhausted  │ Reconcile  │    │
//! │                            └────────────┘ or failed  └────────────┘    │
//! │                                                                         │
//! │  The task is the only writer of the snapshot and the status channel.   │
//! │  Consumers read through the handle; teardown happens by dropping the   │
//! │  in-flight work inside select!, never mid-commit.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use depot_cache::CacheStore;
use depot_core::{
    Applied, Indexable, IndexStatus, ModuleMeta, ModuleSpec, RawChange, ReconnectionStatus,
    Snapshot,
};

use crate::backend::RecordBackend;
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::feed::{ChangeFeed, FeedSubscription};
use crate::loader::BatchLoader;
use crate::reconnect::ReconnectPolicy;
use crate::session::SessionWatch;

// =============================================================================
// Shared Context
// =============================================================================

/// The services every store shares: backend, feed, cache, and the session
/// channel. Cloned once per spawned store.
#[derive(Clone)]
pub struct IndexContext {
    pub backend: Arc<dyn RecordBackend>,
    pub feed: Arc<dyn ChangeFeed>,
    pub cache: CacheStore,
    pub session: SessionWatch,
}

// =============================================================================
// Store Commands
// =============================================================================

/// Commands a handle can send to its store task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCommand {
    /// Drop the cached snapshot and boot from a fresh full load.
    Reindex,
}

// =============================================================================
// Store Handle
// =============================================================================

/// Handle for reading a store's snapshot and driving its lifecycle.
#[derive(Clone)]
pub struct IndexHandle<R: Indexable> {
    meta: ModuleMeta,
    data: Arc<RwLock<Snapshot<R>>>,
    status_rx: watch::Receiver<IndexStatus>,
    cmd_tx: mpsc::Sender<StoreCommand>,
    shutdown_tx: mpsc::Sender<()>,
}

impl<R: Indexable> IndexHandle<R> {
    /// Presentation metadata for this module.
    pub fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    /// Current indexation status.
    pub fn status(&self) -> IndexStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver that wakes on every status change.
    pub fn watch_status(&self) -> watch::Receiver<IndexStatus> {
        self.status_rx.clone()
    }

    /// All records currently in the snapshot.
    pub async fn records(&self) -> Vec<R> {
        self.data.read().await.to_vec()
    }

    /// One record by id.
    pub async fn get(&self, id: &str) -> Option<R> {
        self.data.read().await.get(id).cloned()
    }

    /// Number of records in the snapshot.
    pub async fn record_count(&self) -> u64 {
        self.data.read().await.len() as u64
    }

    /// Clears the cached snapshot and reboots the store from a full load.
    pub async fn reindex(&self) -> IndexResult<()> {
        self.cmd_tx
            .send(StoreCommand::Reindex)
            .await
            .map_err(|_| IndexError::ChannelError("Store task is gone".into()))
    }

    /// Stops the store task. The in-memory snapshot is dropped with it.
    pub async fn shutdown(&self) -> IndexResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| IndexError::ChannelError("Store task is gone".into()))
    }
}

// =============================================================================
// Teardown Events
// =============================================================================

/// What interrupted the current phase.
enum TearEvent {
    Reindex,
    SessionEnded,
    Shutdown,
}

/// Where the store loop goes next.
enum Flow {
    /// Boot again for the same session (after a reindex).
    Reboot,
    /// Return to the session gate (sign-out or tenant switch).
    Resession,
    /// Exit the task.
    Shutdown,
}

/// Outcome of a reconciliation pass.
enum ReconcileEnd {
    Teardown(Flow),
    LoadFailed(IndexError),
}

/// Waits for the next lifecycle interruption.
///
/// Same-tenant session re-announcements are absorbed here; only real
/// transitions escape. Cancel-safe, so it can sit in any select!.
async fn teardown_event(
    cmd_rx: &mut mpsc::Receiver<StoreCommand>,
    session: &mut SessionWatch,
    shutdown_rx: &mut mpsc::Receiver<()>,
    tenant: &str,
) -> TearEvent {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(StoreCommand::Reindex) => return TearEvent::Reindex,
                None => return TearEvent::Shutdown,
            },
            res = session.changed() => {
                if res.is_err() {
                    return TearEvent::Shutdown;
                }
                let same = session.borrow_and_update().tenant() == Some(tenant);
                if !same {
                    return TearEvent::SessionEnded;
                }
            }
            _ = shutdown_rx.recv() => return TearEvent::Shutdown,
        }
    }
}

// =============================================================================
// Index Store
// =============================================================================

/// Background task owning one module's snapshot.
///
/// ## Usage
/// ```rust,ignore
/// let handle = IndexStore::spawn(ModuleSpec::active_items(), &ctx, &config);
///
/// // Read records
/// let items = handle.records().await;
///
/// // Watch indexation state
/// let mut status = handle.watch_status();
/// status.changed().await?;
/// ```
pub struct IndexStore<R: Indexable> {
    spec: ModuleSpec<R>,
    backend: Arc<dyn RecordBackend>,
    feed: Arc<dyn ChangeFeed>,
    cache: CacheStore,
    cache_enabled: bool,
    page_size: u32,
    policy: ReconnectPolicy,
    session: SessionWatch,
    data: Arc<RwLock<Snapshot<R>>>,
    status_tx: watch::Sender<IndexStatus>,
    cmd_rx: mpsc::Receiver<StoreCommand>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<R: Indexable> IndexStore<R> {
    /// Creates a store and spawns its background task.
    ///
    /// The task touches neither cache nor network until a session appears on
    /// the context's session channel.
    pub fn spawn(spec: ModuleSpec<R>, ctx: &IndexContext, config: &IndexConfig) -> IndexHandle<R> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<StoreCommand>(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let max_attempts = spec
            .max_reconnect_attempts
            .unwrap_or(config.reconnect.max_attempts);
        let page_size = spec.page_size.unwrap_or(config.backend.page_size);
        let policy = ReconnectPolicy::from_settings(&config.reconnect).with_max_attempts(max_attempts);

        let (status_tx, status_rx) = watch::channel(IndexStatus::pre_boot(max_attempts));
        let data = Arc::new(RwLock::new(Snapshot::new()));
        let meta = spec.meta.clone();

        let store = IndexStore {
            spec,
            backend: Arc::clone(&ctx.backend),
            feed: Arc::clone(&ctx.feed),
            cache: ctx.cache.clone(),
            cache_enabled: config.cache.enabled,
            page_size,
            policy,
            session: ctx.session.clone(),
            data: Arc::clone(&data),
            status_tx,
            cmd_rx,
            shutdown_rx,
        };

        // Spawn background task
        tokio::spawn(store.run());

        IndexHandle {
            meta,
            data,
            status_rx,
            cmd_tx,
            shutdown_tx,
        }
    }

    /// Main store loop: gate on the session, serve it, repeat.
    async fn run(mut self) {
        info!(
            module = %self.spec.meta.slug,
            table = self.spec.table,
            "Index store starting"
        );

        loop {
            let Some(tenant) = self.wait_for_session().await else {
                break;
            };

            match self.serve(&tenant).await {
                Flow::Reboot | Flow::Resession => continue,
                Flow::Shutdown => break,
            }
        }

        info!(module = %self.spec.meta.slug, "Index store stopped");
    }

    /// Blocks until a tenant session is live. `None` means shut down.
    async fn wait_for_session(&mut self) -> Option<String> {
        loop {
            if let Some(tenant) = self.session.borrow_and_update().tenant().map(String::from) {
                return Some(tenant);
            }

            tokio::select! {
                res = self.session.changed() => {
                    if res.is_err() {
                        return None;
                    }
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(StoreCommand::Reindex) => {
                        debug!(module = %self.spec.meta.slug, "Reindex ignored while signed out");
                    }
                    None => return None,
                },
                _ = self.shutdown_rx.recv() => return None,
            }
        }
    }

    /// Boots the snapshot for one session and serves it until teardown.
    async fn serve(&mut self, tenant: &str) -> Flow {
        let key = self.spec.cache_key_for(tenant);
        let max_attempts = self.policy.max_attempts();
        self.publish(move |st| {
            *st = IndexStatus::pre_boot(max_attempts);
            st.is_indexing = true;
        });

        // Cache probe; any storage trouble degrades to a miss.
        let mut booted: Option<Snapshot<R>> = None;
        if self.cache_enabled {
            if let Some(records) = self.cache.load::<Vec<R>>(&key) {
                info!(
                    module = %self.spec.meta.slug,
                    rows = records.len(),
                    "Serving cached snapshot"
                );
                booted = Some(Snapshot::from_records(records));
            }
        }
        let from_cache = booted.is_some();

        let snapshot = match booted {
            Some(snapshot) => snapshot,
            None => {
                let load = self.load_future(tenant, true);
                tokio::select! {
                    result = load => match result {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            error!(module = %self.spec.meta.slug, error = %e, "Batch load failed");
                            let msg = e.to_string();
                            self.publish(move |st| {
                                st.is_indexing = false;
                                st.error = Some(msg);
                            });
                            return self.idle_after_failure(tenant).await;
                        }
                    },
                    event = teardown_event(&mut self.cmd_rx, &mut self.session, &mut self.shutdown_rx, tenant) => {
                        // Partial pages die with the dropped load future.
                        return self.flow_for(event, tenant).await;
                    }
                }
            }
        };

        // Commit
        let count = snapshot.len() as u64;
        *self.data.write().await = snapshot;
        if !from_cache && self.cache_enabled {
            let guard = self.data.read().await;
            self.cache.save(&key, &guard.records());
        }
        self.publish(move |st| {
            st.is_indexing = false;
            st.is_indexed = true;
            st.error = None;
            st.progress = count;
            st.total = count;
        });
        info!(
            module = %self.spec.meta.slug,
            tenant = %tenant,
            rows = count,
            from_cache = from_cache,
            "Index committed"
        );

        self.stream_phase(tenant, &key).await
    }

    /// Attaches the change stream and applies it until teardown.
    async fn stream_phase(&mut self, tenant: &str, key: &str) -> Flow {
        // The stream attaches on every boot path, cached or loaded.
        let mut sub = match self.feed.subscribe(tenant, self.spec.table).await {
            Ok(sub) => {
                info!(module = %self.spec.meta.slug, "Change stream attached");
                sub
            }
            Err(e) => {
                warn!(module = %self.spec.meta.slug, error = %e, "Initial subscribe failed");
                match self.reconnect(tenant, key).await {
                    Ok(sub) => sub,
                    Err(flow) => return flow,
                }
            }
        };

        loop {
            tokio::select! {
                frame = sub.next() => match frame {
                    Some(raw) => self.apply_change(raw, key).await,
                    None => {
                        warn!(module = %self.spec.meta.slug, "Change stream lost");
                        match self.reconnect(tenant, key).await {
                            Ok(new_sub) => sub = new_sub,
                            Err(flow) => return flow,
                        }
                    }
                },
                event = teardown_event(&mut self.cmd_rx, &mut self.session, &mut self.shutdown_rx, tenant) => {
                    return self.flow_for(event, tenant).await;
                }
            }
        }
    }

    /// Applies one change frame to the snapshot and mirrors it to the cache.
    async fn apply_change(&self, raw: RawChange, key: &str) {
        let event = match raw.into_event::<R>() {
            Ok(event) => event,
            Err(e) => {
                let err = IndexError::MalformedChange(e);
                warn!(module = %self.spec.meta.slug, error = %err, "Skipping malformed change event");
                return;
            }
        };

        let kind = event.kind();
        let id = event.record_id().to_string();
        let applied = {
            let mut guard = self.data.write().await;
            guard.apply(event, self.spec.predicate)
        };
        debug!(
            module = %self.spec.meta.slug,
            kind = kind.as_str(),
            id = %id,
            applied = ?applied,
            "Change applied"
        );

        if applied.mutated() && self.cache_enabled {
            let guard = self.data.read().await;
            self.cache.save(key, &guard.records());
        }
    }

    /// Backoff-resubscribe machine. Returns a reconciled subscription, or the
    /// flow that ended the episode (teardown, exhaustion, reconcile failure).
    async fn reconnect(&mut self, tenant: &str, key: &str) -> Result<FeedSubscription, Flow> {
        let mut schedule = self.policy.schedule();

        loop {
            let Some(delay) = schedule.next_delay() else {
                error!(
                    module = %self.spec.meta.slug,
                    attempts = schedule.max_attempts(),
                    "Reconnection attempts exhausted"
                );
                let msg = IndexError::ReconnectExhausted {
                    attempts: schedule.max_attempts(),
                }
                .to_string();
                self.publish(move |st| {
                    st.reconnection = ReconnectionStatus::Failed;
                    st.error = Some(msg);
                });
                return Err(self.idle_after_failure(tenant).await);
            };

            let attempt = schedule.attempt();
            self.publish(move |st| {
                st.reconnection = ReconnectionStatus::Reconnecting;
                st.reconnection_attempts = attempt;
            });
            debug!(
                module = %self.spec.meta.slug,
                attempt = attempt,
                ?delay,
                "Waiting before resubscribe"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                event = teardown_event(&mut self.cmd_rx, &mut self.session, &mut self.shutdown_rx, tenant) => {
                    return Err(self.flow_for(event, tenant).await);
                }
            }

            match self.feed.subscribe(tenant, self.spec.table).await {
                Ok(sub) => {
                    info!(
                        module = %self.spec.meta.slug,
                        attempt = attempt,
                        "Resubscribed, reconciling"
                    );
                    self.publish(|st| st.reconnection = ReconnectionStatus::Reconciling);

                    match self.reconcile(tenant, key, sub).await {
                        Ok(sub) => {
                            self.publish(|st| {
                                st.reconnection = ReconnectionStatus::Idle;
                                st.reconnection_attempts = 0;
                                st.error = None;
                            });
                            info!(module = %self.spec.meta.slug, "Stream live again");
                            return Ok(sub);
                        }
                        Err(ReconcileEnd::Teardown(flow)) => return Err(flow),
                        Err(ReconcileEnd::LoadFailed(e)) => {
                            error!(module = %self.spec.meta.slug, error = %e, "Reconciliation failed");
                            let msg = e.to_string();
                            self.publish(move |st| {
                                st.reconnection = ReconnectionStatus::Failed;
                                st.error = Some(msg);
                            });
                            return Err(self.idle_after_failure(tenant).await);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        module = %self.spec.meta.slug,
                        attempt = attempt,
                        error = %e,
                        "Resubscribe failed"
                    );
                }
            }
        }
    }

    /// Replays missed changes by diffing a fresh load against the snapshot.
    ///
    /// The old snapshot keeps serving reads until the diff applies. Frames
    /// that arrive on the new subscription while the load runs are dropped;
    /// the fresh rows already contain their effects.
    async fn reconcile(
        &mut self,
        tenant: &str,
        key: &str,
        mut sub: FeedSubscription,
    ) -> Result<FeedSubscription, ReconcileEnd> {
        let load = self.load_future(tenant, false);
        let fresh = tokio::select! {
            result = load => match result {
                Ok(snapshot) => snapshot,
                Err(e) => return Err(ReconcileEnd::LoadFailed(e)),
            },
            event = teardown_event(&mut self.cmd_rx, &mut self.session, &mut self.shutdown_rx, tenant) => {
                return Err(ReconcileEnd::Teardown(self.flow_for(event, tenant).await));
            }
        };

        let events = {
            let guard = self.data.read().await;
            guard.diff(&fresh)
        };

        let (mut inserted, mut updated, mut removed) = (0u64, 0u64, 0u64);
        {
            let mut guard = self.data.write().await;
            for event in events {
                match guard.apply(event, self.spec.predicate) {
                    Applied::Inserted => inserted += 1,
                    Applied::Updated => updated += 1,
                    Applied::Removed => removed += 1,
                    Applied::Unchanged => {}
                }
            }
        }

        if (inserted + updated + removed) > 0 && self.cache_enabled {
            let guard = self.data.read().await;
            self.cache.save(key, &guard.records());
        }

        let dropped = sub.drain();
        if dropped > 0 {
            debug!(
                module = %self.spec.meta.slug,
                dropped = dropped,
                "Dropped change frames that raced the reconcile"
            );
        }

        info!(
            module = %self.spec.meta.slug,
            inserted = inserted,
            updated = updated,
            removed = removed,
            "Reconciled snapshot"
        );
        Ok(sub)
    }

    /// Parks the store after an unrecoverable episode. Only a reindex, a
    /// session change, or shutdown moves it again.
    async fn idle_after_failure(&mut self, tenant: &str) -> Flow {
        info!(
            module = %self.spec.meta.slug,
            "Store idle until reindex or session change"
        );
        let event = teardown_event(
            &mut self.cmd_rx,
            &mut self.session,
            &mut self.shutdown_rx,
            tenant,
        )
        .await;
        self.flow_for(event, tenant).await
    }

    /// Turns a teardown event into the next flow, clearing state as needed.
    async fn flow_for(&mut self, event: TearEvent, tenant: &str) -> Flow {
        match event {
            TearEvent::Reindex => {
                let key = self.spec.cache_key_for(tenant);
                self.cache.clear(&key);
                *self.data.write().await = Snapshot::new();
                self.reset_status();
                info!(module = %self.spec.meta.slug, "Reindex requested, cache cleared");
                Flow::Reboot
            }
            TearEvent::SessionEnded => {
                *self.data.write().await = Snapshot::new();
                self.reset_status();
                info!(module = %self.spec.meta.slug, "Session ended, store torn down");
                Flow::Resession
            }
            TearEvent::Shutdown => Flow::Shutdown,
        }
    }

    /// Builds a full-load future that borrows nothing from `self`, so it can
    /// race teardown arms inside select!.
    fn load_future(
        &self,
        tenant: &str,
        publish_progress: bool,
    ) -> impl std::future::Future<Output = IndexResult<Snapshot<R>>> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let spec = self.spec.clone();
        let page_size = self.page_size;
        let status_tx = self.status_tx.clone();
        let tenant = tenant.to_string();

        async move {
            BatchLoader::new(backend.as_ref(), page_size)
                .run(&tenant, &spec, move |loaded, total| {
                    if publish_progress {
                        status_tx.send_modify(|st| {
                            st.progress = loaded;
                            st.total = total;
                        });
                    }
                })
                .await
        }
    }

    fn reset_status(&self) {
        let max_attempts = self.policy.max_attempts();
        self.publish(move |st| *st = IndexStatus::pre_boot(max_attempts));
    }

    fn publish<F: FnOnce(&mut IndexStatus)>(&self, f: F) {
        self.status_tx.send_modify(f);
    }
}
