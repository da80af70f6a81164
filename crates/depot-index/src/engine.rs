//! # Indexation Engine
//!
//! Assembly of the whole indexation surface: the session channel, one store
//! per module, and the status aggregator over all of them.
//!
//! ## Module Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Engine                                        │
//! │                                                                         │
//! │  SessionBroadcaster ──┬─▶ active_items      (items, status = active)   │
//! │                       ├─▶ obsolete_items    (items, status = obsolete) │
//! │                       ├─▶ decommissions     (decommission_records)     │
//! │                       ├─▶ custody_records   (custody_records)          │
//! │                       ├─▶ unlisted_items    (unlisted_items, open)     │
//! │                       ├─▶ custodians        (custodians, active)       │
//! │                       └─▶ locations         (locations)                │
//! │                                    │                                    │
//! │                                    ▼                                    │
//! │                          StatusAggregator ──▶ consolidated feed        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::info;

use depot_cache::{CacheStore, FileStorage, MemoryStorage, StorageBackend};
use depot_core::{
    Custodian, CustodyRecord, DecommissionRecord, ItemRecord, Location, ModuleSpec, UnlistedItem,
};

use crate::aggregator::{AggregatorHandle, StatusAggregator, StatusSource};
use crate::backend::RecordBackend;
use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};
use crate::feed::ChangeFeed;
use crate::http::HttpBackend;
use crate::session::SessionBroadcaster;
use crate::store::{IndexContext, IndexHandle, IndexStore};
use crate::ws::WsChangeFeed;

/// The assembled indexation engine.
///
/// ## Usage
/// ```rust,ignore
/// let engine = Engine::from_config(IndexConfig::load(None)?)?;
///
/// engine.session().sign_in("tenant-a");
/// let items = engine.active_items.records().await;
///
/// engine.session().sign_out();
/// engine.shutdown().await;
/// ```
pub struct Engine {
    session: SessionBroadcaster,
    status: AggregatorHandle,

    pub active_items: IndexHandle<ItemRecord>,
    pub obsolete_items: IndexHandle<ItemRecord>,
    pub decommissions: IndexHandle<DecommissionRecord>,
    pub custody_records: IndexHandle<CustodyRecord>,
    pub unlisted_items: IndexHandle<UnlistedItem>,
    pub custodians: IndexHandle<Custodian>,
    pub locations: IndexHandle<Location>,
}

impl Engine {
    /// Wires the engine over explicit backend, feed, and cache services.
    pub fn new(
        config: IndexConfig,
        backend: Arc<dyn RecordBackend>,
        feed: Arc<dyn ChangeFeed>,
        cache: CacheStore,
    ) -> Self {
        let session = SessionBroadcaster::new();
        let ctx = IndexContext {
            backend,
            feed,
            cache,
            session: session.subscribe(),
        };

        let active_items = IndexStore::spawn(ModuleSpec::active_items(), &ctx, &config);
        let obsolete_items = IndexStore::spawn(ModuleSpec::obsolete_items(), &ctx, &config);
        let decommissions = IndexStore::spawn(ModuleSpec::decommissions(), &ctx, &config);
        let custody_records = IndexStore::spawn(ModuleSpec::custody_records(), &ctx, &config);
        let unlisted_items = IndexStore::spawn(ModuleSpec::unlisted_items(), &ctx, &config);
        let custodians = IndexStore::spawn(ModuleSpec::custodians(), &ctx, &config);
        let locations = IndexStore::spawn(ModuleSpec::locations(), &ctx, &config);

        let sources: Vec<Arc<dyn StatusSource>> = vec![
            Arc::new(active_items.clone()),
            Arc::new(obsolete_items.clone()),
            Arc::new(decommissions.clone()),
            Arc::new(custody_records.clone()),
            Arc::new(unlisted_items.clone()),
            Arc::new(custodians.clone()),
            Arc::new(locations.clone()),
        ];
        let status = StatusAggregator::spawn(sources, &config.status);

        info!(modules = 7, "Indexation engine assembled");

        Engine {
            session,
            status,
            active_items,
            obsolete_items,
            decommissions,
            custody_records,
            unlisted_items,
            custodians,
            locations,
        }
    }

    /// Builds production services (HTTP backend, WebSocket feed, file cache)
    /// from the config and wires the engine over them.
    pub fn from_config(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;

        let backend: Arc<dyn RecordBackend> = Arc::new(HttpBackend::new(&config.backend)?);
        let feed: Arc<dyn ChangeFeed> = Arc::new(WsChangeFeed::new(&config.feed)?);

        let storage: Arc<dyn StorageBackend> = if config.cache.enabled {
            let file_storage = match &config.cache.dir {
                Some(dir) => FileStorage::new(dir.clone()),
                None => FileStorage::at_default_root(),
            }
            .map_err(|e| IndexError::ConfigLoadFailed(format!("cache storage: {}", e)))?;
            Arc::new(file_storage)
        } else {
            Arc::new(MemoryStorage::new())
        };
        let cache = CacheStore::with_ttl(storage, config.cache_ttl());

        Ok(Engine::new(config, backend, feed, cache))
    }

    /// The session channel. Sign-in boots every store; sign-out tears all
    /// of them down.
    pub fn session(&self) -> &SessionBroadcaster {
        &self.session
    }

    /// The consolidated status feed.
    pub fn status(&self) -> &AggregatorHandle {
        &self.status
    }

    /// Reboots every module from a fresh full load.
    pub async fn reindex_all(&self) -> IndexResult<()> {
        self.active_items.reindex().await?;
        self.obsolete_items.reindex().await?;
        self.decommissions.reindex().await?;
        self.custody_records.reindex().await?;
        self.unlisted_items.reindex().await?;
        self.custodians.reindex().await?;
        self.locations.reindex().await?;
        Ok(())
    }

    /// Stops every task: the aggregator first so it never polls dying
    /// stores, then each store. Best effort; tasks already gone are fine.
    pub async fn shutdown(&self) {
        let _ = self.status.shutdown().await;
        let _ = self.active_items.shutdown().await;
        let _ = self.obsolete_items.shutdown().await;
        let _ = self.decommissions.shutdown().await;
        let _ = self.custody_records.shutdown().await;
        let _ = self.unlisted_items.shutdown().await;
        let _ = self.custodians.shutdown().await;
        let _ = self.locations.shutdown().await;
        info!("Indexation engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::feed::MemoryFeed;
    use serde_json::json;
    use std::time::Duration;

    fn memory_engine(backend: Arc<MemoryBackend>, feed: Arc<MemoryFeed>) -> Engine {
        let cache = CacheStore::new(Arc::new(MemoryStorage::new()));
        Engine::new(IndexConfig::default(), backend, feed, cache)
    }

    async fn wait_indexed<R: depot_core::Indexable>(handle: &IndexHandle<R>) {
        let mut rx = handle.watch_status();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if rx.borrow().is_indexed {
                    break;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("store never reached indexed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_boots_all_modules_on_sign_in() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_rows(
            "locations",
            vec![json!({
                "id": "loc-1",
                "tenant_id": "t-a",
                "name": "Dock",
                "building": null,
                "floor": null,
            })],
        );
        let feed = Arc::new(MemoryFeed::new());
        let engine = memory_engine(backend.clone(), feed.clone());

        engine.session().sign_in("t-a");
        wait_indexed(&engine.locations).await;
        wait_indexed(&engine.active_items).await;

        assert_eq!(engine.locations.record_count().await, 1);
        assert_eq!(engine.active_items.record_count().await, 0);
        assert!(feed.is_subscribed("locations"));
        assert!(feed.is_subscribed("items"));

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_clears_snapshots() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_rows(
            "locations",
            vec![json!({
                "id": "loc-1",
                "tenant_id": "t-a",
                "name": "Dock",
                "building": null,
                "floor": null,
            })],
        );
        let feed = Arc::new(MemoryFeed::new());
        let engine = memory_engine(backend, feed);

        engine.session().sign_in("t-a");
        wait_indexed(&engine.locations).await;
        assert_eq!(engine.locations.record_count().await, 1);

        engine.session().sign_out();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.locations.record_count().await, 0);
        assert!(!engine.locations.status().is_indexed);

        engine.shutdown().await;
    }
}
