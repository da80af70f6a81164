//! Shared harness for store lifecycle tests: in-memory services, row
//! builders, and status-wait helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;

use depot_cache::{CacheStore, MemoryStorage};
use depot_core::{Indexable, IndexStatus, ItemRecord, ModuleSpec};
use depot_index::{
    IndexConfig, IndexContext, IndexHandle, IndexStore, MemoryBackend, MemoryFeed,
    SessionBroadcaster,
};

pub const TENANT: &str = "t-a";

/// One engine's worth of in-memory services plus the session switch.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub feed: Arc<MemoryFeed>,
    pub storage: Arc<MemoryStorage>,
    pub cache: CacheStore,
    pub session: SessionBroadcaster,
    pub config: IndexConfig,
}

impl Harness {
    pub fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        Harness {
            backend: Arc::new(MemoryBackend::new()),
            feed: Arc::new(MemoryFeed::new()),
            cache: CacheStore::new(storage.clone()),
            storage,
            session: SessionBroadcaster::new(),
            config: IndexConfig::default(),
        }
    }

    pub fn ctx(&self) -> IndexContext {
        IndexContext {
            backend: self.backend.clone(),
            feed: self.feed.clone(),
            cache: self.cache.clone(),
            session: self.session.subscribe(),
        }
    }

    pub fn spawn<R: Indexable>(&self, spec: ModuleSpec<R>) -> IndexHandle<R> {
        IndexStore::spawn(spec, &self.ctx(), &self.config)
    }
}

/// Full row image for the items table.
pub fn item_row(id: &str, name: &str, status: &str) -> Value {
    item_row_for(TENANT, id, name, status)
}

pub fn item_row_for(tenant: &str, id: &str, name: &str, status: &str) -> Value {
    json!({
        "id": id,
        "tenant_id": tenant,
        "asset_tag": format!("AT-{}", id),
        "name": name,
        "category": "equipment",
        "location_id": null,
        "custodian_id": null,
        "acquisition_cost_cents": 180_000,
        "status": status,
        "created_at": "2026-03-01T10:00:00Z",
        "updated_at": "2026-03-01T10:00:00Z",
    })
}

/// The same row as a typed record, for seeding caches and comparing.
pub fn typed_item(id: &str, name: &str, status: &str) -> ItemRecord {
    serde_json::from_value(item_row(id, name, status)).expect("row shape matches ItemRecord")
}

pub fn location_row(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "tenant_id": TENANT,
        "name": name,
        "building": null,
        "floor": null,
    })
}

/// Waits until the published status satisfies the predicate.
pub async fn wait_status<R, F>(handle: &IndexHandle<R>, what: &str, pred: F)
where
    R: Indexable,
    F: Fn(&IndexStatus) -> bool,
{
    let mut rx = handle.watch_status();
    let waited = timeout(Duration::from_secs(60), async {
        loop {
            if pred(&rx.borrow()) {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("status channel closed while waiting for {}", what);
            }
        }
    })
    .await;
    waited.unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

pub async fn wait_indexed<R: Indexable>(handle: &IndexHandle<R>) {
    wait_status(handle, "indexed", |st| st.is_indexed).await;
}

/// Waits until the snapshot holds exactly `n` records.
pub async fn wait_count<R: Indexable>(handle: &IndexHandle<R>, n: u64) {
    let waited = timeout(Duration::from_secs(60), async {
        loop {
            if handle.record_count().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    waited.unwrap_or_else(|_| {
        panic!("timed out waiting for record count {}", n);
    });
}

/// Waits until at least `at_least` subscriptions have opened on the table.
/// Frames emitted before a store attaches its stream are lost, so tests
/// emit only after this returns.
pub async fn wait_subscribers(feed: &MemoryFeed, table: &str, at_least: u32) {
    let waited = timeout(Duration::from_secs(60), async {
        loop {
            if feed.subscribes(table) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    waited.unwrap_or_else(|_| {
        panic!("timed out waiting for {} subscriber(s) on {}", at_least, table);
    });
}

/// Lets spawned store tasks run briefly without asserting anything.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
