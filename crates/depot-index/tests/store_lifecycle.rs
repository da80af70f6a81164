//! Store lifecycle: session gating, boot paths (cache hit, full load),
//! live change application, reindex, and teardown.

mod common;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use common::*;
use depot_cache::{CacheEntry, StorageBackend};
use depot_core::{ItemRecord, ModuleSpec, RawChange};
use depot_index::IndexError;

#[tokio::test(start_paused = true)]
async fn test_stores_touch_nothing_before_sign_in() {
    let h = Harness::new();
    let handle = h.spawn(ModuleSpec::active_items());

    settle().await;

    assert_eq!(h.backend.count_calls(), 0);
    assert_eq!(h.backend.page_calls(), 0);
    assert_eq!(h.feed.subscribes("items"), 0);

    let status = handle.status();
    assert!(!status.is_indexing);
    assert!(!status.is_indexed);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cold_boot_pages_through_commits_then_attaches_stream() {
    let mut h = Harness::new();
    h.config.backend.page_size = 10;

    let rows = (0..25)
        .map(|n| item_row(&format!("i-{:02}", n), "Scanner", "active"))
        .collect();
    h.backend.set_rows("items", rows);

    let spec = ModuleSpec::active_items();
    let key = spec.cache_key_for(TENANT);
    let handle = h.spawn(spec);

    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    wait_subscribers(&h.feed, "items", 1).await;

    assert_eq!(handle.record_count().await, 25);
    let status = handle.status();
    assert!(!status.is_indexing);
    assert_eq!(status.progress, 25);
    assert_eq!(status.total, 25);

    // 25 rows at page size 10: one count, three pages.
    assert_eq!(h.backend.count_calls(), 1);
    assert_eq!(h.backend.page_calls(), 3);

    // The stream attached after the commit, and the cache mirrors it.
    assert!(h.feed.is_subscribed("items"));
    assert_eq!(h.feed.subscribes("items"), 1);
    let cached: Vec<ItemRecord> = h.cache.load(&key).expect("snapshot mirrored to cache");
    assert_eq!(cached.len(), 25);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_boots_without_backend_and_still_attaches_stream() {
    let h = Harness::new();

    let spec = ModuleSpec::active_items();
    let key = spec.cache_key_for(TENANT);
    let cached = vec![
        typed_item("i-1", "Scanner", "active"),
        typed_item("i-2", "Pallet Jack", "active"),
    ];
    h.cache.save(&key, &cached);

    let handle = h.spawn(spec);
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    wait_subscribers(&h.feed, "items", 1).await;

    assert_eq!(handle.record_count().await, 2);
    assert_eq!(h.backend.count_calls(), 0);
    assert_eq!(h.backend.page_calls(), 0);
    assert!(h.feed.is_subscribed("items"));

    // Live events land on top of the cached snapshot.
    assert!(h
        .feed
        .emit("items", RawChange::insert(item_row("i-3", "Cart", "active"))));
    wait_count(&handle, 3).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_entry_falls_back_to_full_load() {
    let h = Harness::new();

    let spec = ModuleSpec::active_items();
    let key = spec.cache_key_for(TENANT);
    let stale = CacheEntry {
        written_at: Utc::now() - chrono::Duration::days(8),
        payload: vec![typed_item("i-old", "Ghost Scanner", "active")],
    };
    h.storage
        .set(&key, &serde_json::to_string(&stale).unwrap())
        .unwrap();

    h.backend
        .set_rows("items", vec![item_row("i-new", "Fresh Scanner", "active")]);

    let handle = h.spawn(spec);
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;

    assert_eq!(h.backend.count_calls(), 1);
    assert_eq!(handle.record_count().await, 1);
    assert!(handle.get("i-new").await.is_some());
    assert!(handle.get("i-old").await.is_none());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_events_follow_membership_rules() {
    let h = Harness::new();
    h.backend
        .set_rows("items", vec![item_row("i-1", "Scanner", "active")]);

    let handle = h.spawn(ModuleSpec::active_items());
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    wait_subscribers(&h.feed, "items", 1).await;
    assert_eq!(handle.record_count().await, 1);

    // Insert of a matching record appears.
    h.feed
        .emit("items", RawChange::insert(item_row("i-2", "Forklift", "active")));
    wait_count(&handle, 2).await;

    // Update flipping the lifecycle out of this module removes it.
    h.feed.emit(
        "items",
        RawChange::update(None, item_row("i-2", "Forklift", "obsolete")),
    );
    wait_count(&handle, 1).await;

    // Update for an id the load never saw lands as an insert.
    h.feed.emit(
        "items",
        RawChange::update(None, item_row("i-3", "Hand Truck", "active")),
    );
    wait_count(&handle, 2).await;

    // Insert failing the membership predicate is ignored.
    h.feed
        .emit("items", RawChange::insert(item_row("i-9", "Retired", "obsolete")));
    settle().await;
    assert_eq!(handle.record_count().await, 2);
    assert!(handle.get("i-9").await.is_none());

    // Update replaces field values in place.
    h.feed.emit(
        "items",
        RawChange::update(None, item_row("i-1", "Scanner Mk2", "active")),
    );
    settle().await;
    let renamed = handle.get("i-1").await.unwrap();
    assert_eq!(renamed.name, "Scanner Mk2");
    assert_eq!(handle.record_count().await, 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_frames_apply_idempotently() {
    let h = Harness::new();
    h.backend
        .set_rows("items", vec![item_row("i-1", "Scanner", "active")]);

    let handle = h.spawn(ModuleSpec::active_items());
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    wait_subscribers(&h.feed, "items", 1).await;

    let insert = RawChange::insert(item_row("i-2", "Forklift", "active"));
    h.feed.emit("items", insert.clone());
    h.feed.emit("items", insert);
    wait_count(&handle, 2).await;
    settle().await;
    assert_eq!(handle.record_count().await, 2);

    let delete = RawChange::delete(json!({ "id": "i-2" }));
    h.feed.emit("items", delete.clone());
    h.feed.emit("items", delete);
    wait_count(&handle, 1).await;
    settle().await;
    assert_eq!(handle.record_count().await, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_skipped_without_killing_the_stream() {
    let h = Harness::new();
    h.backend
        .set_rows("items", vec![item_row("i-1", "Scanner", "active")]);

    let handle = h.spawn(ModuleSpec::active_items());
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    wait_subscribers(&h.feed, "items", 1).await;

    h.feed
        .emit("items", RawChange::insert(json!({ "bogus": true })));
    settle().await;
    assert_eq!(handle.record_count().await, 1);

    // The stream is still live afterwards.
    h.feed
        .emit("items", RawChange::insert(item_row("i-2", "Cart", "active")));
    wait_count(&handle, 2).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_flip_moves_item_between_modules() {
    let h = Harness::new();
    h.backend
        .set_rows("items", vec![item_row("i-1", "Scanner", "active")]);

    let active = h.spawn(ModuleSpec::active_items());
    let obsolete = h.spawn(ModuleSpec::obsolete_items());
    h.session.sign_in(TENANT);
    wait_indexed(&active).await;
    wait_indexed(&obsolete).await;
    wait_subscribers(&h.feed, "items", 2).await;

    assert_eq!(active.record_count().await, 1);
    assert_eq!(obsolete.record_count().await, 0);

    // Both stores watch the items table; the same update leaves one module
    // and enters the other.
    h.feed.emit(
        "items",
        RawChange::update(None, item_row("i-1", "Scanner", "obsolete")),
    );
    wait_count(&active, 0).await;
    wait_count(&obsolete, 1).await;

    active.shutdown().await.unwrap();
    obsolete.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reindex_clears_cache_and_reboots_from_backend() {
    let h = Harness::new();
    h.backend
        .set_rows("items", vec![item_row("i-1", "Scanner", "active")]);

    let spec = ModuleSpec::active_items();
    let key = spec.cache_key_for(TENANT);
    let handle = h.spawn(spec);
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    assert_eq!(h.backend.count_calls(), 1);

    // The table changed behind the store's back.
    h.backend.set_rows(
        "items",
        vec![
            item_row("i-1", "Scanner Mk2", "active"),
            item_row("i-2", "Forklift", "active"),
        ],
    );

    handle.reindex().await.unwrap();
    wait_count(&handle, 2).await;
    wait_subscribers(&h.feed, "items", 2).await;

    // A second full load ran; the warm cache was not consulted.
    assert_eq!(h.backend.count_calls(), 2);
    let status = handle.status();
    assert!(status.is_indexed);
    assert_eq!(status.total, 2);

    let item = handle.get("i-1").await.unwrap();
    assert_eq!(item.name, "Scanner Mk2");

    let cached: Vec<ItemRecord> = h.cache.load(&key).expect("fresh snapshot mirrored");
    assert_eq!(cached.len(), 2);

    // Boot plus reboot each attached a stream.
    assert_eq!(h.feed.subscribes("items"), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reindex_mid_load_discards_the_stale_load() {
    let h = Harness::new();
    h.backend.set_rows(
        "items",
        vec![
            item_row("i-old-1", "Scanner", "active"),
            item_row("i-old-2", "Forklift", "active"),
            item_row("i-old-3", "Cart", "active"),
        ],
    );
    h.backend.delay_pages(Duration::from_secs(5));

    let handle = h.spawn(ModuleSpec::active_items());
    h.session.sign_in(TENANT);

    // The count has run and the first page is hanging in the scripted delay.
    wait_status(&handle, "first load in flight", |st| st.total == 3).await;
    assert_eq!(h.backend.count_calls(), 1);

    // Replace the table and reindex while that load is still in flight.
    h.backend.set_rows(
        "items",
        vec![
            item_row("i-new-1", "Pallet Jack", "active"),
            item_row("i-new-2", "Hand Truck", "active"),
        ],
    );
    handle.reindex().await.unwrap();
    wait_indexed(&handle).await;

    // Only the fresh load's snapshot stands; the aborted one left nothing.
    assert_eq!(handle.record_count().await, 2);
    assert!(handle.get("i-new-1").await.is_some());
    assert!(handle.get("i-old-1").await.is_none());
    let status = handle.status();
    assert_eq!(status.total, 2);
    assert_eq!(h.backend.count_calls(), 2);

    // The aborted boot never attached a stream; the reboot did, once.
    wait_subscribers(&h.feed, "items", 1).await;
    assert_eq!(h.feed.subscribes("items"), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_snapshot_but_cache_warms_the_next_boot() {
    let h = Harness::new();
    h.backend.set_rows(
        "items",
        vec![
            item_row("i-1", "Scanner", "active"),
            item_row("i-2", "Forklift", "active"),
        ],
    );

    let handle = h.spawn(ModuleSpec::active_items());
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    assert_eq!(handle.record_count().await, 2);
    assert_eq!(h.backend.count_calls(), 1);

    h.session.sign_out();
    wait_count(&handle, 0).await;
    let status = handle.status();
    assert!(!status.is_indexed);
    assert!(status.error.is_none());

    // Same tenant signs back in: the still-fresh cache serves the boot and
    // the backend is not touched again.
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;
    wait_subscribers(&h.feed, "items", 2).await;

    assert_eq!(handle.record_count().await, 2);
    assert_eq!(h.backend.count_calls(), 1);
    assert_eq!(h.feed.subscribes("items"), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tenant_switch_serves_only_the_new_tenants_rows() {
    let h = Harness::new();
    h.backend.set_rows(
        "items",
        vec![
            item_row_for("t-a", "i-a1", "Scanner", "active"),
            item_row_for("t-a", "i-a2", "Forklift", "active"),
            item_row_for("t-b", "i-b1", "Pallet Jack", "active"),
        ],
    );

    let spec = ModuleSpec::active_items();
    let key_a = spec.cache_key_for("t-a");
    let key_b = spec.cache_key_for("t-b");
    let handle = h.spawn(spec);

    h.session.sign_in("t-a");
    wait_count(&handle, 2).await;

    // Switching tenants mid-session tears down and boots for the new one.
    h.session.sign_in("t-b");
    wait_count(&handle, 1).await;
    assert!(handle.get("i-b1").await.is_some());
    assert!(handle.get("i-a1").await.is_none());

    // Each tenant keeps its own cache entry.
    let cached_a: Vec<ItemRecord> = h.cache.load(&key_a).expect("t-a cache kept");
    let cached_b: Vec<ItemRecord> = h.cache.load(&key_b).expect("t-b cache written");
    assert_eq!(cached_a.len(), 2);
    assert_eq!(cached_b.len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_task_for_good() {
    let h = Harness::new();
    h.backend
        .set_rows("items", vec![item_row("i-1", "Scanner", "active")]);

    let handle = h.spawn(ModuleSpec::active_items());
    h.session.sign_in(TENANT);
    wait_indexed(&handle).await;

    handle.shutdown().await.unwrap();
    settle().await;

    let err = handle.reindex().await.unwrap_err();
    assert!(matches!(err, IndexError::ChannelError(_)));
}
