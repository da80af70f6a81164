//! # Index Simulation
//!
//! Drives the engine against in-memory services so the whole lifecycle can
//! be watched in logs: boot, live changes, a feed outage with reconnection
//! and reconciliation, then teardown.
//!
//! ```text
//! cargo run --bin simulate
//! RUST_LOG=depot_index=debug cargo run --bin simulate
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use depot_cache::{CacheStore, MemoryStorage};
use depot_core::RawChange;
use depot_index::{Engine, IndexConfig, MemoryBackend, MemoryFeed};

const TENANT: &str = "acme";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("depot_index=debug,info")),
        )
        .with_target(true)
        .init();

    info!("Starting index simulation");

    let backend = Arc::new(MemoryBackend::new());
    seed(&backend);
    let feed = Arc::new(MemoryFeed::new());
    let cache = CacheStore::new(Arc::new(MemoryStorage::new()));

    let engine = Engine::new(
        IndexConfig::default(),
        backend.clone(),
        feed.clone(),
        cache,
    );

    // Boot every module for the tenant.
    engine.session().sign_in(TENANT);
    wait_for_boot(&engine).await;
    // Streams attach just after the committed status flips; give them a beat.
    tokio::time::sleep(Duration::from_millis(100)).await;
    report(&engine, "after boot").await;

    // Live changes: a new item arrives, one goes obsolete, one is removed.
    info!("Emitting live changes");
    feed.emit(
        "items",
        RawChange::insert(item_row("item-0901", "Pallet wrapper", "active")),
    );
    feed.emit(
        "items",
        RawChange::update(None, item_row("item-0002", "Label printer", "obsolete")),
    );
    feed.emit(
        "items",
        RawChange::delete(json!({ "id": "item-0003" })),
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    report(&engine, "after live changes").await;

    // Outage: sever the items stream while rows keep changing server-side,
    // then let the store reconnect and reconcile the gap.
    info!("Severing the items change stream");
    backend.insert_rows(
        "items",
        vec![item_row("item-0902", "Forklift charger", "active")],
    );
    feed.disconnect("items");
    tokio::time::sleep(Duration::from_secs(2)).await;
    report(&engine, "after reconnect and reconcile").await;

    // Reindex one module, then tear everything down.
    info!("Reindexing active items");
    engine.active_items.reindex().await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    report(&engine, "after reindex").await;

    engine.session().sign_out();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.shutdown().await;

    info!("Simulation complete");
    Ok(())
}

/// Seeds the backend with a small dataset for the tenant.
fn seed(backend: &MemoryBackend) {
    backend.set_rows(
        "items",
        vec![
            item_row("item-0001", "Pallet jack", "active"),
            item_row("item-0002", "Label printer", "active"),
            item_row("item-0003", "Hand scanner", "active"),
            item_row("item-0004", "Conveyor belt", "obsolete"),
        ],
    );
    backend.set_rows(
        "locations",
        vec![
            json!({ "id": "loc-01", "tenant_id": TENANT, "name": "Receiving dock", "building": "A", "floor": null }),
            json!({ "id": "loc-02", "tenant_id": TENANT, "name": "Cold storage", "building": "B", "floor": "1" }),
        ],
    );
    backend.set_rows(
        "custodians",
        vec![json!({
            "id": "cust-01",
            "tenant_id": TENANT,
            "name": "Dana Reyes",
            "email": "dana@acme.example",
            "department": "Operations",
            "active": true,
        })],
    );
    backend.set_rows(
        "custody_records",
        (1..=3)
            .map(|n| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "tenant_id": TENANT,
                    "item_id": format!("item-000{n}"),
                    "custodian_id": "cust-01",
                    "notes": null,
                    "assigned_at": "2026-02-12T08:30:00Z",
                    "returned_at": null,
                })
            })
            .collect(),
    );
}

fn item_row(id: &str, name: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "tenant_id": TENANT,
        "asset_tag": format!("AT-{}", id),
        "name": name,
        "category": "equipment",
        "location_id": "loc-01",
        "custodian_id": null,
        "acquisition_cost_cents": 250_000,
        "status": status,
        "created_at": "2026-02-10T09:00:00Z",
        "updated_at": "2026-02-10T09:00:00Z",
    })
}

/// Polls until every module reports indexed.
async fn wait_for_boot(engine: &Engine) {
    for _ in 0..100 {
        let entries = engine.status().entries();
        let all_quiet = engine.active_items.status().is_indexed
            && engine.obsolete_items.status().is_indexed
            && engine.custody_records.status().is_indexed
            && engine.locations.status().is_indexed
            && engine.custodians.status().is_indexed;
        if all_quiet {
            info!(visible = entries.len(), "All modules indexed");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("Boot wait timed out; continuing anyway");
}

async fn report(engine: &Engine, phase: &str) {
    info!(
        phase = phase,
        active_items = engine.active_items.record_count().await,
        obsolete_items = engine.obsolete_items.record_count().await,
        custody_records = engine.custody_records.record_count().await,
        locations = engine.locations.record_count().await,
        custodians = engine.custodians.record_count().await,
        "Snapshot counts"
    );
    for entry in engine.status().entries() {
        info!(
            module = %entry.meta.slug,
            kind = ?entry.kind,
            records = entry.record_count,
            pulse = entry.pulse,
            "Status entry"
        );
    }
}
