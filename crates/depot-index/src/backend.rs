//! # Record Backend
//!
//! The query surface batch loads run against. `count` sizes the load so
//! progress can be reported; `fetch_page` returns one fixed-size page of
//! rows ordered by id. Implementations: [`HttpBackend`](crate::http) for
//! production, [`MemoryBackend`] for tests and local simulation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use depot_core::{Filter, FilterOp};

use crate::error::{IndexError, IndexResult};

/// Source of rows for batch loads.
///
/// Every query is scoped to a tenant; rows from other tenants must never
/// appear in a page. Pages are ordered by record id so that repeated loads
/// walk the table identically.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Counts rows matching the module's filter.
    async fn count(&self, tenant: &str, table: &str, filter: Option<&Filter>) -> IndexResult<u64>;

    /// Fetches one page of rows, ordered by id ascending.
    async fn fetch_page(
        &self,
        tenant: &str,
        table: &str,
        filter: Option<&Filter>,
        offset: u64,
        limit: u32,
    ) -> IndexResult<Vec<Value>>;
}

/// Returns true if the row satisfies the filter (always true without one).
pub(crate) fn row_matches(row: &Value, filter: Option<&Filter>) -> bool {
    match filter {
        None => true,
        Some(f) => match f.op {
            FilterOp::Eq | FilterOp::Is => row.get(&f.column) == Some(&f.value),
        },
    }
}

fn row_id(row: &Value) -> &str {
    row.get("id").and_then(Value::as_str).unwrap_or("")
}

fn row_tenant(row: &Value) -> &str {
    row.get("tenant_id").and_then(Value::as_str).unwrap_or("")
}

// =============================================================================
// Memory Backend
// =============================================================================

/// In-memory backend for tests and the simulation binary.
///
/// Rows live in per-table vectors; failures can be scripted to exercise the
/// abort path of the batch loader.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    fail_count: Mutex<Option<String>>,
    fail_page_at: Mutex<Option<u64>>,
    page_delay: Mutex<Option<Duration>>,
    count_calls: AtomicU32,
    page_calls: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a table's rows.
    pub fn set_rows(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .expect("backend tables lock poisoned")
            .insert(table.to_string(), rows);
    }

    /// Appends rows to a table.
    pub fn insert_rows(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .expect("backend tables lock poisoned")
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Makes the next `count` call fail with the given reason.
    pub fn fail_next_count(&self, reason: &str) {
        *self.fail_count.lock().expect("fail_count lock poisoned") = Some(reason.to_string());
    }

    /// Makes any `fetch_page` at the given offset fail.
    pub fn fail_page_at(&self, offset: u64) {
        *self.fail_page_at.lock().expect("fail_page_at lock poisoned") = Some(offset);
    }

    /// Clears a scripted page failure.
    pub fn clear_page_failure(&self) {
        *self.fail_page_at.lock().expect("fail_page_at lock poisoned") = None;
    }

    /// Makes every `fetch_page` sleep before answering, so a load can be
    /// caught in flight.
    pub fn delay_pages(&self, delay: Duration) {
        *self.page_delay.lock().expect("page_delay lock poisoned") = Some(delay);
    }

    /// Clears a scripted page delay.
    pub fn clear_page_delay(&self) {
        *self.page_delay.lock().expect("page_delay lock poisoned") = None;
    }

    /// Number of `count` calls served so far.
    pub fn count_calls(&self) -> u32 {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_page` calls served so far.
    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn matching_rows(&self, tenant: &str, table: &str, filter: Option<&Filter>) -> Vec<Value> {
        let tables = self.tables.lock().expect("backend tables lock poisoned");
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_tenant(row) == tenant && row_matches(row, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| row_id(a).cmp(row_id(b)));
        rows
    }
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn count(&self, tenant: &str, table: &str, filter: Option<&Filter>) -> IndexResult<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = self.fail_count.lock().expect("fail_count lock poisoned").take() {
            return Err(IndexError::CountFailed {
                table: table.to_string(),
                reason,
            });
        }

        Ok(self.matching_rows(tenant, table, filter).len() as u64)
    }

    async fn fetch_page(
        &self,
        tenant: &str,
        table: &str,
        filter: Option<&Filter>,
        offset: u64,
        limit: u32,
    ) -> IndexResult<Vec<Value>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.page_delay.lock().expect("page_delay lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = *self.fail_page_at.lock().expect("fail_page_at lock poisoned");
        if scripted == Some(offset) {
            return Err(IndexError::PageFailed {
                table: table.to_string(),
                offset,
                reason: "scripted failure".into(),
            });
        }

        let rows = self.matching_rows(tenant, table, filter);
        let start = (offset as usize).min(rows.len());
        let end = (start + limit as usize).min(rows.len());
        Ok(rows[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, tenant: &str, status: &str) -> Value {
        json!({ "id": id, "tenant_id": tenant, "status": status })
    }

    #[tokio::test]
    async fn test_count_respects_filter_and_tenant() {
        let backend = MemoryBackend::new();
        backend.set_rows(
            "items",
            vec![
                item("i-1", "t-a", "active"),
                item("i-2", "t-a", "obsolete"),
                item("i-3", "t-b", "active"),
            ],
        );

        let filter = Filter::eq("status", "active");
        let n = backend.count("t-a", "items", Some(&filter)).await.unwrap();
        assert_eq!(n, 1);

        let all = backend.count("t-a", "items", None).await.unwrap();
        assert_eq!(all, 2);
    }

    #[tokio::test]
    async fn test_pages_are_ordered_by_id() {
        let backend = MemoryBackend::new();
        backend.set_rows(
            "items",
            vec![
                item("i-3", "t-a", "active"),
                item("i-1", "t-a", "active"),
                item("i-2", "t-a", "active"),
            ],
        );

        let page = backend
            .fetch_page("t-a", "items", None, 0, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["id"], "i-1");
        assert_eq!(page[1]["id"], "i-2");

        let rest = backend
            .fetch_page("t-a", "items", None, 2, 2)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0]["id"], "i-3");
    }

    #[tokio::test]
    async fn test_scripted_page_failure() {
        let backend = MemoryBackend::new();
        backend.set_rows("items", vec![item("i-1", "t-a", "active")]);
        backend.fail_page_at(0);

        let err = backend
            .fetch_page("t-a", "items", None, 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::PageFailed { offset: 0, .. }));
    }
}
