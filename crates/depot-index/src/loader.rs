//! # Batch Loader
//!
//! Full-table load for one module: count first, then fixed-size pages
//! ordered by id until the count is satisfied.
//!
//! ## Load Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Batch Load                                      │
//! │                                                                         │
//! │  count(table, filter) ──▶ total                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fetch_page(offset=0)    ──▶ progress(1000, total)                     │
//! │  fetch_page(offset=1000) ──▶ progress(2000, total)                     │
//! │  ...until offset ≥ total or a short page                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Snapshot (deduplicated by id)                                          │
//! │                                                                         │
//! │  Any failure aborts the whole load; partial pages are discarded and    │
//! │  the caller's previous snapshot stays untouched.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info};

use depot_core::{Indexable, ModuleSpec, Snapshot};

use crate::backend::RecordBackend;
use crate::error::{IndexError, IndexResult};

/// Runs full-table loads against a record backend.
pub struct BatchLoader<'a> {
    backend: &'a dyn RecordBackend,
    page_size: u32,
}

impl<'a> BatchLoader<'a> {
    pub fn new(backend: &'a dyn RecordBackend, page_size: u32) -> Self {
        BatchLoader { backend, page_size }
    }

    /// Loads the module's rows into a fresh snapshot.
    ///
    /// `progress` is called once with `(0, total)` after the count and again
    /// after every page with the rows loaded so far. Rows inserted while the
    /// load runs may push the loaded count past the total; the change stream
    /// covers anything the pages missed.
    pub async fn run<R, F>(
        &self,
        tenant: &str,
        spec: &ModuleSpec<R>,
        mut progress: F,
    ) -> IndexResult<Snapshot<R>>
    where
        R: Indexable,
        F: FnMut(u64, u64),
    {
        let filter = spec.filter.as_ref();
        let total = self.backend.count(tenant, spec.table, filter).await?;
        info!(table = spec.table, total = total, "Batch load starting");
        progress(0, total);

        let mut records: Vec<R> = Vec::with_capacity(total as usize);
        let mut offset: u64 = 0;

        while offset < total {
            let page = self
                .backend
                .fetch_page(tenant, spec.table, filter, offset, self.page_size)
                .await?;
            debug!(
                table = spec.table,
                offset = offset,
                rows = page.len(),
                "Loaded page"
            );

            if page.is_empty() {
                // Rows vanished between the count and this page.
                break;
            }

            let short = (page.len() as u32) < self.page_size;
            offset += page.len() as u64;

            for row in page {
                let record: R =
                    serde_json::from_value(row).map_err(|e| IndexError::MalformedRow {
                        table: spec.table.to_string(),
                        source: e,
                    })?;
                records.push(record);
            }

            progress(offset, total);

            if short {
                break;
            }
        }

        let snapshot = Snapshot::from_records(records);
        info!(
            table = spec.table,
            rows = snapshot.len(),
            "Batch load complete"
        );
        Ok(snapshot)
    }
}
