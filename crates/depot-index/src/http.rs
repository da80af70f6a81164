//! # HTTP Record Backend
//!
//! [`RecordBackend`] implementation over a PostgREST-style row API.
//!
//! ## Request Shapes
//! ```text
//! count:       GET /items?status=eq.active&tenant_id=eq.t-a
//!              Range: 0-0            Prefer: count=exact
//!              ← 206, Content-Range: 0-0/4821
//!
//! fetch_page:  GET /items?status=eq.active&tenant_id=eq.t-a
//!                        &order=id.asc&offset=2000&limit=1000
//!              ← 200, JSON array of rows
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use depot_core::{Filter, FilterOp};

use crate::backend::RecordBackend;
use crate::config::BackendSettings;
use crate::error::{IndexError, IndexResult};

/// Record backend speaking to a row API over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpBackend {
    /// Builds a backend from settings.
    pub fn new(settings: &BackendSettings) -> IndexResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(HttpBackend {
            client,
            base_url,
            bearer_token: settings.bearer_token.clone(),
        })
    }

    fn table_url(&self, table: &str) -> IndexResult<Url> {
        self.base_url
            .join(table)
            .map_err(|e| IndexError::InvalidUrl(format!("{}/{}: {}", self.base_url, table, e)))
    }

    fn request(
        &self,
        url: Url,
        tenant: &str,
        filter: Option<&Filter>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .query(&[("tenant_id", format!("eq.{}", tenant))]);

        if let Some(filter) = filter {
            let (column, rhs) = filter_query(filter);
            req = req.query(&[(column, rhs)]);
        }

        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        req
    }
}

#[async_trait]
impl RecordBackend for HttpBackend {
    async fn count(&self, tenant: &str, table: &str, filter: Option<&Filter>) -> IndexResult<u64> {
        let url = self.table_url(table)?;
        let resp = self
            .request(url, tenant, filter)
            .header("Range", "0-0")
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| IndexError::CountFailed {
                table: table.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(IndexError::CountFailed {
                table: table.to_string(),
                reason: format!("status {}", resp.status()),
            });
        }

        let header = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                IndexError::InvalidResponse(format!("{}: missing Content-Range header", table))
            })?;

        content_range_total(header).ok_or_else(|| {
            IndexError::InvalidResponse(format!("{}: bad Content-Range '{}'", table, header))
        })
    }

    async fn fetch_page(
        &self,
        tenant: &str,
        table: &str,
        filter: Option<&Filter>,
        offset: u64,
        limit: u32,
    ) -> IndexResult<Vec<Value>> {
        let url = self.table_url(table)?;
        let resp = self
            .request(url, tenant, filter)
            .query(&[
                ("order", "id.asc".to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| IndexError::PageFailed {
                table: table.to_string(),
                offset,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(IndexError::PageFailed {
                table: table.to_string(),
                offset,
                reason: format!("status {}", resp.status()),
            });
        }

        let body: Value = resp.json().await.map_err(|e| IndexError::PageFailed {
            table: table.to_string(),
            offset,
            reason: e.to_string(),
        })?;

        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(IndexError::InvalidResponse(format!(
                "{}: expected a row array, got {}",
                table,
                type_name(&other)
            ))),
        }
    }
}

/// Extracts the total from a `Content-Range` header (`0-0/4821` → 4821).
fn content_range_total(header: &str) -> Option<u64> {
    let total = header.rsplit('/').next()?;
    if total == "*" {
        return None;
    }
    total.trim().parse().ok()
}

/// Renders a filter as a PostgREST query pair (`status` → `eq.active`).
fn filter_query(filter: &Filter) -> (String, String) {
    let op = match filter.op {
        FilterOp::Eq => "eq",
        FilterOp::Is => "is",
    };
    (
        filter.column.clone(),
        format!("{}.{}", op, render_scalar(&filter.value)),
    )
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
