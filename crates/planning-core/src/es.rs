//! The Elasticsearch Gateway contract (§4.1, C1). Kept generic over a JSON
//! document shape so that the gateway itself never needs to know about
//! `PlanningApplication` — callers decode `_source` into strong types at the
//! leaves that read them (§9 design note on dynamic nested documents).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// A kNN vector query clause (§4.1, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnQuery {
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
    pub num_candidates: usize,
    #[serde(default)]
    pub filter: Option<JsonValue>,
}

/// A compiled search request (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Option<JsonValue>,
    #[serde(default)]
    pub sort: Vec<JsonValue>,
    pub from: u64,
    pub size: u64,
    #[serde(default)]
    pub source_fields: Option<Vec<String>>,
    #[serde(default)]
    pub knn: Option<KnnQuery>,
    #[serde(default)]
    pub aggregations: Option<JsonValue>,
}

/// One hit in a [`SearchResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f32>,
    pub source: JsonValue,
}

/// The result of a search, kNN search, or aggregation-only query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: u64,
    #[serde(default)]
    pub aggregations: Option<JsonValue>,
}

/// One operation in a bulk request (§4.1).
#[derive(Debug, Clone)]
pub enum BulkOp {
    Index { id: String, doc: JsonValue },
    Update { id: String, partial_doc: JsonValue },
}

impl BulkOp {
    /// The document id this operation targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            BulkOp::Index { id, .. } | BulkOp::Update { id, .. } => id,
        }
    }
}

/// A single item failure surfaced from a bulk request (§4.1: "per-item failures
/// are surfaced, not retried").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome counts of a bulk request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResult {
    pub success: u64,
    pub failed: u64,
    pub failed_items: Vec<BulkFailure>,
}

/// A `search_after` page cursor: the sort values of the last hit of the previous
/// page (§4.1, §4.9).
pub type SearchAfterCursor = Vec<JsonValue>;

/// Cluster health summary (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    pub cluster_status: String,
    pub index_exists: bool,
}

/// Typed wrapper over a single Elasticsearch cluster (C1, §4.1).
///
/// Implementations must not run a full health check on every call — only on
/// startup and at periodic intervals (§4.1) — and must apply the bulk retry
/// policy (exponential backoff, 2s initial, 600s max, 3 retries on transient
/// errors) internally rather than pushing it onto callers.
#[async_trait]
pub trait EsGateway: Send + Sync {
    /// Runs a compiled search request.
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;

    /// Fetches a single document by id. `fails with NotFound` for an absent id.
    async fn get(&self, id: &str) -> Result<JsonValue>;

    /// Indexes (creates or fully replaces) a document.
    async fn index(&self, id: &str, doc: JsonValue, refresh: bool) -> Result<()>;

    /// Partially updates a document. Never creates (`doc_as_upsert=false`); always
    /// stamps `updated_at`.
    async fn update(&self, id: &str, partial_doc: JsonValue, refresh: bool) -> Result<()>;

    /// Applies a batch of operations, chunked to `chunk_size` items per HTTP call.
    async fn bulk_update(&self, ops: Vec<BulkOp>, chunk_size: usize) -> Result<BulkResult>;

    /// Cosine-similarity kNN search on a dense-vector field.
    async fn knn_search(&self, knn: KnnQuery) -> Result<SearchResponse>;

    /// Runs an aggregation tree, optionally scoped by a query.
    async fn aggregations(&self, aggs: JsonValue, query: Option<JsonValue>) -> Result<JsonValue>;

    /// Counts documents matching an optional query.
    async fn count(&self, query: Option<JsonValue>) -> Result<u64>;

    /// Deep-pagination cursor search ordered by `sort`.
    async fn search_after(
        &self,
        query: JsonValue,
        sort: Vec<JsonValue>,
        size: u64,
        cursor: Option<SearchAfterCursor>,
    ) -> Result<SearchResponse>;

    /// Opens (or continues, when `scroll_id` is given) a scroll context, valid
    /// for `keep_alive`. Returns the next page and the scroll id to pass on the
    /// following call; `None` once exhausted.
    async fn scroll(
        &self,
        query: Option<JsonValue>,
        keep_alive: &str,
        scroll_id: Option<String>,
    ) -> Result<(SearchResponse, Option<String>)>;

    /// Connection + index health. Cheap to call repeatedly but not on the hot path.
    async fn health_check(&self) -> Result<HealthStatus>;

    /// Forces an index refresh so recently written documents (and vectors) become
    /// searchable immediately. Called at the end of a bulk run (§4.9), never on
    /// the per-document write path.
    async fn refresh_index(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_op_id_reads_through_variants() {
        let index_op = BulkOp::Index {
            id: "APP-1".to_string(),
            doc: JsonValue::Null,
        };
        let update_op = BulkOp::Update {
            id: "APP-2".to_string(),
            partial_doc: JsonValue::Null,
        };
        assert_eq!(index_op.id(), "APP-1");
        assert_eq!(update_op.id(), "APP-2");
    }
}
