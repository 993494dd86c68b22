use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts, IndicesRefreshParts};
use elasticsearch::{
    BulkParts, CountParts, Elasticsearch, GetParts, IndexParts, ScrollParts, SearchParts,
    UpdateParts,
};
use planning_core::{
    BulkFailure, BulkOp, BulkResult, EsGateway, HealthStatus, KnnQuery, PlanningError, Result,
    SearchAfterCursor, SearchHit, SearchRequest, SearchResponse,
};
use serde_json::{json, Value as JsonValue};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::mapping::planning_applications_mapping;

const MAX_RECONNECT_ATTEMPTS: u32 = 3;
const BULK_RETRY_ATTEMPTS: usize = 3;
const BULK_RETRY_INITIAL_MS: u64 = 2_000;
const BULK_RETRY_MAX_MS: u64 = 600_000;

/// Thin wrapper over the official `elasticsearch` client that owns connection
/// health tracking, the bulk retry policy, and the index mapping (§4.1, C1).
///
/// Never runs a cluster health check on a hot-path call; `health_check` is
/// called explicitly by the caller at startup and on a periodic timer (§4.1).
pub struct ElasticsearchGateway {
    client: Elasticsearch,
    index_name: String,
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl ElasticsearchGateway {
    /// Connects to a single-node Elasticsearch cluster and ensures the
    /// `planning_applications` index exists with its dense-vector mapping.
    pub async fn connect(
        url: &str,
        index_name: &str,
        username: Option<&str>,
        password: Option<&str>,
        request_timeout: Duration,
        embedding_dimensions: usize,
    ) -> Result<Self> {
        let parsed_url = url
            .parse()
            .map_err(|err| PlanningError::validation(format!("invalid Elasticsearch URL '{url}': {err}")))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).timeout(request_timeout);
        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.auth(Credentials::Basic(user.to_string(), pass.to_string()));
        }
        let transport = builder
            .build()
            .map_err(|err| PlanningError::database_unavailable(format!("failed to build ES transport: {err}")))?;

        let gateway = Self {
            client: Elasticsearch::new(transport),
            index_name: index_name.to_string(),
            connected: AtomicBool::new(true),
            reconnect_attempts: AtomicU32::new(0),
        };

        gateway.ensure_index(embedding_dimensions).await?;
        Ok(gateway)
    }

    async fn ensure_index(&self, embedding_dimensions: usize) -> Result<()> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if exists.status_code().is_success() {
            return Ok(());
        }

        let create = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_name))
            .body(planning_applications_mapping(embedding_dimensions))
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !create.status_code().is_success() {
            let body = create.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "failed to create index '{}': {body}",
                self.index_name
            )));
        }
        Ok(())
    }

    fn connection_error(&self, err: elasticsearch::Error) -> PlanningError {
        let attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= MAX_RECONNECT_ATTEMPTS {
            self.connected.store(false, Ordering::SeqCst);
            PlanningError::database_unavailable(format!(
                "Elasticsearch unreachable after {attempts} reconnect attempts: {err}"
            ))
        } else {
            warn!(attempt = attempts, %err, "transient Elasticsearch error, will retry on next call");
            PlanningError::database_unavailable(format!("Elasticsearch request failed: {err}"))
        }
    }

    fn reset_connection_state(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            debug!("Elasticsearch connection recovered");
        }
        self.reconnect_attempts.store(0, Ordering::SeqCst);
    }

    fn bulk_retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(BULK_RETRY_INITIAL_MS)
            .max_delay(Duration::from_millis(BULK_RETRY_MAX_MS))
            .map(jitter)
            .take(BULK_RETRY_ATTEMPTS)
    }

    fn compiled_search_body(request: &SearchRequest) -> JsonValue {
        let mut body = json!({
            "query": request.query.clone().unwrap_or_else(|| json!({ "match_all": {} })),
            "from": request.from,
            "size": request.size,
        });
        if !request.sort.is_empty() {
            body["sort"] = json!(request.sort);
        }
        if let Some(fields) = &request.source_fields {
            body["_source"] = json!(fields);
        }
        if let Some(knn) = &request.knn {
            body["knn"] = knn_body(knn);
            // A kNN-only request has no text query component; drop the
            // default match_all so ES doesn't score on it unnecessarily.
            if request.query.is_none() {
                body.as_object_mut().unwrap().remove("query");
            }
        }
        if let Some(aggs) = &request.aggregations {
            body["aggs"] = aggs.clone();
        }
        body
    }

    async fn run_bulk_chunk(&self, body: Vec<JsonValue>) -> Result<JsonValue> {
        let action = || {
            let body: Vec<JsonBody<JsonValue>> = body.iter().cloned().map(JsonBody::new).collect();
            async {
                self.client
                    .bulk(BulkParts::Index(&self.index_name))
                    .body(body)
                    .send()
                    .await
            }
        };
        let response = Retry::spawn(Self::bulk_retry_strategy(), action)
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "bulk request failed: {text}"
            )));
        }

        self.reset_connection_state();
        response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse bulk response: {err}")))
    }
}

fn knn_body(knn: &KnnQuery) -> JsonValue {
    let mut body = json!({
        "field": knn.field,
        "query_vector": knn.vector,
        "k": knn.k,
        "num_candidates": knn.num_candidates,
    });
    if let Some(filter) = &knn.filter {
        body["filter"] = filter.clone();
    }
    body
}

fn parse_search_response(json: JsonValue) -> SearchResponse {
    let total = json["hits"]["total"]["value"].as_u64().unwrap_or(0);
    let hits = json["hits"]["hits"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|hit| SearchHit {
            id: hit["_id"].as_str().unwrap_or_default().to_string(),
            score: hit["_score"].as_f64().map(|score| score as f32),
            source: hit["_source"].clone(),
        })
        .collect();
    let aggregations = json.get("aggregations").cloned();
    SearchResponse {
        hits,
        total,
        aggregations,
    }
}

#[async_trait]
impl EsGateway for ElasticsearchGateway {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let body = Self::compiled_search_body(&request);
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "search failed: {text}"
            )));
        }
        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse search response: {err}")))?;
        Ok(parse_search_response(json))
    }

    async fn get(&self, id: &str) -> Result<JsonValue> {
        let response = self
            .client
            .get(GetParts::IndexId(&self.index_name, id))
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if response.status_code() == 404 {
            return Err(PlanningError::not_found(format!(
                "no document with id '{id}'"
            )));
        }
        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!("get failed: {text}")));
        }

        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse get response: {err}")))?;
        Ok(json["_source"].clone())
    }

    async fn index(&self, id: &str, doc: JsonValue, refresh: bool) -> Result<()> {
        let refresh_param = if refresh { "true" } else { "false" };
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index_name, id))
            .refresh(match refresh {
                true => elasticsearch::params::Refresh::True,
                false => elasticsearch::params::Refresh::False,
            })
            .body(doc)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "index (refresh={refresh_param}) failed: {text}"
            )));
        }
        self.reset_connection_state();
        Ok(())
    }

    async fn update(&self, id: &str, mut partial_doc: JsonValue, refresh: bool) -> Result<()> {
        if let Some(obj) = partial_doc.as_object_mut() {
            obj.insert("updated_at".to_string(), json!(chrono::Utc::now().to_rfc3339()));
        }
        let body = json!({
            "doc": partial_doc,
            "doc_as_upsert": false,
        });
        let response = self
            .client
            .update(UpdateParts::IndexId(&self.index_name, id))
            .refresh(match refresh {
                true => elasticsearch::params::Refresh::True,
                false => elasticsearch::params::Refresh::False,
            })
            .body(body)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if response.status_code() == 404 {
            return Err(PlanningError::not_found(format!(
                "cannot update missing document '{id}'"
            )));
        }
        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!("update failed: {text}")));
        }
        self.reset_connection_state();
        Ok(())
    }

    async fn bulk_update(&self, ops: Vec<BulkOp>, chunk_size: usize) -> Result<BulkResult> {
        let chunk_size = chunk_size.max(1);
        let mut result = BulkResult::default();

        for chunk in ops.chunks(chunk_size) {
            let mut body: Vec<JsonValue> = Vec::with_capacity(chunk.len() * 2);
            for op in chunk {
                match op {
                    BulkOp::Index { id, doc } => {
                        body.push(json!({ "index": { "_id": id } }));
                        body.push(doc.clone());
                    }
                    BulkOp::Update { id, partial_doc } => {
                        body.push(json!({ "update": { "_id": id } }));
                        body.push(json!({ "doc": partial_doc, "doc_as_upsert": false }));
                    }
                }
            }

            let response = self.run_bulk_chunk(body).await?;
            let items = response["items"].as_array().cloned().unwrap_or_default();
            for (op, item) in chunk.iter().zip(items.iter()) {
                let action = item.get("index").or_else(|| item.get("update"));
                let status = action.and_then(|a| a["status"].as_u64()).unwrap_or(0);
                if (200..300).contains(&status) {
                    result.success += 1;
                } else {
                    result.failed += 1;
                    let reason = action
                        .and_then(|a| a["error"]["reason"].as_str())
                        .unwrap_or("unknown error")
                        .to_string();
                    result.failed_items.push(BulkFailure {
                        id: op.id().to_string(),
                        reason,
                    });
                }
            }
        }

        Ok(result)
    }

    async fn knn_search(&self, knn: KnnQuery) -> Result<SearchResponse> {
        let body = json!({
            "knn": knn_body(&knn),
            "size": knn.k,
            "_source": true,
        });
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "knn search failed: {text}"
            )));
        }
        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse knn response: {err}")))?;
        Ok(parse_search_response(json))
    }

    async fn aggregations(&self, aggs: JsonValue, query: Option<JsonValue>) -> Result<JsonValue> {
        let body = json!({
            "query": query.unwrap_or_else(|| json!({ "match_all": {} })),
            "aggs": aggs,
            "size": 0,
        });
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "aggregations failed: {text}"
            )));
        }
        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse aggregations: {err}")))?;
        Ok(json["aggregations"].clone())
    }

    async fn count(&self, query: Option<JsonValue>) -> Result<u64> {
        let body = json!({ "query": query.unwrap_or_else(|| json!({ "match_all": {} })) });
        let response = self
            .client
            .count(CountParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!("count failed: {text}")));
        }
        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse count response: {err}")))?;
        Ok(json["count"].as_u64().unwrap_or(0))
    }

    async fn search_after(
        &self,
        query: JsonValue,
        sort: Vec<JsonValue>,
        size: u64,
        cursor: Option<SearchAfterCursor>,
    ) -> Result<SearchResponse> {
        let mut body = json!({
            "query": query,
            "sort": sort,
            "size": size,
        });
        if let Some(cursor) = cursor {
            body["search_after"] = json!(cursor);
        }
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!(
                "search_after failed: {text}"
            )));
        }
        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse search_after response: {err}")))?;
        Ok(parse_search_response(json))
    }

    async fn scroll(
        &self,
        query: Option<JsonValue>,
        keep_alive: &str,
        scroll_id: Option<String>,
    ) -> Result<(SearchResponse, Option<String>)> {
        let response = if let Some(scroll_id) = scroll_id {
            self.client
                .scroll(ScrollParts::ScrollId(&scroll_id))
                .body(json!({ "scroll": keep_alive, "scroll_id": scroll_id }))
                .send()
                .await
                .map_err(|err| self.connection_error(err))?
        } else {
            self.client
                .search(SearchParts::Index(&[&self.index_name]))
                .scroll(keep_alive)
                .body(json!({ "query": query.unwrap_or_else(|| json!({ "match_all": {} })) }))
                .send()
                .await
                .map_err(|err| self.connection_error(err))?
        };

        if !response.status_code().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlanningError::database_unavailable(format!("scroll failed: {text}")));
        }
        self.reset_connection_state();
        let json = response
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse scroll response: {err}")))?;
        let next_scroll_id = json["_scroll_id"].as_str().map(str::to_string);
        let search_response = parse_search_response(json);
        let exhausted = search_response.hits.is_empty();
        Ok((search_response, if exhausted { None } else { next_scroll_id }))
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        let health = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !health.status_code().is_success() {
            return Err(PlanningError::database_unavailable(
                "cluster health check failed",
            ));
        }
        self.reset_connection_state();
        let health_json = health
            .json::<JsonValue>()
            .await
            .map_err(|err| PlanningError::internal(format!("failed to parse health response: {err}")))?;

        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        Ok(HealthStatus {
            cluster_status: health_json["status"].as_str().unwrap_or("unknown").to_string(),
            index_exists: exists.status_code().is_success(),
        })
    }

    async fn refresh_index(&self) -> Result<()> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&self.index_name]))
            .send()
            .await
            .map_err(|err| self.connection_error(err))?;

        if !response.status_code().is_success() {
            return Err(PlanningError::database_unavailable(
                "index refresh failed",
            ));
        }
        self.reset_connection_state();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planning_core::{KnnQuery as CoreKnnQuery, SearchRequest};

    #[test]
    fn compiled_search_body_defaults_to_match_all() {
        let request = SearchRequest::default();
        let body = ElasticsearchGateway::compiled_search_body(&request);
        assert_eq!(body["query"], json!({ "match_all": {} }));
    }

    #[test]
    fn compiled_search_body_carries_knn_and_drops_default_query() {
        let request = SearchRequest {
            knn: Some(CoreKnnQuery {
                field: "description_embedding".to_string(),
                vector: vec![0.1, 0.2],
                k: 10,
                num_candidates: 100,
                filter: None,
            }),
            ..SearchRequest::default()
        };
        let body = ElasticsearchGateway::compiled_search_body(&request);
        assert!(body.get("query").is_none());
        assert_eq!(body["knn"]["k"], json!(10));
    }

    #[test]
    fn compiled_search_body_keeps_query_alongside_knn_when_both_given() {
        let request = SearchRequest {
            query: Some(json!({ "match": { "description": "extension" } })),
            knn: Some(CoreKnnQuery {
                field: "description_embedding".to_string(),
                vector: vec![0.1],
                k: 5,
                num_candidates: 50,
                filter: None,
            }),
            ..SearchRequest::default()
        };
        let body = ElasticsearchGateway::compiled_search_body(&request);
        assert!(body.get("query").is_some());
        assert!(body.get("knn").is_some());
    }

    #[test]
    fn parse_search_response_reads_total_and_hits() {
        let json = json!({
            "hits": {
                "total": { "value": 2 },
                "hits": [
                    { "_id": "A", "_score": 1.5, "_source": { "x": 1 } },
                    { "_id": "B", "_score": null, "_source": { "x": 2 } }
                ]
            }
        });
        let response = parse_search_response(json);
        assert_eq!(response.total, 2);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[0].id, "A");
        assert_eq!(response.hits[1].score, None);
    }

    #[test]
    fn knn_body_includes_filter_when_present() {
        let knn = CoreKnnQuery {
            field: "description_embedding".to_string(),
            vector: vec![0.1, 0.2, 0.3],
            k: 10,
            num_candidates: 100,
            filter: Some(json!({ "term": { "authority": "Dover" } })),
        };
        let body = knn_body(&knn);
        assert_eq!(body["filter"]["term"]["authority"], json!("Dover"));
    }
}
