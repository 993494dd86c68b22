//! Bulk Embedding Generator (§4.9, C9): a one-shot backfill for multi-million
//! document corpora. Deep-paginates via `search_after`, fans sub-batches of
//! embedding calls out concurrently, and writes ordered bulk ES updates so a
//! vector can never be assigned to the wrong document.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use planning_core::{BulkOp, EsGateway, LlmClient, PlanningApplication, Result};
use planning_embeddings::{compose_text, ApplicationEmbeddingType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

const DEFAULT_ES_BATCH_SIZE: usize = 1000;
const DEFAULT_API_BATCH_SIZE: usize = 500;
const PROVIDER_MAX_BATCH: usize = 2048;
const DEFAULT_CONCURRENT_BATCHES: usize = 5;
const CHECKPOINT_EVERY_ES_BATCHES: u32 = 10;
const EXCLUDED_IDS_CHUNK: usize = 1024;

fn missing_embedding_query(excluded_ids: &[String]) -> JsonValue {
    let mut must_not = vec![json!({ "exists": { "field": "description_embedding" } })];
    for chunk in excluded_ids.chunks(EXCLUDED_IDS_CHUNK) {
        must_not.push(json!({ "terms": { "application_id": chunk } }));
    }
    json!({
        "bool": {
            "must": [{ "exists": { "field": "description" } }],
            "must_not": must_not,
        }
    })
}

fn sort_fields() -> Vec<JsonValue> {
    vec![json!({ "start_date": "desc" }), json!({ "last_changed": "desc" }), json!({ "application_id": "asc" })]
}

fn last_changed_of(app: &PlanningApplication) -> Option<chrono::DateTime<Utc>> {
    app.other_fields.get("last_changed").and_then(JsonValue::as_str).and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn cursor_for(app: &PlanningApplication) -> Vec<JsonValue> {
    vec![json!(app.submission_date.map(|d| d.timestamp())), json!(last_changed_of(app).map(|d| d.timestamp())), json!(app.application_id)]
}

/// Disk checkpoint written every 10 ES batches (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: chrono::DateTime<Utc>,
    pub succeeded: u64,
    pub failed: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub processed_ids_count: usize,
}

/// Final JSON run report (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: chrono::DateTime<Utc>,
    pub finished_at: chrono::DateTime<Utc>,
    pub succeeded: u64,
    pub failed: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub es_batches: u32,
}

pub struct BulkEmbeddingGenerator {
    es: Arc<dyn EsGateway>,
    llm: Arc<dyn LlmClient>,
    model: String,
    es_batch_size: usize,
    api_batch_size: usize,
    concurrent_batches: usize,
    checkpoint_path: Option<PathBuf>,
    report_path: Option<PathBuf>,
}

impl BulkEmbeddingGenerator {
    #[must_use]
    pub fn new(es: Arc<dyn EsGateway>, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            es,
            llm,
            model: model.into(),
            es_batch_size: DEFAULT_ES_BATCH_SIZE,
            api_batch_size: DEFAULT_API_BATCH_SIZE.min(PROVIDER_MAX_BATCH),
            concurrent_batches: DEFAULT_CONCURRENT_BATCHES,
            checkpoint_path: None,
            report_path: None,
        }
    }

    #[must_use]
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    async fn embed_subbatch(&self, apps: &[PlanningApplication]) -> (Vec<BulkOp>, u64, f64, usize) {
        let texts: Vec<String> = apps.iter().map(|app| compose_text(app, ApplicationEmbeddingType::Description)).collect();

        match self.llm.embed(&texts, &self.model).await {
            Ok(batch) => {
                let model = self.model.clone();
                let generated_at = Utc::now().to_rfc3339();
                let ops = apps
                    .iter()
                    .zip(batch.vectors)
                    .map(|(app, vector)| {
                        let dimensions = vector.len();
                        BulkOp::Update {
                            id: app.application_id.clone(),
                            partial_doc: json!({
                                "description_embedding": vector,
                                "embedding_dimensions": dimensions,
                                "embedding_model": model,
                                "embedding_generated_at": generated_at,
                            }),
                        }
                    })
                    .collect();
                (ops, batch.tokens_used, batch.cost_usd, apps.len())
            }
            Err(err) => {
                warn!(error = %err, count = apps.len(), "sub-batch embedding call failed, leaving documents unprocessed");
                (Vec::new(), 0, 0.0, 0)
            }
        }
    }

    async fn write_checkpoint(&self, checkpoint: &Checkpoint) {
        let Some(path) = &self.checkpoint_path else { return };
        match serde_json::to_vec_pretty(checkpoint) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(path, bytes).await {
                    warn!(error = %err, path = %path.display(), "failed to write checkpoint file");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize checkpoint"),
        }
    }

    async fn write_report(&self, report: &RunReport) {
        let Some(path) = &self.report_path else { return };
        match serde_json::to_vec_pretty(report) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(path, bytes).await {
                    warn!(error = %err, path = %path.display(), "failed to write run report");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize run report"),
        }
    }

    /// Runs the full backfill. `resume_processed_ids` is the in-memory processed
    /// set from a prior interrupted run; pass an empty set for a fresh run (§4.9:
    /// the id-exclusion bypass is "only used on resume").
    pub async fn run(&self, resume_processed_ids: HashSet<String>) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut processed_ids = resume_processed_ids;
        let excluded: Vec<String> = processed_ids.iter().cloned().collect();

        let mut cursor = None;
        let mut succeeded = 0u64;
        let mut failed = 0u64;
        let mut total_tokens = 0u64;
        let mut total_cost_usd = 0.0;
        let mut es_batches = 0u32;

        loop {
            let page = self
                .es
                .search_after(missing_embedding_query(&excluded), sort_fields(), self.es_batch_size as u64, cursor.clone())
                .await?;

            if page.hits.is_empty() {
                break;
            }

            let apps: Vec<PlanningApplication> = page
                .hits
                .iter()
                .filter_map(|hit| serde_json::from_value::<PlanningApplication>(hit.source.clone()).ok())
                .filter(|app| !processed_ids.contains(&app.application_id))
                .collect();

            if let Some(last) = apps.last() {
                cursor = Some(cursor_for(last));
            }

            for subbatch in apps.chunks(self.api_batch_size) {
                let groups: Vec<&[PlanningApplication]> = subbatch.chunks(subbatch.len().div_ceil(self.concurrent_batches.max(1)).max(1)).collect();
                let futures = groups.into_iter().map(|group| self.embed_subbatch(group));
                let results = futures::future::join_all(futures).await;

                for (ops, tokens, cost_usd, attempted) in results {
                    total_tokens += tokens;
                    total_cost_usd += cost_usd;
                    if ops.is_empty() {
                        failed += attempted as u64;
                        continue;
                    }
                    let attempted_ids: Vec<String> = ops.iter().map(|op| op.id().to_string()).collect();
                    match self.es.bulk_update(ops, attempted_ids.len().max(1)).await {
                        Ok(bulk_result) => {
                            succeeded += bulk_result.success;
                            failed += bulk_result.failed;
                            let failed_ids: HashSet<&str> = bulk_result.failed_items.iter().map(|f| f.id.as_str()).collect();
                            for id in attempted_ids {
                                if !failed_ids.contains(id.as_str()) {
                                    processed_ids.insert(id);
                                }
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, count = attempted_ids.len(), "bulk update failed; documents remain unprocessed");
                            failed += attempted_ids.len() as u64;
                        }
                    }
                }
            }

            es_batches += 1;
            if es_batches % CHECKPOINT_EVERY_ES_BATCHES == 0 {
                let checkpoint = Checkpoint {
                    timestamp: Utc::now(),
                    succeeded,
                    failed,
                    total_tokens,
                    total_cost_usd,
                    processed_ids_count: processed_ids.len(),
                };
                self.write_checkpoint(&checkpoint).await;
                info!(es_batches, succeeded, failed, "bulk embedding checkpoint written");
            }
        }

        self.es.refresh_index().await?;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failed,
            total_tokens,
            total_cost_usd,
            es_batches,
        };
        self.write_report(&report).await;
        info!(succeeded, failed, es_batches, "bulk embedding run finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_embedding_query_chunks_excluded_ids() {
        let ids: Vec<String> = (0..2500).map(|i| format!("APP-{i}")).collect();
        let query = missing_embedding_query(&ids);
        let must_not = query["bool"]["must_not"].as_array().unwrap();
        // 1 exists-clause + 3 chunks of <=1024 ids each.
        assert_eq!(must_not.len(), 4);
    }

    #[test]
    fn sort_fields_matches_search_after_contract() {
        let sort = sort_fields();
        assert_eq!(sort.len(), 3);
        assert_eq!(sort[2], json!({ "application_id": "asc" }));
    }
}
