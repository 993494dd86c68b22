//! Continuous Embedding Pipeline (§4.8, C8): a scheduled sweeper that finds
//! documents missing a description embedding, buckets them by priority, and
//! embeds them in priority order under a daily cost cap.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use planning_core::{EsGateway, PlanningApplication, PlanningError, Result, SearchRequest};
use planning_embeddings::{ApplicationEmbeddingType, EmbeddingService};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

const MIN_DESCRIPTION_CHARS: usize = 10;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 500;
const DEFAULT_DAILY_COST_LIMIT_USD: f64 = 50.0;
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const BACKOFF_BASE_SECS: u64 = 30;
const BACKOFF_CAP_SECS: u64 = 300;

/// Document urgency bucket (§4.8 step 2), ordered most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EmbeddingPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl EmbeddingPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingPriority::Critical => "critical",
            EmbeddingPriority::High => "high",
            EmbeddingPriority::Normal => "normal",
            EmbeddingPriority::Low => "low",
        }
    }

    /// All buckets, most urgent first — the order the pipeline processes them in.
    #[must_use]
    pub fn all() -> [EmbeddingPriority; 4] {
        [EmbeddingPriority::Critical, EmbeddingPriority::High, EmbeddingPriority::Normal, EmbeddingPriority::Low]
    }
}

/// Buckets a document by `start_date`/`last_changed` age against `now` (§4.8 step 2).
#[must_use]
pub fn classify_priority(start_date: Option<DateTime<Utc>>, last_changed: Option<DateTime<Utc>>, now: DateTime<Utc>) -> EmbeddingPriority {
    let day = chrono::Duration::days(1);
    let week = chrono::Duration::days(7);
    let month = chrono::Duration::days(30);

    if let Some(start) = start_date {
        if start >= now - day {
            return EmbeddingPriority::Critical;
        }
        if start >= now - week {
            return EmbeddingPriority::High;
        }
    }
    if let Some(changed) = last_changed {
        if changed >= now - day {
            return EmbeddingPriority::High;
        }
    }
    match start_date {
        Some(start) if start >= now - month => EmbeddingPriority::Normal,
        _ => EmbeddingPriority::Low,
    }
}

/// Pulls the non-modeled `last_changed` bookkeeping field out of the dynamic
/// `other_fields` bag, falling back to `None` when absent (§9 "dynamic nested
/// documents").
fn last_changed_of(app: &PlanningApplication) -> Option<DateTime<Utc>> {
    app.other_fields.get("last_changed").and_then(JsonValue::as_str).and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

/// ES query matching documents with a present, sufficiently long description but
/// no `description_embedding` (§4.8 step 2).
fn missing_embedding_query() -> JsonValue {
    json!({
        "bool": {
            "must": [
                { "exists": { "field": "description" } },
            ],
            "must_not": [
                { "exists": { "field": "description_embedding" } },
            ],
        }
    })
}

struct DailyCostCounter {
    date: NaiveDate,
    spent_usd: f64,
}

impl DailyCostCounter {
    fn new(now: DateTime<Utc>) -> Self {
        Self { date: now.date_naive(), spent_usd: 0.0 }
    }

    fn record(&mut self, now: DateTime<Utc>, cost_usd: f64) {
        if now.date_naive() != self.date {
            self.date = now.date_naive();
            self.spent_usd = 0.0;
        }
        self.spent_usd += cost_usd;
    }
}

/// Outcome of one scheduled sweep (§4.8).
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub embedded: u64,
    pub failed: u64,
    pub per_priority: Vec<(&'static str, u64)>,
    pub daily_cost_usd: f64,
    pub aborted: bool,
}

pub struct ContinuousEmbeddingPipeline {
    es: Arc<dyn EsGateway>,
    embeddings: Arc<EmbeddingService>,
    batch_size: usize,
    rate_limit_delay: StdDuration,
    daily_cost_limit_usd: f64,
    failure_threshold: u32,
    cost: Mutex<DailyCostCounter>,
    consecutive_failures: Mutex<u32>,
}

impl ContinuousEmbeddingPipeline {
    #[must_use]
    pub fn new(es: Arc<dyn EsGateway>, embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            es,
            embeddings,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_delay: StdDuration::from_millis(DEFAULT_RATE_LIMIT_DELAY_MS),
            daily_cost_limit_usd: DEFAULT_DAILY_COST_LIMIT_USD,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cost: Mutex::new(DailyCostCounter::new(Utc::now())),
            consecutive_failures: Mutex::new(0),
        }
    }

    fn daily_cost_usd(&self) -> f64 {
        self.cost.lock().spent_usd
    }

    fn budget_breached(&self) -> bool {
        self.daily_cost_usd() >= self.daily_cost_limit_usd
    }

    async fn embed_and_write(&self, app: &PlanningApplication, priority: EmbeddingPriority) -> Result<f64> {
        let result = self.embeddings.generate_application_embedding(app, ApplicationEmbeddingType::Description).await?;

        let update = json!({
            "description_embedding": result.embedding,
            "embedding_dimensions": result.embedding.len(),
            "embedding_model": result.model_used,
            "embedding_generated_at": Utc::now().to_rfc3339(),
            "embedding_text_hash": result.text_hash,
            "embedding_confidence": result.confidence_score,
            "embedding_priority": priority.as_str(),
        });
        self.es.update(&app.application_id, update, false).await?;

        Ok(result.cost_usd)
    }

    /// `ProcessDocumentEvent(doc_id, event_type)` (§4.8): event-driven single-document
    /// processing, bypassing the priority query.
    pub async fn process_document_event(&self, doc_id: &str) -> Result<()> {
        let source = self.es.get(doc_id).await?;
        let app: PlanningApplication = serde_json::from_value(source).map_err(|err| PlanningError::internal(format!("stored document is not a valid application: {err}")))?;

        if app.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(PlanningError::validation("description too short to embed"));
        }

        let priority = classify_priority(app.submission_date, last_changed_of(&app), Utc::now());
        self.embed_and_write(&app, priority).await?;
        Ok(())
    }

    async fn fetch_bucket(&self, priority: EmbeddingPriority, limit: usize) -> Result<Vec<PlanningApplication>> {
        let response = self
            .es
            .search(SearchRequest {
                query: Some(missing_embedding_query()),
                size: limit as u64,
                ..Default::default()
            })
            .await?;

        let now = Utc::now();
        Ok(response
            .hits
            .into_iter()
            .filter_map(|hit| serde_json::from_value::<PlanningApplication>(hit.source).ok())
            .filter(|app| app.description.trim().chars().count() >= MIN_DESCRIPTION_CHARS)
            .filter(|app| classify_priority(app.submission_date, last_changed_of(app), now) == priority)
            .collect())
    }

    /// Runs one scheduled sweep (§4.8, steps 1-5).
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let now = Utc::now();
        self.cost.lock().record(now, 0.0); // rolls the day over if needed

        let mut report = CycleReport { daily_cost_usd: self.daily_cost_usd(), ..Default::default() };

        for priority in EmbeddingPriority::all() {
            if self.budget_breached() {
                info!(daily_cost_usd = self.daily_cost_usd(), "daily cost limit reached, stopping cycle");
                report.aborted = true;
                break;
            }

            let batch = match self.fetch_bucket(priority, self.batch_size).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(priority = priority.as_str(), error = %err, "failed to fetch embedding-less documents for bucket");
                    continue;
                }
            };

            let mut bucket_embedded = 0u64;
            for app in &batch {
                match self.embed_and_write(app, priority).await {
                    Ok(cost_usd) => {
                        *self.consecutive_failures.lock() = 0;
                        self.cost.lock().record(Utc::now(), cost_usd);
                        report.embedded += 1;
                        bucket_embedded += 1;
                    }
                    Err(err) => {
                        report.failed += 1;
                        let failures = {
                            let mut guard = self.consecutive_failures.lock();
                            *guard += 1;
                            *guard
                        };
                        error!(application_id = %app.application_id, error = %err, consecutive_failures = failures, "embedding write failed");

                        if failures >= self.failure_threshold {
                            error!(failures, "consecutive failure threshold reached, aborting cycle");
                            report.aborted = true;
                            report.per_priority.push((priority.as_str(), bucket_embedded));
                            report.daily_cost_usd = self.daily_cost_usd();
                            return Ok(report);
                        }

                        let backoff = BACKOFF_BASE_SECS.saturating_mul(1u64 << failures.min(10)).min(BACKOFF_CAP_SECS);
                        tokio::time::sleep(StdDuration::from_secs(backoff)).await;
                    }
                }

                tokio::time::sleep(self.rate_limit_delay).await;

                if self.budget_breached() {
                    report.aborted = true;
                    break;
                }
            }

            report.per_priority.push((priority.as_str(), bucket_embedded));
            if report.aborted {
                break;
            }
        }

        report.daily_cost_usd = self.daily_cost_usd();
        Ok(report)
    }

    /// Runs `run_cycle` on `interval` forever (default 60 minutes, §4.8).
    pub async fn run_scheduler(self: Arc<Self>, interval: StdDuration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(report) => info!(embedded = report.embedded, failed = report.failed, aborted = report.aborted, "continuous embedding cycle finished"),
                Err(err) => error!(error = %err, "continuous embedding cycle failed outright"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn fresh_start_date_is_critical() {
        let now = Utc::now();
        let p = classify_priority(Some(now - ChronoDuration::hours(2)), None, now);
        assert_eq!(p, EmbeddingPriority::Critical);
    }

    #[test]
    fn week_old_start_date_is_high() {
        let now = Utc::now();
        let p = classify_priority(Some(now - ChronoDuration::days(3)), None, now);
        assert_eq!(p, EmbeddingPriority::High);
    }

    #[test]
    fn recently_changed_old_document_is_high() {
        let now = Utc::now();
        let p = classify_priority(Some(now - ChronoDuration::days(60)), Some(now - ChronoDuration::hours(1)), now);
        assert_eq!(p, EmbeddingPriority::High);
    }

    #[test]
    fn month_old_start_date_is_normal() {
        let now = Utc::now();
        let p = classify_priority(Some(now - ChronoDuration::days(20)), None, now);
        assert_eq!(p, EmbeddingPriority::Normal);
    }

    #[test]
    fn very_old_start_date_is_low() {
        let now = Utc::now();
        let p = classify_priority(Some(now - ChronoDuration::days(90)), None, now);
        assert_eq!(p, EmbeddingPriority::Low);
    }

    #[test]
    fn missing_start_date_defaults_to_low() {
        let now = Utc::now();
        assert_eq!(classify_priority(None, None, now), EmbeddingPriority::Low);
    }

    #[test]
    fn daily_cost_counter_rolls_over_on_new_day() {
        let day1 = Utc::now();
        let mut counter = DailyCostCounter::new(day1);
        counter.record(day1, 10.0);
        assert_eq!(counter.spent_usd, 10.0);

        let day2 = day1 + ChronoDuration::days(1);
        counter.record(day2, 5.0);
        assert_eq!(counter.spent_usd, 5.0);
    }
}
