//! AI Orchestrator (§4.6, C6): resolves the feature set for a processing mode,
//! runs each AI capability independently, merges results, and caches them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use planning_cache::CacheManager;
use planning_capabilities::{
    market_intelligence::AnalysisPeriod, DocumentSummarizer, MarketIntelligenceEngine, OpportunityScorer, SummaryLength, SummaryType,
};
use planning_core::{AiFeature, Cache, CacheType, FeatureOutcome, PlanningApplication, ProcessingMode, ProcessingResult, Result};
use planning_embeddings::{ApplicationEmbeddingType, EmbeddingService};
use serde_json::json;
use tracing::{info, warn};

pub struct AiOrchestrator {
    cache: Arc<CacheManager>,
    opportunity: Arc<OpportunityScorer>,
    summarizer: Arc<DocumentSummarizer>,
    embeddings: Arc<EmbeddingService>,
    market: Arc<MarketIntelligenceEngine>,
    max_concurrent: usize,
}

fn feature_name(feature: AiFeature) -> &'static str {
    match feature {
        AiFeature::OpportunityScoring => "opportunity_scoring",
        AiFeature::Summarization => "summarization",
        AiFeature::Embeddings => "embeddings",
        AiFeature::MarketContext => "market_context",
    }
}

impl AiOrchestrator {
    #[must_use]
    pub fn new(
        cache: Arc<CacheManager>,
        opportunity: Arc<OpportunityScorer>,
        summarizer: Arc<DocumentSummarizer>,
        embeddings: Arc<EmbeddingService>,
        market: Arc<MarketIntelligenceEngine>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            cache,
            opportunity,
            summarizer,
            embeddings,
            market,
            max_concurrent,
        }
    }

    fn cache_key(application_id: &str, features: &HashSet<AiFeature>) -> String {
        let mut names: Vec<&str> = features.iter().map(|f| feature_name(*f)).collect();
        names.sort_unstable();
        format!("{application_id}|{}", names.join(","))
    }

    /// `ProcessApplication` (§4.6).
    pub async fn process_application(
        &self,
        app: &PlanningApplication,
        mode: ProcessingMode,
        features: Option<HashSet<AiFeature>>,
        market_context: Option<&str>,
    ) -> Result<ProcessingResult> {
        let features = features.unwrap_or_else(|| mode.default_features());
        let cache_key = Self::cache_key(&app.application_id, &features);

        if let Some(mut cached) = self.cache.get::<ProcessingResult>(CacheType::AiProcessing, &cache_key).await? {
            cached.cached = true;
            return Ok(cached);
        }

        let started = Instant::now();
        let mut results = HashMap::new();
        let mut confidence_scores = HashMap::new();
        let mut errors = Vec::new();
        let warnings = Vec::new();
        let mut features_processed = Vec::new();

        let mut ordered: Vec<AiFeature> = features.iter().copied().collect();
        ordered.sort_by_key(|f| feature_name(*f));

        for feature in ordered {
            match self.run_feature(app, feature, market_context).await {
                Ok(FeatureOutcome { feature, payload, confidence }) => {
                    features_processed.push(feature);
                    confidence_scores.insert(feature_name(feature).to_string(), confidence);
                    results.insert(feature_name(feature).to_string(), payload);
                }
                Err(err) => {
                    warn!(application_id = %app.application_id, feature = feature_name(feature), error = %err, "feature failed, continuing with remaining features");
                    errors.push(format!("{}: {err}", feature_name(feature)));
                }
            }
        }

        let result = ProcessingResult {
            application_id: app.application_id.clone(),
            features_processed,
            results,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            success: errors.is_empty(),
            errors,
            warnings,
            confidence_scores,
            generated_at: chrono::Utc::now(),
            cached: false,
        };

        if result.success {
            let ttl = mode.cache_ttl(&features);
            let level = mode.cache_level();
            if !self.cache.set(CacheType::AiProcessing, &cache_key, &result, ttl, level).await? {
                warn!(application_id = %app.application_id, "ai processing result did not fit in cache");
            }
        }

        Ok(result)
    }

    async fn run_feature(&self, app: &PlanningApplication, feature: AiFeature, market_context: Option<&str>) -> Result<FeatureOutcome> {
        match feature {
            AiFeature::OpportunityScoring => {
                let r = self.opportunity.score(app, market_context).await?;
                Ok(FeatureOutcome {
                    feature,
                    payload: json!({
                        "opportunity_score": r.opportunity_score,
                        "approval_probability": r.approval_probability,
                        "breakdown": r.breakdown,
                        "rationale": r.rationale,
                        "risk_factors": r.risk_factors,
                        "recommendations": r.recommendations,
                    }),
                    confidence: r.confidence_score,
                })
            }
            AiFeature::Summarization => {
                let r = self.summarizer.summarize(app, SummaryType::General, SummaryLength::Medium).await?;
                Ok(FeatureOutcome {
                    feature,
                    payload: json!({
                        "summary": r.summary,
                        "key_points": r.key_points,
                        "sentiment": format!("{:?}", r.sentiment).to_lowercase(),
                        "complexity_score": r.complexity_score,
                        "recommendations": r.recommendations,
                    }),
                    confidence: r.confidence_score,
                })
            }
            AiFeature::Embeddings => {
                let r = self.embeddings.generate_application_embedding(app, ApplicationEmbeddingType::Description).await?;
                Ok(FeatureOutcome {
                    feature,
                    payload: json!({
                        "model_used": r.model_used,
                        "token_count": r.token_count,
                        "text_hash": r.text_hash,
                        "dimensions": r.embedding.len(),
                    }),
                    confidence: r.confidence_score,
                })
            }
            AiFeature::MarketContext => {
                let report = self.market.analyze(std::slice::from_ref(app), AnalysisPeriod::LastQuarter, None).await?;
                Ok(FeatureOutcome {
                    feature,
                    payload: json!({
                        "market_overview": report.market_overview,
                        "opportunities": report.opportunities,
                        "risks": report.risks,
                    }),
                    confidence: report.data_quality_score.max(0.5),
                })
            }
        }
    }

    /// `ProcessBatch` (§4.6): bounded-concurrency fan-out with per-application
    /// failure isolation.
    pub async fn process_batch(&self, apps: &[PlanningApplication], mode: ProcessingMode, features: Option<HashSet<AiFeature>>) -> planning_core::BatchProcessingResult {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(apps.len());

        for app in apps {
            let permit = semaphore.clone();
            let app = app.clone();
            let features = features.clone();
            let this = self;
            handles.push(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                this.process_application(&app, mode, features, None).await
            });
        }

        let outcomes = futures::future::join_all(handles).await;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut per_feature_counts: HashMap<String, usize> = HashMap::new();
        let mut confidences = Vec::new();
        let mut timings = Vec::new();
        let mut results = Vec::new();

        for outcome in outcomes {
            match outcome {
                Ok(result) => {
                    if result.success {
                        succeeded += 1;
                    } else {
                        failed += 1;
                    }
                    for feature in &result.features_processed {
                        *per_feature_counts.entry(feature_name(*feature).to_string()).or_insert(0) += 1;
                    }
                    confidences.push(result.overall_confidence());
                    timings.push(result.processing_time_ms);
                    results.push(result);
                }
                Err(_) => failed += 1,
            }
        }

        timings.sort_unstable();
        let p50 = percentile(&timings, 0.50);
        let p95 = percentile(&timings, 0.95);
        let average_confidence = if confidences.is_empty() { 0.0 } else { confidences.iter().sum::<f64>() / confidences.len() as f64 };

        info!(total = apps.len(), succeeded, failed, "batch processing finished");

        planning_core::BatchProcessingResult {
            total: apps.len(),
            succeeded,
            failed,
            per_feature_counts,
            average_confidence,
            p50_processing_time_ms: p50,
            p95_processing_time_ms: p95,
            results,
        }
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_sorted_and_deterministic() {
        let a: HashSet<AiFeature> = [AiFeature::Summarization, AiFeature::OpportunityScoring].into_iter().collect();
        let b: HashSet<AiFeature> = [AiFeature::OpportunityScoring, AiFeature::Summarization].into_iter().collect();
        assert_eq!(AiOrchestrator::cache_key("APP-1", &a), AiOrchestrator::cache_key("APP-1", &b));
    }

    #[test]
    fn percentile_picks_nearest_rank() {
        let sorted = vec![10, 20, 30, 40, 50];
        assert_eq!(percentile(&sorted, 0.50), 30);
        assert_eq!(percentile(&sorted, 0.0), 10);
    }
}
