//! Shared application state (§9: "constructor-injected dependencies through a
//! small application context, not process-wide singletons").

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use planning_cache::CacheManager;
use planning_capabilities::{DocumentSummarizer, Enricher, MarketIntelligenceEngine, OpportunityScorer};
use planning_core::{AppConfig, EsGateway, LlmClient};
use planning_embeddings::EmbeddingService;
use planning_orchestrator::{AiOrchestrator, BackgroundProcessor};
use planning_search::{LocationStatsService, SearchService};

/// Everything a handler needs, cloned cheaply (every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub es: Arc<dyn EsGateway>,
    pub llm: Arc<dyn LlmClient>,
    pub cache: Arc<CacheManager>,
    pub embeddings: Arc<EmbeddingService>,
    pub search: Arc<SearchService>,
    pub location_stats: Arc<LocationStatsService>,
    pub opportunity: Arc<OpportunityScorer>,
    pub summarizer: Arc<DocumentSummarizer>,
    pub market: Arc<MarketIntelligenceEngine>,
    pub enricher: Arc<Enricher>,
    pub orchestrator: Arc<AiOrchestrator>,
    pub background: Arc<BackgroundProcessor>,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
}
