//! The §9 construction order: load configuration, connect to Elasticsearch,
//! start the Cache Manager, build the LLM client and every capability built on
//! top of it, spin up the AI Orchestrator and Background Processor workers,
//! and start the Continuous Embedding Pipeline scheduler. Teardown is simply
//! dropping the returned [`AppState`] — every background task holds only a
//! weak reference's worth of work via `Arc`, so nothing leaks when the last
//! handle goes away except the tasks themselves, which are cancelled when the
//! process exits.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;
use planning_cache::CacheManager;
use planning_capabilities::{DocumentSummarizer, Enricher, MarketIntelligenceEngine, OpportunityScorer};
use planning_core::{AppConfig, EsGateway, LlmClient, PlanningError, Result};
use planning_elasticsearch::ElasticsearchGateway;
use planning_embeddings::EmbeddingService;
use planning_llm::PlanningLlmClient;
use planning_orchestrator::{AiOrchestrator, BackgroundProcessor};
use planning_pipeline::ContinuousEmbeddingPipeline;
use planning_search::{LocationStatsService, SearchService};

use crate::state::AppState;

const LLM_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const MAX_CONCURRENT_AI_JOBS: usize = 8;
const PIPELINE_SCHEDULE_INTERVAL: StdDuration = StdDuration::from_secs(60 * 15);

/// Builds the full dependency graph from a loaded [`AppConfig`] and starts
/// every long-running background task. Returns the [`AppState`] handlers hang
/// off of.
pub async fn build_state(config: AppConfig) -> Result<AppState> {
    let config = Arc::new(config);

    let es: Arc<dyn EsGateway> = Arc::new(
        ElasticsearchGateway::connect(
            &config.es.url,
            &config.es.index_name,
            config.es.username.as_deref(),
            config.es.password.as_deref(),
            config.es.request_timeout,
            planning_core::DEFAULT_EMBEDDING_DIMENSIONS,
        )
        .await?,
    );

    let cache = Arc::new(CacheManager::new(config.cache.max_bytes, config.cache.compression_threshold_bytes));
    tokio::spawn(Arc::clone(&cache).run_sweeper(config.cache.sweep_interval));

    // `PlanningLlmClient`'s own budget gate counts tokens, not dollars, and the
    // two units aren't convertible without picking an arbitrary price; the
    // dollar-denominated `daily_budget_usd` instead governs the Continuous
    // Embedding Pipeline's cost cap, so no token budget is set here.
    let llm: Arc<dyn LlmClient> = Arc::new(PlanningLlmClient::new(config.llm.anthropic_api_key.clone(), config.llm.openai_api_key.clone(), None));

    let embeddings = Arc::new(EmbeddingService::new(Arc::clone(&llm), config.llm.embedding_model.clone()));
    let search = Arc::new(SearchService::new(Arc::clone(&es), Arc::clone(&embeddings)));
    let location_stats = Arc::new(LocationStatsService::new(Arc::clone(&es), Arc::clone(&cache)));
    let opportunity = Arc::new(OpportunityScorer::new(Arc::clone(&llm), config.llm.completion_model.clone(), LLM_TIMEOUT));
    let summarizer = Arc::new(DocumentSummarizer::new(Arc::clone(&llm), config.llm.completion_model.clone()));
    let market = Arc::new(MarketIntelligenceEngine::new(Arc::clone(&llm), config.llm.completion_model.clone()));
    let enricher = Arc::new(Enricher::new(Arc::clone(&llm), config.llm.completion_model.clone()));

    let orchestrator = Arc::new(AiOrchestrator::new(
        Arc::clone(&cache),
        Arc::clone(&opportunity),
        Arc::clone(&summarizer),
        Arc::clone(&embeddings),
        Arc::clone(&market),
        MAX_CONCURRENT_AI_JOBS,
    ));

    let background = Arc::new(BackgroundProcessor::new(Arc::clone(&orchestrator), Arc::clone(&es)));
    background.spawn_workers(config.workers.worker_count);
    tokio::spawn(Arc::clone(&background).run_cleanup_sweeper(config.cache.sweep_interval));

    let pipeline = Arc::new(ContinuousEmbeddingPipeline::new(Arc::clone(&es), Arc::clone(&embeddings)));
    tokio::spawn(Arc::clone(&pipeline).run_scheduler(PIPELINE_SCHEDULE_INTERVAL));

    let recorder_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| PlanningError::internal(format!("failed to install metrics recorder: {err}")))?;

    Ok(AppState {
        config,
        es,
        llm,
        cache,
        embeddings,
        search,
        location_stats,
        opportunity,
        summarizer,
        market,
        enricher,
        orchestrator,
        background,
        metrics_handle: recorder_handle,
        started_at: Instant::now(),
    })
}

/// Builds an [`AppState`] wired to in-memory fakes, for router-level tests
/// that need a real `AppState` without any network I/O.
#[cfg(test)]
pub async fn test_state() -> AppState {
    use std::time::Duration as StdDuration2;

    use planning_cache::CacheManager;
    use planning_core::config::{CacheConfig, EsConfig, LlmConfig, WorkerConfig};
    use planning_test_utils::{FakeEsGateway, FakeLlmClient};

    let config = Arc::new(AppConfig {
        bind_address: "127.0.0.1:0".to_string(),
        es: EsConfig {
            url: "http://fake-es.invalid".to_string(),
            index_name: "planning_applications_test".to_string(),
            username: None,
            password: None,
            request_timeout: StdDuration2::from_secs(5),
        },
        llm: LlmConfig {
            anthropic_api_key: None,
            openai_api_key: Some("test-key".to_string()),
            completion_model: "test-completion-model".to_string(),
            embedding_model: "test-embedding-model".to_string(),
            daily_budget_usd: 50.0,
        },
        cache: CacheConfig {
            max_bytes: 64 * 1024 * 1024,
            compression_threshold_bytes: 8 * 1024,
            sweep_interval: StdDuration2::from_secs(60),
        },
        workers: WorkerConfig { worker_count: 2, max_retries: 3 },
    });

    let es: Arc<dyn EsGateway> = Arc::new(FakeEsGateway::new());
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient::new(planning_core::DEFAULT_EMBEDDING_DIMENSIONS));
    let cache = Arc::new(CacheManager::new(64 * 1024 * 1024, 8 * 1024));

    let embeddings = Arc::new(EmbeddingService::new(Arc::clone(&llm), "test-embedding-model"));
    let search = Arc::new(SearchService::new(Arc::clone(&es), Arc::clone(&embeddings)));
    let location_stats = Arc::new(LocationStatsService::new(Arc::clone(&es), Arc::clone(&cache)));
    let opportunity = Arc::new(OpportunityScorer::new(Arc::clone(&llm), "test-completion-model", LLM_TIMEOUT));
    let summarizer = Arc::new(DocumentSummarizer::new(Arc::clone(&llm), "test-completion-model"));
    let market = Arc::new(MarketIntelligenceEngine::new(Arc::clone(&llm), "test-completion-model"));
    let enricher = Arc::new(Enricher::new(Arc::clone(&llm), "test-completion-model"));

    let orchestrator = Arc::new(AiOrchestrator::new(
        Arc::clone(&cache),
        Arc::clone(&opportunity),
        Arc::clone(&summarizer),
        Arc::clone(&embeddings),
        Arc::clone(&market),
        MAX_CONCURRENT_AI_JOBS,
    ));
    let background = Arc::new(BackgroundProcessor::new(Arc::clone(&orchestrator), Arc::clone(&es)));

    // `build_recorder` rather than `install_recorder`: tests may build many
    // `AppState`s in one process and a second global install would panic.
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

    AppState {
        config,
        es,
        llm,
        cache,
        embeddings,
        search,
        location_stats,
        opportunity,
        summarizer,
        market,
        enricher,
        orchestrator,
        background,
        metrics_handle,
        started_at: Instant::now(),
    }
}
