//! The AI capability surface (§6.2, §4.5-§4.7): single-application scoring and
//! summarization, market insights, batch scoring, and the Background
//! Processor's task lifecycle.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use planning_capabilities::market_intelligence::{AnalysisPeriod, MarketIntelligenceReport};
use planning_capabilities::opportunity::OpportunityResult;
use planning_capabilities::summarizer::{SummaryLength, SummaryResult, SummaryType};
use planning_core::{AiFeature, BackgroundTask, Cache, PlanningApplication, PlanningError, ProcessingMode, TaskPriority};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, Envelope};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ai/opportunity-score", post(opportunity_score))
        .route("/ai/summarize", post(summarize))
        .route("/ai/insights", get(insights))
        .route("/ai/batch-score", post(batch_score))
        .route("/ai/batch-process", post(batch_process))
        .route("/ai/tasks/:id", get(get_task))
        .route("/ai/tasks/:id", delete(cancel_task))
        .route("/ai/tasks/:id/result", get(task_result))
        .route("/ai/service-status", get(service_status))
}

async fn load_application(state: &AppState, id: &str) -> planning_core::Result<PlanningApplication> {
    let doc = state.es.get(id).await?;
    serde_json::from_value(doc).map_err(|err| PlanningError::internal(format!("stored application '{id}' failed to deserialize: {err}")))
}

#[derive(Debug, Deserialize)]
struct ApplicationIdRequest {
    application_id: String,
    #[serde(default)]
    market_context: Option<String>,
}

async fn opportunity_score(State(state): State<AppState>, Json(request): Json<ApplicationIdRequest>) -> ApiResult<OpportunityResult> {
    let app = load_application(&state, &request.application_id).await?;
    let result = state.opportunity.score(&app, request.market_context.as_deref()).await?;
    Ok(Json(Envelope::ok(result)))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    application_id: String,
    #[serde(default)]
    summary_type: SummaryTypeDto,
    #[serde(default)]
    summary_length: SummaryLengthDto,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SummaryTypeDto {
    #[default]
    General,
    Risks,
    Opportunities,
    Technical,
    Compliance,
}

impl From<SummaryTypeDto> for SummaryType {
    fn from(dto: SummaryTypeDto) -> Self {
        match dto {
            SummaryTypeDto::General => SummaryType::General,
            SummaryTypeDto::Risks => SummaryType::Risks,
            SummaryTypeDto::Opportunities => SummaryType::Opportunities,
            SummaryTypeDto::Technical => SummaryType::Technical,
            SummaryTypeDto::Compliance => SummaryType::Compliance,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SummaryLengthDto {
    Short,
    #[default]
    Medium,
    Long,
}

impl From<SummaryLengthDto> for SummaryLength {
    fn from(dto: SummaryLengthDto) -> Self {
        match dto {
            SummaryLengthDto::Short => SummaryLength::Short,
            SummaryLengthDto::Medium => SummaryLength::Medium,
            SummaryLengthDto::Long => SummaryLength::Long,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryPayload {
    summary: String,
    key_points: Vec<String>,
    sentiment: String,
    complexity_score: f64,
    recommendations: Vec<String>,
    confidence_score: f64,
}

impl From<SummaryResult> for SummaryPayload {
    fn from(r: SummaryResult) -> Self {
        Self {
            summary: r.summary,
            key_points: r.key_points,
            sentiment: format!("{:?}", r.sentiment).to_lowercase(),
            complexity_score: r.complexity_score,
            recommendations: r.recommendations,
            confidence_score: r.confidence_score,
        }
    }
}

async fn summarize(State(state): State<AppState>, Json(request): Json<SummarizeRequest>) -> ApiResult<SummaryPayload> {
    let app = load_application(&state, &request.application_id).await?;
    let result = state.summarizer.summarize(&app, request.summary_type.into(), request.summary_length.into()).await?;
    Ok(Json(Envelope::ok(SummaryPayload::from(result))))
}

#[derive(Debug, Deserialize)]
struct InsightsQuery {
    authority: Option<String>,
    #[serde(default = "default_period")]
    period: PeriodDto,
}

fn default_period() -> PeriodDto {
    PeriodDto::LastQuarter
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PeriodDto {
    LastMonth,
    LastQuarter,
    LastYear,
    Last2Years,
}

impl From<PeriodDto> for AnalysisPeriod {
    fn from(dto: PeriodDto) -> Self {
        match dto {
            PeriodDto::LastMonth => AnalysisPeriod::LastMonth,
            PeriodDto::LastQuarter => AnalysisPeriod::LastQuarter,
            PeriodDto::LastYear => AnalysisPeriod::LastYear,
            PeriodDto::Last2Years => AnalysisPeriod::Last2Years,
        }
    }
}

const INSIGHTS_SAMPLE_SIZE: u64 = 200;

async fn insights(State(state): State<AppState>, Query(params): Query<InsightsQuery>) -> ApiResult<MarketIntelligenceReport> {
    let filters = planning_search::SearchFilters { authorities: params.authority.into_iter().collect(), ..Default::default() };
    let query = planning_search::SearchQuery { filters: filters.clone(), page_size: INSIGHTS_SAMPLE_SIZE, ..Default::default() };
    let results = state.search.search(&query).await?;

    let applications: Vec<PlanningApplication> = results
        .hits
        .into_iter()
        .filter_map(|hit| serde_json::from_value(hit.source).ok())
        .collect();

    let report = state.market.analyze(&applications, params.period.into(), filters.authorities.first().map(String::as_str)).await?;
    Ok(Json(Envelope::ok(report)))
}

#[derive(Debug, Deserialize)]
struct BatchScoreRequest {
    application_ids: Vec<String>,
}

async fn batch_score(State(state): State<AppState>, Json(request): Json<BatchScoreRequest>) -> ApiResult<planning_core::BatchProcessingResult> {
    let mut applications = Vec::with_capacity(request.application_ids.len());
    for id in &request.application_ids {
        applications.push(load_application(&state, id).await?);
    }

    let features: HashSet<AiFeature> = [AiFeature::OpportunityScoring].into_iter().collect();
    let result = state.orchestrator.process_batch(&applications, ProcessingMode::Fast, Some(features)).await;
    Ok(Json(Envelope::ok(result)))
}

#[derive(Debug, Deserialize)]
struct BatchProcessRequest {
    application_ids: Vec<String>,
    #[serde(default = "default_mode")]
    processing_mode: ModeDto,
    #[serde(default)]
    priority: PriorityDto,
    #[serde(default)]
    callback_url: Option<String>,
}

fn default_mode() -> ModeDto {
    ModeDto::Standard
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeDto {
    Fast,
    Standard,
    Comprehensive,
    Batch,
}

impl From<ModeDto> for ProcessingMode {
    fn from(dto: ModeDto) -> Self {
        match dto {
            ModeDto::Fast => ProcessingMode::Fast,
            ModeDto::Standard => ProcessingMode::Standard,
            ModeDto::Comprehensive => ProcessingMode::Comprehensive,
            ModeDto::Batch => ProcessingMode::Batch,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PriorityDto {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl From<PriorityDto> for TaskPriority {
    fn from(dto: PriorityDto) -> Self {
        match dto {
            PriorityDto::Urgent => TaskPriority::Urgent,
            PriorityDto::High => TaskPriority::High,
            PriorityDto::Normal => TaskPriority::Normal,
            PriorityDto::Low => TaskPriority::Low,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmittedTask {
    task_id: Uuid,
}

async fn batch_process(State(state): State<AppState>, Json(request): Json<BatchProcessRequest>) -> ApiResult<SubmittedTask> {
    if request.application_ids.is_empty() {
        return Err(PlanningError::validation("application_ids must not be empty").into());
    }

    let mode: ProcessingMode = request.processing_mode.into();
    let task = BackgroundTask::new("ai_processing", request.priority.into(), request.application_ids, mode, mode.default_features(), request.callback_url);
    let task_id = state.background.submit(task);
    Ok(Json(Envelope::ok(SubmittedTask { task_id })))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<BackgroundTask> {
    let task = state.background.get_task(id).ok_or_else(|| PlanningError::not_found(format!("no background task with id '{id}'")))?;
    Ok(Json(Envelope::ok(task)))
}

async fn task_result(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    let task = state.background.get_task(id).ok_or_else(|| PlanningError::not_found(format!("no background task with id '{id}'")))?;
    let result = task.result.ok_or_else(|| PlanningError::validation(format!("task '{id}' has not completed (status: {:?})", task.status)))?;
    Ok(Json(Envelope::ok(result)))
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Envelope<()>>, (StatusCode, Json<Envelope<()>>)> {
    if state.background.get_task(id).is_none() {
        let err = PlanningError::not_found(format!("no background task with id '{id}'"));
        return Err((StatusCode::NOT_FOUND, Json(Envelope { success: false, data: None, error: Some(ApiError::from(&err)), meta: None })));
    }

    if state.background.cancel(id) {
        Ok(Json(Envelope::ok(())))
    } else {
        let err = PlanningError::validation(format!("task '{id}' is already in a terminal state"));
        Err((StatusCode::CONFLICT, Json(Envelope { success: false, data: None, error: Some(ApiError::from(&err)), meta: None })))
    }
}

#[derive(Debug, Serialize)]
struct ServiceStatus {
    cache: planning_core::CacheStats,
    llm_usage: planning_core::UsageStats,
    uptime_seconds: u64,
}

async fn service_status(State(state): State<AppState>) -> ApiResult<ServiceStatus> {
    Ok(Json(Envelope::ok(ServiceStatus {
        cache: state.cache.stats(),
        llm_usage: state.llm.usage_stats(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use planning_test_utils::sample_application;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn opportunity_score_for_missing_application_is_404() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let body = serde_json::json!({ "application_id": "missing" });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/ai/opportunity-score").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_process_rejects_empty_application_ids() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let body = serde_json::json!({ "application_ids": [] });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/ai/batch-process").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn submitted_task_is_retrievable_by_id() {
        let state = test_state().await;
        let app = sample_application("APP-1");
        state.es.index(&app.application_id, serde_json::to_value(&app).unwrap(), false).await.unwrap();

        let router = routes().with_state(state);
        let body = serde_json::json!({ "application_ids": ["APP-1"] });
        let response = router
            .clone()
            .oneshot(Request::builder().method("POST").uri("/ai/batch-process").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        let task_id = envelope["data"]["task_id"].as_str().unwrap();

        let response = router.oneshot(Request::builder().uri(format!("/ai/tasks/{task_id}")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
