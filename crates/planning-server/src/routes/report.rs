//! `GET /report/{application_id}` (§6.2): a composite view combining the
//! application record, AI processing results, opportunistic enrichment, and
//! comparable applications in one round trip.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use planning_capabilities::ExtractionResult;
use planning_core::{AiFeature, KnnQuery, PlanningApplication, PlanningError, ProcessingMode, ProcessingResult, SearchHit};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::{ApiResult, Envelope};
use crate::state::AppState;

const COMPARABLES_K: usize = 5;

pub fn routes() -> Router<AppState> {
    Router::new().route("/report/:application_id", get(application_report))
}

#[derive(Debug, Deserialize, Default)]
struct ReportQuery {
    #[serde(default)]
    market_context: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApplicationReport {
    application: PlanningApplication,
    insights: ProcessingResult,
    enrichment: Option<ExtractionResult>,
    comparables: Vec<SearchHit>,
}

/// Composites an application detail view out of the Search Service, the AI
/// Orchestrator, and (best-effort) the Enricher: enrichment only runs when
/// `other_fields["source_url"]` points at a known portal, and its failure
/// never fails the report — it is supplementary context, not the subject.
async fn application_report(State(state): State<AppState>, Path(application_id): Path<String>, Query(params): Query<ReportQuery>) -> ApiResult<ApplicationReport> {
    let doc = state.es.get(&application_id).await?;
    let application: PlanningApplication = serde_json::from_value(doc).map_err(|err| PlanningError::internal(format!("stored application '{application_id}' failed to deserialize: {err}")))?;

    let features: HashSet<AiFeature> = [AiFeature::OpportunityScoring, AiFeature::Summarization].into_iter().collect();
    let insights = state.orchestrator.process_application(&application, ProcessingMode::Standard, Some(features), params.market_context.as_deref()).await?;

    let enrichment = match application.other_fields.get("source_url").and_then(|v| v.as_str()) {
        Some(url) => match state.enricher.enrich(url).await {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(application_id = %application_id, %url, error = %err, "report enrichment failed, continuing without it");
                None
            }
        },
        None => None,
    };

    let comparables = match application.description_embedding.clone() {
        Some(vector) => {
            let knn = KnnQuery {
                field: "description_embedding".to_string(),
                vector,
                k: COMPARABLES_K,
                num_candidates: 10 * COMPARABLES_K,
                filter: Some(json!({ "bool": { "must_not": [{ "term": { "application_id": application_id } }] } })),
            };
            state.es.knn_search(knn).await?.hits
        }
        None => Vec::new(),
    };

    Ok(Json(Envelope::ok(ApplicationReport { application, insights, enrichment, comparables })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use planning_test_utils::sample_application;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn missing_application_is_404() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/report/missing").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn report_without_source_url_skips_enrichment() {
        let state = test_state().await;
        let app = sample_application("APP-1");
        state.es.index(&app.application_id, serde_json::to_value(&app).unwrap(), false).await.unwrap();

        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/report/APP-1").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(envelope["data"]["enrichment"].is_null());
    }
}
