//! `GET /applications`, `GET /applications/{id}`, and the per-application
//! sub-resources (§6.2).

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use planning_core::{Consultation, Document, KnnQuery, PlanningApplication, PlanningError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiResult, Envelope};
use crate::state::AppState;

const DEFAULT_SIMILAR_K: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/applications", get(list_applications))
        .route("/applications/:id", get(get_application))
        .route("/applications/:id/similar", get(similar_applications))
        .route("/applications/:id/history", get(application_history))
        .route("/applications/:id/documents", get(application_documents))
        .route("/applications/:id/consultations", get(application_consultations))
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    authority: Option<String>,
    status: Option<String>,
    development_type: Option<String>,
    #[serde(default = "default_page")]
    page: u64,
    #[serde(default = "default_page_size")]
    page_size: u64,
}

fn default_page() -> u64 {
    1
}
fn default_page_size() -> u64 {
    20
}

async fn list_applications(State(state): State<AppState>, Query(params): Query<ListQuery>) -> ApiResult<planning_search::SearchResults> {
    if params.page_size > 100 {
        return Err(PlanningError::validation("page_size must not exceed 100").into());
    }

    let filters = planning_search::SearchFilters {
        authorities: params.authority.into_iter().collect(),
        statuses: params.status.into_iter().collect(),
        development_types: params.development_type.into_iter().collect(),
        ..Default::default()
    };
    let query = planning_search::SearchQuery { filters, page: params.page, page_size: params.page_size, ..Default::default() };

    let results = state.search.search(&query).await?;
    Ok(Json(Envelope::ok(results)))
}

async fn load_application(state: &AppState, id: &str) -> planning_core::Result<PlanningApplication> {
    let doc = state.es.get(id).await?;
    serde_json::from_value(doc).map_err(|err| PlanningError::internal(format!("stored application '{id}' failed to deserialize: {err}")))
}

async fn get_application(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PlanningApplication> {
    let app = load_application(&state, &id).await?;
    Ok(Json(Envelope::ok(app)))
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    #[serde(default = "default_similar_k")]
    k: usize,
}

fn default_similar_k() -> usize {
    DEFAULT_SIMILAR_K
}

async fn similar_applications(State(state): State<AppState>, Path(id): Path<String>, Query(params): Query<SimilarQuery>) -> ApiResult<planning_search::SearchResults> {
    let app = load_application(&state, &id).await?;

    let vector = match app.description_embedding.clone() {
        Some(v) => v,
        None => state.embeddings.generate_text_embedding(&app.description).await?.embedding,
    };

    let knn = KnnQuery {
        field: "description_embedding".to_string(),
        vector,
        k: params.k.min(100).max(1),
        num_candidates: (10 * params.k).max(100),
        filter: Some(json!({ "bool": { "must_not": [{ "term": { "application_id": id } }] } })),
    };

    let response = state.es.knn_search(knn).await?;
    Ok(Json(Envelope::ok(planning_search::SearchResults::from(response))))
}

#[derive(Debug, Serialize)]
struct TimelineEvent {
    label: &'static str,
    occurred_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct HistoryPayload {
    application_id: String,
    status: planning_core::ApplicationStatus,
    decision: Option<planning_core::Decision>,
    events: Vec<TimelineEvent>,
}

/// Synthesizes a timeline from the application's own date fields: there is no
/// separate history/audit-log record, so the dates already on the document
/// are the only signal available (submission through decision/appeal).
async fn application_history(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<HistoryPayload> {
    let app = load_application(&state, &id).await?;

    let mut events = Vec::new();
    let mut push = |label: &'static str, when: Option<chrono::DateTime<chrono::Utc>>| {
        if let Some(occurred_at) = when {
            events.push(TimelineEvent { label, occurred_at });
        }
    };
    push("submitted", app.submission_date);
    push("validated", app.validation_date);
    push("consultation_started", app.consultation_start_date);
    push("consultation_ended", app.consultation_end_date);
    push("target_decision", app.target_decision_date);
    push("decided", app.decision_date.or(app.decided_date));
    push("appealed", app.appeal_date);
    events.sort_by_key(|event| event.occurred_at);

    Ok(Json(Envelope::ok(HistoryPayload { application_id: app.application_id, status: app.status, decision: app.decision, events })))
}

async fn application_documents(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Document>> {
    let app = load_application(&state, &id).await?;
    Ok(Json(Envelope::ok(app.documents)))
}

async fn application_consultations(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Consultation>> {
    let app = load_application(&state, &id).await?;
    Ok(Json(Envelope::ok(app.consultations)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use planning_test_utils::{sample_application, ApplicationFixtureExt};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn get_missing_application_is_404() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/applications/missing").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_returns_sorted_events_from_date_fields() {
        let state = test_state().await;
        let app = sample_application("APP-1").with_submission_date(chrono::Utc::now() - chrono::Duration::days(30));
        state.es.index(&app.application_id, serde_json::to_value(&app).unwrap(), false).await.unwrap();

        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/applications/APP-1/history").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
