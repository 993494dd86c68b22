//! `POST /search`, `POST /search/semantic`, `POST /search/natural-language`,
//! `GET /search/suggestions`, `GET /aggregations` (§6.2, §4.10).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use planning_capabilities::parse_query;
use planning_core::PlanningError;
use planning_search::{SearchFilters, SearchQuery, SearchResults};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult, Envelope};
use crate::state::AppState;

const MAX_K: usize = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/search", post(text_search))
        .route("/search/semantic", post(semantic_search))
        .route("/search/natural-language", post(natural_language_search))
        .route("/search/suggestions", get(suggestions))
        .route("/aggregations", get(aggregations))
}

async fn text_search(State(state): State<AppState>, Json(request): Json<SearchQuery>) -> ApiResult<SearchResults> {
    if request.page_size > 100 {
        return Err(PlanningError::validation("page_size must not exceed 100").into());
    }
    let results = state.search.search(&request).await?;
    Ok(Json(Envelope::ok(results)))
}

#[derive(Debug, Deserialize)]
struct SemanticSearchRequest {
    query: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    filters: SearchFilters,
}

fn default_k() -> usize {
    20
}

/// `SEMANTIC_SEARCH_UNAVAILABLE`: the Embedding Service never fails outright —
/// it degrades to a zero vector with `confidence_score = 0.0` on a provider
/// error or empty input (§4.9) — so unavailability is surfaced here by probing
/// that degrade signal before running the kNN query.
async fn semantic_search(State(state): State<AppState>, Json(request): Json<SemanticSearchRequest>) -> Result<Json<Envelope<SearchResults>>, (StatusCode, Json<Envelope<SearchResults>>)> {
    if request.k > MAX_K {
        let err = PlanningError::validation("k must not exceed 100");
        return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(Envelope { success: false, data: None, error: Some(ApiError::from(&err)), meta: None })));
    }

    let probe = state.embeddings.generate_text_embedding(&request.query).await.map_err(|err| {
        (StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(Envelope { success: false, data: None, error: Some(ApiError::from(&err)), meta: None }))
    })?;

    if probe.confidence_score == 0.0 {
        let error = ApiError {
            code: "SEMANTIC_SEARCH_UNAVAILABLE".to_string(),
            message: "semantic search is temporarily unavailable".to_string(),
            suggestion: Some("retry with POST /search for a text-based search instead".to_string()),
            retry_after_seconds: Some(30),
        };
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(Envelope { success: false, data: None, error: Some(error), meta: None })));
    }

    let results = state.search.semantic_search(&request.query, request.k, &request.filters).await.map_err(|err| {
        (StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(Envelope { success: false, data: None, error: Some(ApiError::from(&err)), meta: None }))
    })?;

    Ok(Json(Envelope::ok(results)))
}

#[derive(Debug, Deserialize)]
struct NaturalLanguageSearchRequest {
    query: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    filters: SearchFilters,
}

async fn natural_language_search(State(state): State<AppState>, Json(request): Json<NaturalLanguageSearchRequest>) -> ApiResult<SearchResults> {
    if request.k > MAX_K {
        return Err(PlanningError::validation("k must not exceed 100").into());
    }
    let results = state.search.natural_language_search(&request.query, request.k, &request.filters).await?;
    Ok(Json(Envelope::ok(results)))
}

#[derive(Debug, Deserialize)]
struct SuggestionsQuery {
    q: String,
}

#[derive(Debug, Serialize)]
struct SuggestionsPayload {
    query_type: String,
    confidence_score: f64,
    suggestions: Vec<String>,
}

async fn suggestions(Query(params): Query<SuggestionsQuery>) -> ApiResult<SuggestionsPayload> {
    let parsed = parse_query(&params.q);
    Ok(Json(Envelope::ok(SuggestionsPayload {
        query_type: parsed.query_type,
        confidence_score: parsed.confidence_score,
        suggestions: parsed.suggestions,
    })))
}

#[derive(Debug, Deserialize, Default)]
struct AggregationsQuery {
    authority: Option<String>,
    status: Option<String>,
}

async fn aggregations(State(state): State<AppState>, Query(params): Query<AggregationsQuery>) -> ApiResult<serde_json::Value> {
    let filters = SearchFilters {
        authorities: params.authority.into_iter().collect(),
        statuses: params.status.into_iter().collect(),
        ..Default::default()
    };
    let has_filters = !filters.authorities.is_empty() || !filters.statuses.is_empty();
    let result = state.search.aggregations(if has_filters { Some(&filters) } else { None }).await?;
    Ok(Json(Envelope::ok(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn text_search_rejects_oversized_page_size() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let body = serde_json::json!({ "query": "extension", "page_size": 500 });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/search").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn semantic_search_is_unavailable_for_fake_embeddings_on_empty_query() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let body = serde_json::json!({ "query": "", "k": 5 });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/search/semantic").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn semantic_search_rejects_k_over_one_hundred() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let body = serde_json::json!({ "query": "extension", "k": 500 });
        let response = router
            .oneshot(Request::builder().method("POST").uri("/search/semantic").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn suggestions_echoes_parser_output() {
        let router = routes().with_state(test_state().await);
        let response = router.oneshot(Request::builder().uri("/search/suggestions?q=approved%20applications").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
