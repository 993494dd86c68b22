//! `GET /monitoring/health` (§6.2): liveness plus a readiness check against
//! Elasticsearch.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{ApiError, Envelope};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/monitoring/health", get(health_check))
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    elasticsearch: bool,
    cluster_status: String,
}

#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    uptime_seconds: u64,
    checks: HealthChecks,
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Envelope<HealthPayload>>, (StatusCode, Json<Envelope<HealthPayload>>)> {
    let uptime_seconds = state.started_at.elapsed().as_secs();

    match state.es.health_check().await {
        Ok(status) if status.index_exists => Ok(Json(Envelope::ok(HealthPayload {
            status: "healthy",
            uptime_seconds,
            checks: HealthChecks { elasticsearch: true, cluster_status: status.cluster_status },
        }))),
        Ok(status) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Envelope {
                success: false,
                data: Some(HealthPayload {
                    status: "degraded",
                    uptime_seconds,
                    checks: HealthChecks { elasticsearch: false, cluster_status: status.cluster_status },
                }),
                error: Some(ApiError {
                    code: "DATABASE_UNAVAILABLE".to_string(),
                    message: "planning index does not exist".to_string(),
                    suggestion: None,
                    retry_after_seconds: None,
                }),
                meta: None,
            }),
        )),
        Err(err) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Envelope { success: false, data: None, error: Some(ApiError::from(&err)), meta: None }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn healthy_cluster_returns_200() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/monitoring/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
