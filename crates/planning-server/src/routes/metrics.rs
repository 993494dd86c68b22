//! `GET /monitoring/metrics` (§6.2): renders the process's Prometheus text
//! exposition format directly, bypassing the JSON envelope (scrapers expect
//! the raw format).

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/monitoring/metrics", get(render_metrics))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics_handle.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn metrics_endpoint_returns_200() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/monitoring/metrics").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
