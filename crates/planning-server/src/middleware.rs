//! Request-id propagation and metrics recording, applied around every route.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::state::AppState;

/// Extension type carrying the per-request id into handlers/logs.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Extracts `x-request-id` from the incoming request or generates one, and
/// echoes it back on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Records request count and latency under `http_requests_total` /
/// `http_request_duration_seconds`, labeled by method/path/status (§4 C: "ES
/// request latency/error rate, LLM token/cost totals, cache hit rate" — this
/// is the HTTP-layer half of that observability surface).
pub async fn metrics_middleware(State(_state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let elapsed = started.elapsed().as_secs_f64();

    metrics::counter!("http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    metrics::histogram!("http_request_duration_seconds", "method" => method, "path" => path).record(elapsed);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_extension_is_cloneable() {
        let id = RequestId("abc-123".to_string());
        let cloned = id.clone();
        assert_eq!(id.0, cloned.0);
    }
}
