//! Wires the route tree, middleware stack, and shared state into a runnable
//! axum server (§9: application context assembled once at startup).

use std::net::SocketAddr;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware as mw;
use crate::routes;
use crate::state::AppState;

/// 5 MiB: generous for the largest legitimate body (a batch-process request
/// listing a few thousand application ids), small enough to reject abuse.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

pub struct ApiServer {
    bind_addr: SocketAddr,
    router: Router,
}

impl ApiServer {
    #[must_use]
    pub fn new(bind_addr: SocketAddr, state: AppState) -> Self {
        Self { bind_addr, router: build_router(state) }
    }

    /// The router alone, for `tower::util::ServiceExt::oneshot`-based tests
    /// that never bind a socket.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> planning_core::Result<()> {
        self.run_until(std::future::pending()).await
    }

    pub async fn run_until<F>(self, shutdown_signal: F) -> planning_core::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|err| planning_core::PlanningError::internal(format!("failed to bind {}: {err}", self.bind_addr)))?;

        info!(addr = %self.bind_addr, "planning-server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|err| planning_core::PlanningError::internal(format!("server error: {err}")))?;

        info!("planning-server shutdown complete");
        Ok(())
    }
}

/// Layers are applied outermost-first; the last `.layer()` call runs first on
/// the way in and last on the way out.
fn build_router(state: AppState) -> Router {
    let api = routes::api_router(state.clone());

    api.layer(middleware::from_fn_with_state(state.clone(), mw::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(mw::request_id_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_is_reachable_without_a_bound_socket() {
        let state = test_state().await;
        let server = ApiServer::new("127.0.0.1:0".parse().unwrap(), state);
        let router = server.router();

        let response = router
            .oneshot(Request::builder().uri("/monitoring/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_a_404() {
        let state = test_state().await;
        let server = ApiServer::new("127.0.0.1:0".parse().unwrap(), state);
        let router = server.router();

        let response = router
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn request_id_header_is_echoed_back() {
        let state = test_state().await;
        let server = ApiServer::new("127.0.0.1:0".parse().unwrap(), state);
        let router = server.router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/monitoring/health")
                    .header("x-request-id", "test-request-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get("x-request-id").unwrap(), "test-request-id");
    }
}
