//! Nests every endpoint group under a single router (§6.2's canonical HTTP surface).

pub mod ai;
pub mod applications;
pub mod health;
pub mod metrics;
pub mod report;
pub mod search;
pub mod stats;

use axum::Router;

use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(metrics::routes())
        .merge(search::routes())
        .merge(applications::routes())
        .merge(ai::routes())
        .merge(report::routes())
        .merge(stats::routes())
        .with_state(state)
}
