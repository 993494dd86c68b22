//! `GET /stats/locations/{slug}`, `GET /stats/trends/{type}` (§4.10, §6.2).

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use planning_core::PlanningError;
use planning_search::trends::{Overview, TrendsDashboard, TrendsType};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::error::Envelope;
use crate::state::AppState;

const DEFAULT_RADIUS_KM: f64 = 5.0;
const DEFAULT_TRENDS_MONTHS: i64 = 12;
const LEAGUE_TABLE_TOP_N: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new().route("/stats/locations/:slug", get(location_stats)).route("/stats/trends/:trends_type", get(trends))
}

#[derive(Debug, Deserialize, Default)]
struct LocationStatsQuery {
    radius_km: Option<f64>,
    date_from: Option<String>,
    date_to: Option<String>,
}

async fn location_stats(State(state): State<AppState>, Path(slug): Path<String>, Query(params): Query<LocationStatsQuery>) -> ApiResult<TrendsDashboard> {
    let radius_km = params.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    let dashboard = state.location_stats.location_stats(&slug, radius_km, params.date_from.as_deref(), params.date_to.as_deref()).await?;
    Ok(Json(Envelope::ok(dashboard)))
}

fn parse_trends_type(raw: &str) -> planning_core::Result<TrendsType> {
    match raw {
        "authorities" => Ok(TrendsType::Authorities),
        "regions" => Ok(TrendsType::Regions),
        "sectors" => Ok(TrendsType::Sectors),
        "agents" => Ok(TrendsType::Agents),
        other => Err(PlanningError::validation(format!("unknown trends type '{other}' (expected authorities, regions, sectors, or agents)"))),
    }
}

#[derive(Debug, Deserialize, Default)]
struct TrendsQuery {
    months: Option<i64>,
}

/// Builds current/previous period `range` queries over `submission_date`
/// spanning `months` months each, then derives an [`Overview`] from the
/// returned monthly buckets and league table the same way
/// [`planning_search::location::LocationStatsService::location_stats`] does,
/// since `SearchService::trends_dashboard` only returns the two series.
async fn trends(State(state): State<AppState>, Path(trends_type): Path<String>, Query(params): Query<TrendsQuery>) -> ApiResult<TrendsDashboard> {
    let trends_type = parse_trends_type(&trends_type)?;
    let months = params.months.unwrap_or(DEFAULT_TRENDS_MONTHS).clamp(1, 36);

    let now = chrono::Utc::now();
    let current_start = now - chrono::Duration::days(30 * months);
    let previous_start = current_start - chrono::Duration::days(30 * months);

    let current_period_query = json!({ "range": { "submission_date": { "gte": current_start.to_rfc3339(), "lte": now.to_rfc3339() } } });
    let previous_period_query = json!({ "range": { "submission_date": { "gte": previous_start.to_rfc3339(), "lte": current_start.to_rfc3339() } } });

    let (monthly_trend, league_table) = state.search.trends_dashboard(trends_type, current_period_query, previous_period_query, LEAGUE_TABLE_TOP_N).await?;

    let approved_total: u64 = monthly_trend.iter().map(|bucket| bucket.approved).sum();
    let rejected_total: u64 = monthly_trend.iter().map(|bucket| bucket.rejected).sum();
    let pending_total: u64 = monthly_trend.iter().map(|bucket| bucket.pending).sum();
    let decided_total = approved_total + rejected_total;

    let average_decision_days = if league_table.is_empty() {
        0.0
    } else {
        league_table.iter().map(|entry| entry.average_decision_days).sum::<f64>() / league_table.len() as f64
    };

    let dashboard = TrendsDashboard {
        overview: Overview {
            total_applications: approved_total + rejected_total + pending_total,
            approval_rate: if decided_total == 0 { 0.0 } else { approved_total as f64 / decided_total as f64 },
            average_decision_days,
            active_count: pending_total,
        },
        monthly_trend,
        league_table,
    };
    Ok(Json(Envelope::ok(dashboard)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn unknown_location_slug_is_404() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/stats/locations/atlantis").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn known_location_slug_returns_200() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/stats/locations/london").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_trends_type_is_unprocessable() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/stats/trends/widgets").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn authorities_trends_returns_200() {
        let state = test_state().await;
        let router = routes().with_state(state);
        let response = router.oneshot(Request::builder().uri("/stats/trends/authorities?months=6").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
