//! `LocationStats` (§4.10): named-center registry + geo_distance filter,
//! result-cached for an hour by `(slug, radius_km, date_from, date_to)`.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use planning_cache::CacheManager;
use planning_core::{Cache, CacheLevel, CacheType, EsGateway, PlanningError, Result};
use serde::{Deserialize, Serialize};

use crate::trends::{Overview, TrendsDashboard};

const RESULT_TTL_HOURS: i64 = 1;

/// A named geographic center (lat/lon) resolvable by slug (§4.10).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NamedCenter {
    pub lat: f64,
    pub lon: f64,
}

/// In-memory registry of named centers. A small, hand-curated set of UK cities;
/// callers resolving an unknown slug get `NotFound`.
#[must_use]
pub fn named_centers() -> &'static [(&'static str, NamedCenter)] {
    &[
        ("london", NamedCenter { lat: 51.5074, lon: -0.1278 }),
        ("manchester", NamedCenter { lat: 53.4808, lon: -2.2426 }),
        ("birmingham", NamedCenter { lat: 52.4862, lon: -1.8904 }),
        ("leeds", NamedCenter { lat: 53.8008, lon: -1.5491 }),
        ("bristol", NamedCenter { lat: 51.4545, lon: -2.5879 }),
        ("glasgow", NamedCenter { lat: 55.8642, lon: -4.2518 }),
    ]
}

#[must_use]
pub fn resolve_center(slug: &str) -> Option<NamedCenter> {
    named_centers().iter().find(|(name, _)| *name == slug).map(|(_, center)| *center)
}

fn cache_key(slug: &str, radius_km: f64, date_from: Option<&str>, date_to: Option<&str>) -> String {
    format!("{slug}|{radius_km}|{}|{}", date_from.unwrap_or(""), date_to.unwrap_or(""))
}

pub struct LocationStatsService {
    es: Arc<dyn EsGateway>,
    cache: Arc<CacheManager>,
}

impl LocationStatsService {
    #[must_use]
    pub fn new(es: Arc<dyn EsGateway>, cache: Arc<CacheManager>) -> Self {
        Self { es, cache }
    }

    /// Resolves `slug`, runs the trends-like aggregation set scoped to a
    /// `geo_distance` filter, and caches the result for an hour.
    pub async fn location_stats(&self, slug: &str, radius_km: f64, date_from: Option<&str>, date_to: Option<&str>) -> Result<TrendsDashboard> {
        let center = resolve_center(slug).ok_or_else(|| PlanningError::not_found(format!("unknown location slug '{slug}'")))?;

        let key = cache_key(slug, radius_km, date_from, date_to);
        if let Some(cached) = self.cache.get::<TrendsDashboard>(CacheType::SearchResults, &key).await? {
            return Ok(cached);
        }

        let geo_filter = serde_json::json!({
            "geo_distance": {
                "distance": format!("{radius_km}km"),
                "location": { "lat": center.lat, "lon": center.lon },
            }
        });
        let mut query = serde_json::json!({ "bool": { "filter": [geo_filter] } });
        if let (Some(from), Some(to)) = (date_from, date_to) {
            query["bool"]["filter"].as_array_mut().unwrap().push(serde_json::json!({
                "range": { "submission_date": { "gte": from, "lte": to } }
            }));
        }

        let aggs = crate::trends::league_table_aggregation(crate::trends::TrendsType::Authorities, 10);
        let result = self.es.aggregations(aggs, Some(query.clone())).await?;
        let total = self.es.count(Some(query)).await?;

        let league_table = crate::trends::parse_league_table(&result, &std::collections::HashMap::new());
        let monthly_trend = crate::trends::parse_monthly_trend(&result);
        let approved_total: u64 = league_table.iter().map(|e| (e.approval_rate * e.total as f64).round() as u64).sum();
        let average_decision_days = if league_table.is_empty() {
            0.0
        } else {
            league_table.iter().map(|e| e.average_decision_days).sum::<f64>() / league_table.len() as f64
        };

        let dashboard = TrendsDashboard {
            overview: Overview {
                total_applications: total,
                approval_rate: if total == 0 { 0.0 } else { approved_total as f64 / total as f64 },
                average_decision_days,
                active_count: total.saturating_sub(approved_total),
            },
            monthly_trend,
            league_table,
        };

        self.cache
            .set(CacheType::SearchResults, &key, &dashboard, ChronoDuration::hours(RESULT_TTL_HOURS), CacheLevel::Normal)
            .await?;

        Ok(dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_slug_resolves() {
        assert!(resolve_center("london").is_some());
    }

    #[test]
    fn unknown_slug_is_none() {
        assert!(resolve_center("atlantis").is_none());
    }

    #[test]
    fn cache_key_distinguishes_radius() {
        assert_ne!(cache_key("london", 5.0, None, None), cache_key("london", 10.0, None, None));
    }
}
