//! `TrendsDashboard` (§4.10): overview totals, a monthly date histogram, and a
//! top-N league table with approval-rate/avg-days sub-aggregations and a
//! period-over-period rank/trend annotation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendsType {
    Authorities,
    Regions,
    Sectors,
    Agents,
}

impl TrendsType {
    /// The keyword field the league table buckets on.
    #[must_use]
    pub fn terms_field(self) -> &'static str {
        match self {
            TrendsType::Authorities => "authority",
            TrendsType::Regions => "region",
            TrendsType::Sectors => "development_type",
            TrendsType::Agents => "agent.name",
        }
    }
}

/// `{overview, monthly_trend[], league_table[]}` (§4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendsDashboard {
    pub overview: Overview,
    pub monthly_trend: Vec<MonthlyBucket>,
    pub league_table: Vec<LeagueEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overview {
    pub total_applications: u64,
    pub approval_rate: f64,
    pub average_decision_days: f64,
    pub active_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month: String,
    pub approved: u64,
    pub rejected: u64,
    pub pending: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueEntry {
    pub name: String,
    pub rank: u32,
    pub total: u64,
    pub approval_rate: f64,
    pub average_decision_days: f64,
    pub previous_period_total: u64,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// Annotates a league-table row by comparing its current-period volume against
/// the same bucket's previous-period volume.
#[must_use]
pub fn annotate_trend(current_total: u64, previous_total: u64) -> TrendDirection {
    if previous_total == 0 {
        return if current_total > 0 { TrendDirection::Up } else { TrendDirection::Stable };
    }
    let change = (current_total as f64 - previous_total as f64) / previous_total as f64;
    if change > 0.05 {
        TrendDirection::Up
    } else if change < -0.05 {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

/// The ES aggregation body for a [`TrendsType`]'s league table: a top-N terms
/// aggregation with approval-rate and average-decision-days sub-aggregations.
#[must_use]
pub fn league_table_aggregation(trends_type: TrendsType, top_n: usize) -> JsonValue {
    json!({
        "league_table": {
            "terms": { "field": trends_type.terms_field(), "size": top_n },
            "aggs": {
                "approved_count": {
                    "filter": { "term": { "decision": "approved" } }
                },
                "average_decision_days": {
                    "avg": { "field": "processing_days" }
                },
            }
        },
        "monthly_trend": {
            "date_histogram": { "field": "submission_date", "calendar_interval": "month" },
            "aggs": {
                "by_decision": { "terms": { "field": "decision", "size": 4 } }
            }
        }
    })
}

/// Reads `monthly_trend`'s date-histogram buckets, each with an approved/rejected
/// count pulled from the `by_decision` sub-aggregation and everything else
/// folded into `pending`.
#[must_use]
pub fn parse_monthly_trend(aggs: &JsonValue) -> Vec<MonthlyBucket> {
    let Some(buckets) = aggs["monthly_trend"]["buckets"].as_array() else {
        return Vec::new();
    };

    buckets
        .iter()
        .map(|bucket| {
            let month = bucket["key_as_string"].as_str().unwrap_or_default().to_string();
            let total = bucket["doc_count"].as_u64().unwrap_or(0);
            let mut approved = 0u64;
            let mut rejected = 0u64;
            if let Some(decision_buckets) = bucket["by_decision"]["buckets"].as_array() {
                for decision_bucket in decision_buckets {
                    let count = decision_bucket["doc_count"].as_u64().unwrap_or(0);
                    match decision_bucket["key"].as_str() {
                        Some("approved") => approved += count,
                        Some("refused" | "rejected") => rejected += count,
                        _ => {}
                    }
                }
            }
            MonthlyBucket { month, approved, rejected, pending: total.saturating_sub(approved + rejected) }
        })
        .collect()
}

/// Reads `league_table`'s terms buckets into ranked [`LeagueEntry`] rows,
/// comparing each bucket's volume against `previous_totals` (by bucket name) to
/// annotate the trend direction.
#[must_use]
pub fn parse_league_table(aggs: &JsonValue, previous_totals: &std::collections::HashMap<String, u64>) -> Vec<LeagueEntry> {
    let Some(buckets) = aggs["league_table"]["buckets"].as_array() else {
        return Vec::new();
    };

    buckets
        .iter()
        .enumerate()
        .map(|(i, bucket)| {
            let name = bucket["key"].as_str().unwrap_or_default().to_string();
            let total = bucket["doc_count"].as_u64().unwrap_or(0);
            let approved = bucket["approved_count"]["doc_count"].as_u64().unwrap_or(0);
            let approval_rate = if total == 0 { 0.0 } else { approved as f64 / total as f64 };
            let average_decision_days = bucket["average_decision_days"]["value"].as_f64().unwrap_or(0.0);
            let previous_total = previous_totals.get(&name).copied().unwrap_or(0);

            LeagueEntry {
                rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
                total,
                approval_rate,
                average_decision_days,
                previous_period_total: previous_total,
                trend: annotate_trend(total, previous_total),
                name,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_bucket_on_region_field() {
        assert_eq!(TrendsType::Regions.terms_field(), "region");
    }

    #[test]
    fn growth_above_five_percent_is_up() {
        assert_eq!(annotate_trend(110, 100), TrendDirection::Up);
    }

    #[test]
    fn decline_below_five_percent_is_down() {
        assert_eq!(annotate_trend(80, 100), TrendDirection::Down);
    }

    #[test]
    fn small_change_is_stable() {
        assert_eq!(annotate_trend(102, 100), TrendDirection::Stable);
    }

    #[test]
    fn fresh_bucket_with_volume_counts_as_up() {
        assert_eq!(annotate_trend(5, 0), TrendDirection::Up);
    }

    #[test]
    fn monthly_trend_splits_approved_rejected_and_pending() {
        let aggs = json!({
            "monthly_trend": {
                "buckets": [{
                    "key_as_string": "2026-01-01",
                    "doc_count": 10,
                    "by_decision": { "buckets": [
                        { "key": "approved", "doc_count": 6 },
                        { "key": "refused", "doc_count": 2 },
                    ]},
                }]
            }
        });
        let parsed = parse_monthly_trend(&aggs);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].approved, 6);
        assert_eq!(parsed[0].rejected, 2);
        assert_eq!(parsed[0].pending, 2);
    }

    #[test]
    fn league_table_ranks_by_bucket_order_and_annotates_trend() {
        let aggs = json!({
            "league_table": {
                "buckets": [{
                    "key": "Camden",
                    "doc_count": 120,
                    "approved_count": { "doc_count": 90 },
                    "average_decision_days": { "value": 45.0 },
                }]
            }
        });
        let mut previous = std::collections::HashMap::new();
        previous.insert("Camden".to_string(), 100u64);

        let table = parse_league_table(&aggs, &previous);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].rank, 1);
        assert!((table[0].approval_rate - 0.75).abs() < 1e-9);
        assert_eq!(table[0].trend, TrendDirection::Stable);
    }
}
