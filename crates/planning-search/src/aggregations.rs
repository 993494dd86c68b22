//! `Aggregations` (§4.10): a pre-declared aggregation tree returned as-is —
//! callers never compose their own aggregation bodies.

use serde_json::{json, Value as JsonValue};

/// Top authorities, status breakdown, monthly submission histogram,
/// decision-time percentiles, and geographic counts — the fixed tree described
/// in §4.10.
#[must_use]
pub fn aggregation_tree() -> JsonValue {
    json!({
        "top_authorities": {
            "terms": { "field": "authority", "size": 20 }
        },
        "status_breakdown": {
            "terms": { "field": "status", "size": 10 }
        },
        "monthly_submissions": {
            "date_histogram": { "field": "submission_date", "calendar_interval": "month" }
        },
        "decision_time_percentiles": {
            "percentiles": { "field": "processing_days", "percents": [50, 75, 90, 95, 99] }
        },
        "geographic_counts": {
            "geohash_grid": { "field": "location", "precision": 5 }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_declares_all_five_branches() {
        let tree = aggregation_tree();
        for key in ["top_authorities", "status_breakdown", "monthly_submissions", "decision_time_percentiles", "geographic_counts"] {
            assert!(tree.get(key).is_some(), "missing aggregation branch {key}");
        }
    }
}
