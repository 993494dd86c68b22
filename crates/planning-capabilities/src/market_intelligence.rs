//! Market Intelligence (§4.5.4, C5): deterministic statistical aggregates over
//! a set of applications, with an LLM synthesizing narrative insights.

use std::collections::HashMap;
use std::sync::Arc;

use planning_core::{ApplicationStatus, ChatMessage, CompletionRequest, LlmClient, PlanningApplication, Result};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPeriod {
    LastMonth,
    LastQuarter,
    LastYear,
    Last2Years,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trend {
    pub metric: String,
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub confidence: f64,
    pub insight: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentMetrics {
    pub approval_rate: f64,
    pub average_processing_days: f64,
    pub volume_trend: f64,
    pub approval_trend: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketIntelligenceReport {
    pub market_overview: String,
    pub trends: Vec<Trend>,
    pub market_metrics: HashMap<String, SegmentMetrics>,
    pub opportunities: Vec<String>,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub data_quality_score: f64,
}

pub struct MarketIntelligenceEngine {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl MarketIntelligenceEngine {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { client, model: model.into() }
    }

    pub async fn analyze(&self, applications: &[PlanningApplication], period: AnalysisPeriod, geographic_scope: Option<&str>) -> Result<MarketIntelligenceReport> {
        let segments = aggregate_segments(applications);
        let trends = derive_trends(applications, &segments);
        let data_quality_score = data_quality(applications);

        let (market_overview, opportunities, risks, recommendations) = self
            .synthesize_narrative(applications, &segments, period, geographic_scope)
            .await;

        Ok(MarketIntelligenceReport {
            market_overview,
            trends,
            market_metrics: segments,
            opportunities,
            risks,
            recommendations,
            data_quality_score,
        })
    }

    async fn synthesize_narrative(
        &self,
        applications: &[PlanningApplication],
        segments: &HashMap<String, SegmentMetrics>,
        period: AnalysisPeriod,
        geographic_scope: Option<&str>,
    ) -> (String, Vec<String>, Vec<String>, Vec<String>) {
        let prompt = format!(
            "Write a short UK planning market narrative for {} applications over {:?}{}. \
             Segment metrics: {:?}. Reply with strict JSON: {{\"overview\":\"...\",\"opportunities\":[...],\"risks\":[...],\"recommendations\":[...]}}",
            applications.len(),
            period,
            geographic_scope.map(|s| format!(" in {s}")).unwrap_or_default(),
            segments,
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)], self.model.clone());

        match self.client.complete(request).await {
            Ok(response) => parse_narrative(&response.content).unwrap_or_else(fallback_narrative),
            Err(err) => {
                warn!(error = %err, "market intelligence narrative call failed");
                fallback_narrative()
            }
        }
    }
}

fn aggregate_segments(applications: &[PlanningApplication]) -> HashMap<String, SegmentMetrics> {
    let mut groups: HashMap<String, Vec<&PlanningApplication>> = HashMap::new();
    for app in applications {
        groups.entry(app.development_type.clone().unwrap_or_else(|| "unclassified".to_string())).or_default().push(app);
    }

    groups
        .into_iter()
        .map(|(segment, apps)| {
            let total = apps.len().max(1) as f64;
            let approved = apps.iter().filter(|a| a.status == ApplicationStatus::Approved).count() as f64;
            let processing_days: Vec<f64> = apps
                .iter()
                .filter_map(|a| match (a.submission_date, a.decision_date) {
                    (Some(sub), Some(dec)) => Some((dec - sub).num_days() as f64),
                    _ => None,
                })
                .collect();
            let average_processing_days = if processing_days.is_empty() {
                0.0
            } else {
                processing_days.iter().sum::<f64>() / processing_days.len() as f64
            };
            let (volume_trend, approval_trend) = segment_trends(&apps);

            (
                segment,
                SegmentMetrics {
                    approval_rate: approved / total,
                    average_processing_days,
                    volume_trend,
                    approval_trend,
                },
            )
        })
        .collect()
}

/// Splits a segment's applications into an earlier and a later half by
/// `submission_date` and returns the percent change in volume and approval
/// rate between the two halves, the same earlier-vs-later comparison
/// [`derive_trends`] uses to call a direction, but kept as raw magnitudes
/// since callers need a number rather than an up/down/stable label.
fn segment_trends(apps: &[&PlanningApplication]) -> (f64, f64) {
    let mut dated: Vec<&PlanningApplication> = apps.iter().copied().filter(|a| a.submission_date.is_some()).collect();
    if dated.len() < 2 {
        return (0.0, 0.0);
    }
    dated.sort_by_key(|a| a.submission_date);
    let mid = dated.len() / 2;
    let (earlier, later) = dated.split_at(mid);

    let earlier_count = earlier.len() as f64;
    let later_count = later.len() as f64;
    let earlier_rate = earlier.iter().filter(|a| a.status == ApplicationStatus::Approved).count() as f64 / earlier_count;
    let later_rate = later.iter().filter(|a| a.status == ApplicationStatus::Approved).count() as f64 / later_count;

    (percent_change(earlier_count, later_count), percent_change(earlier_rate, later_rate))
}

/// `(later - earlier) / earlier * 100`, with a 100% swing when `earlier` is
/// zero and `later` isn't, and no movement when both are zero.
fn percent_change(earlier: f64, later: f64) -> f64 {
    if earlier == 0.0 {
        if later == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (later - earlier) / earlier * 100.0
    }
}

fn derive_trends(applications: &[PlanningApplication], segments: &HashMap<String, SegmentMetrics>) -> Vec<Trend> {
    let total = applications.len().max(1) as f64;
    let overall_approval = applications.iter().filter(|a| a.status == ApplicationStatus::Approved).count() as f64 / total;

    let mut trends = vec![Trend {
        metric: "overall_approval_rate".to_string(),
        direction: if overall_approval > 0.6 {
            TrendDirection::Up
        } else if overall_approval < 0.4 {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        },
        change_percent: (overall_approval * 100.0) - 50.0,
        confidence: if applications.len() >= 20 { 0.8 } else { 0.5 },
        insight: format!("{:.0}% of applications in this set were approved.", overall_approval * 100.0),
    }];

    for (segment, metrics) in segments {
        trends.push(Trend {
            metric: format!("{segment}_approval_rate"),
            direction: if metrics.approval_rate > 0.6 {
                TrendDirection::Up
            } else if metrics.approval_rate < 0.4 {
                TrendDirection::Down
            } else {
                TrendDirection::Stable
            },
            change_percent: (metrics.approval_rate * 100.0) - 50.0,
            confidence: 0.6,
            insight: format!("{segment} segment approval rate is {:.0}%.", metrics.approval_rate * 100.0),
        });
    }

    trends
}

fn data_quality(applications: &[PlanningApplication]) -> f64 {
    if applications.is_empty() {
        return 0.0;
    }
    let complete = applications
        .iter()
        .filter(|a| a.development_type.is_some() && a.decision_date.is_some() && a.submission_date.is_some())
        .count() as f64;
    complete / applications.len() as f64
}

fn parse_narrative(content: &str) -> Option<(String, Vec<String>, Vec<String>, Vec<String>)> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(&content[start..=end]).ok()?;
    let as_str_vec = |key: &str| -> Vec<String> {
        value[key].as_array().map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect()).unwrap_or_default()
    };
    Some((
        value["overview"].as_str().unwrap_or_default().to_string(),
        as_str_vec("opportunities"),
        as_str_vec("risks"),
        as_str_vec("recommendations"),
    ))
}

fn fallback_narrative() -> (String, Vec<String>, Vec<String>, Vec<String>) {
    ("Narrative synthesis unavailable; figures above are computed directly from the input set.".to_string(), Vec::new(), Vec::new(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn test_app(id: &str, status: ApplicationStatus, submission_date: Option<chrono::DateTime<Utc>>) -> PlanningApplication {
        planning_core::PlanningApplication {
            application_id: id.to_string(),
            reference: None,
            authority: "Example Council".to_string(),
            authority_code: None,
            address: None,
            postcode: None,
            location: None,
            ward: None,
            parish: None,
            easting: None,
            northing: None,
            status,
            decision: None,
            submission_date,
            validation_date: None,
            consultation_start_date: None,
            consultation_end_date: None,
            target_decision_date: None,
            decision_date: None,
            decided_date: None,
            appeal_date: None,
            n_statutory_days: None,
            development_type: Some("Residential".to_string()),
            application_type: None,
            use_class: None,
            description: "Two-storey rear extension".to_string(),
            proposal: None,
            project_value: Some(50_000.0),
            floor_area: None,
            site_area: None,
            num_units: None,
            num_bedrooms: None,
            building_height: None,
            parking_spaces: None,
            applicant: None,
            agent: None,
            planning_officer: None,
            documents: Vec::new(),
            consultations: Vec::new(),
            public_comments: planning_core::PublicComments::default(),
            ai_summary: None,
            ai_key_points: Vec::new(),
            ai_sentiment: None,
            complexity_score: None,
            opportunity_score: None,
            approval_probability: None,
            opportunity_breakdown: None,
            opportunity_rationale: None,
            market_insights: None,
            predicted_timeline: None,
            risk_assessment: None,
            risk_flags: Vec::new(),
            confidence_score: None,
            description_embedding: None,
            full_content_embedding: None,
            summary_embedding: None,
            location_embedding: None,
            ai_processed: false,
            ai_processed_at: None,
            ai_processing_version: None,
            embedding_model: None,
            embedding_dimensions: None,
            embedding_generated_at: None,
            embedding_text_hash: None,
            embedding_priority: None,
            other_fields: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn data_quality_is_zero_for_empty_input() {
        assert_eq!(data_quality(&[]), 0.0);
    }

    #[test]
    fn percent_change_from_zero_baseline_is_a_full_swing() {
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 5.0), 100.0);
    }

    #[test]
    fn percent_change_doubling_is_one_hundred_percent() {
        assert_eq!(percent_change(10.0, 20.0), 100.0);
    }

    #[test]
    fn segment_trends_needs_at_least_two_dated_applications() {
        let now = Utc::now();
        let apps = [test_app("APP-1", ApplicationStatus::Approved, Some(now))];
        let refs: Vec<&PlanningApplication> = apps.iter().collect();
        assert_eq!(segment_trends(&refs), (0.0, 0.0));
    }

    #[test]
    fn segment_trends_reflects_rising_volume_and_approval_rate() {
        let now = Utc::now();
        let earlier = now - ChronoDuration::days(60);
        let apps = [
            test_app("APP-1", ApplicationStatus::Rejected, Some(earlier)),
            test_app("APP-2", ApplicationStatus::Approved, Some(now)),
            test_app("APP-3", ApplicationStatus::Approved, Some(now)),
        ];
        let refs: Vec<&PlanningApplication> = apps.iter().collect();
        let (volume_trend, approval_trend) = segment_trends(&refs);
        assert!(volume_trend > 0.0);
        assert!(approval_trend > 0.0);
    }

    #[test]
    fn aggregate_segments_populates_trend_fields() {
        let now = Utc::now();
        let earlier = now - ChronoDuration::days(60);
        let apps = vec![
            test_app("APP-1", ApplicationStatus::Rejected, Some(earlier)),
            test_app("APP-2", ApplicationStatus::Approved, Some(now)),
        ];
        let segments = aggregate_segments(&apps);
        let residential = segments.get("Residential").unwrap();
        assert!(residential.volume_trend != 0.0 || residential.approval_trend != 0.0);
    }

    #[test]
    fn parse_narrative_reads_all_four_fields() {
        let content = r#"{"overview":"steady","opportunities":["a"],"risks":["b"],"recommendations":["c"]}"#;
        let (overview, opportunities, risks, recommendations) = parse_narrative(content).unwrap();
        assert_eq!(overview, "steady");
        assert_eq!(opportunities, vec!["a".to_string()]);
        assert_eq!(risks, vec!["b".to_string()]);
        assert_eq!(recommendations, vec!["c".to_string()]);
    }
}
