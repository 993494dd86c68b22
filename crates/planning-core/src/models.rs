//! The `PlanningApplication` data model and its constituent types (§3.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Fixed dimensionality of every dense-vector field (§3.1, §6.1). Configurable in
/// principle, but every stored vector in a given index must share this dimension.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Lifecycle status of a planning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    Validated,
    UnderConsideration,
    Approved,
    Rejected,
    Withdrawn,
    Appealed,
}

/// Final decision recorded against an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Refused,
    Withdrawn,
    SplitDecision,
}

/// A geo-point, `(lat, lon)` in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// An applicant/agent/officer party on the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default, rename = "type")]
    pub party_type: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

/// A document attached to an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub url: String,
    #[serde(default)]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub content_extracted: Option<String>,
}

/// A single consultee response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub consultee: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Aggregate public-comment counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicComments {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub support_count: u32,
    #[serde(default)]
    pub objection_count: u32,
    #[serde(default)]
    pub neutral_count: u32,
}

/// Risk level bucket used in `RiskAssessment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// AI-derived risk assessment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub factors: Vec<String>,
    #[serde(default)]
    pub mitigation: Vec<String>,
}

/// The six weighted sub-scores behind `opportunity_score` (§3.1, §4.5.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityBreakdown {
    pub approval_probability: f64,
    pub market_potential: f64,
    pub project_viability: f64,
    pub strategic_fit: f64,
    pub timeline_score: f64,
    pub risk_score: f64,
}

/// Default weight vector for §4.5.1's weighted mean. `risk_score` is inverted
/// (`1.0 - risk_score`) before the weighted mean is taken.
pub const OPPORTUNITY_WEIGHTS: OpportunityBreakdown = OpportunityBreakdown {
    approval_probability: 0.25,
    market_potential: 0.20,
    project_viability: 0.15,
    strategic_fit: 0.15,
    timeline_score: 0.15,
    risk_score: 0.10,
};

impl OpportunityBreakdown {
    /// Clips every sub-score into `[0, 1]`.
    #[must_use]
    pub fn clipped(self) -> Self {
        let c = |v: f64| v.clamp(0.0, 1.0);
        Self {
            approval_probability: c(self.approval_probability),
            market_potential: c(self.market_potential),
            project_viability: c(self.project_viability),
            strategic_fit: c(self.strategic_fit),
            timeline_score: c(self.timeline_score),
            risk_score: c(self.risk_score),
        }
    }

    /// Computes `round(100 * weighted_mean)` per §3.1 / §4.5.1, inverting `risk_score`
    /// before the weighted mean so that lower risk contributes positively.
    #[must_use]
    pub fn opportunity_score(self) -> u8 {
        let b = self.clipped();
        let w = OPPORTUNITY_WEIGHTS;
        let weighted = b.approval_probability * w.approval_probability
            + b.market_potential * w.market_potential
            + b.project_viability * w.project_viability
            + b.strategic_fit * w.strategic_fit
            + b.timeline_score * w.timeline_score
            + (1.0 - b.risk_score) * w.risk_score;
        let total_weight = w.approval_probability
            + w.market_potential
            + w.project_viability
            + w.strategic_fit
            + w.timeline_score
            + w.risk_score;
        let score = (100.0 * weighted / total_weight).round();
        score.clamp(0.0, 100.0) as u8
    }
}

/// A planning application, the primary record of the system (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningApplication {
    pub application_id: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub authority: String,
    #[serde(default)]
    pub authority_code: Option<String>,

    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub parish: Option<String>,
    #[serde(default)]
    pub easting: Option<f64>,
    #[serde(default)]
    pub northing: Option<f64>,

    pub status: ApplicationStatus,
    #[serde(default)]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consultation_start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consultation_end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub target_decision_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decided_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub appeal_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub n_statutory_days: Option<u32>,

    #[serde(default)]
    pub development_type: Option<String>,
    #[serde(default)]
    pub application_type: Option<String>,
    #[serde(default)]
    pub use_class: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub proposal: Option<String>,

    #[serde(default)]
    pub project_value: Option<f64>,
    #[serde(default)]
    pub floor_area: Option<f64>,
    #[serde(default)]
    pub site_area: Option<f64>,
    #[serde(default)]
    pub num_units: Option<u32>,
    #[serde(default)]
    pub num_bedrooms: Option<u32>,
    #[serde(default)]
    pub building_height: Option<f64>,
    #[serde(default)]
    pub parking_spaces: Option<u32>,

    #[serde(default)]
    pub applicant: Option<Party>,
    #[serde(default)]
    pub agent: Option<Party>,
    #[serde(default)]
    pub planning_officer: Option<String>,

    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub consultations: Vec<Consultation>,
    #[serde(default)]
    pub public_comments: PublicComments,

    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub ai_key_points: Vec<String>,
    #[serde(default)]
    pub ai_sentiment: Option<String>,
    #[serde(default)]
    pub complexity_score: Option<f64>,
    #[serde(default)]
    pub opportunity_score: Option<u8>,
    #[serde(default)]
    pub approval_probability: Option<f64>,
    #[serde(default)]
    pub opportunity_breakdown: Option<OpportunityBreakdown>,
    #[serde(default)]
    pub opportunity_rationale: Option<String>,
    #[serde(default)]
    pub market_insights: Option<String>,
    #[serde(default)]
    pub predicted_timeline: Option<String>,
    #[serde(default)]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub ai_processed: bool,
    #[serde(default)]
    pub ai_processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ai_processing_version: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_dimensions: Option<u32>,
    #[serde(default)]
    pub embedding_generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub embedding_text_hash: Option<String>,
    #[serde(default)]
    pub embedding_priority: Option<String>,

    /// Fields present in the ES `_source` that are not modeled above. Decoded into
    /// strong types only at the leaves that actually read them (§9 "dynamic nested
    /// documents").
    #[serde(flatten)]
    pub other_fields: HashMap<String, JsonValue>,
}

impl PlanningApplication {
    /// `sha256(normalize(description))`, used to detect whether a stored embedding
    /// is stale (§3.1 invariant, §4.4).
    #[must_use]
    pub fn description_hash(&self) -> String {
        normalized_text_hash(&self.description)
    }

    /// True iff `description_embedding` is present and its recorded hash matches
    /// the current description — i.e. the vector has not been invalidated by an
    /// edit (§3.1 invariant).
    #[must_use]
    pub fn embedding_is_current(&self) -> bool {
        match (&self.description_embedding, &self.embedding_text_hash) {
            (Some(_), Some(hash)) => *hash == self.description_hash(),
            _ => false,
        }
    }
}

/// Normalizes text for hashing/embedding: trims, collapses internal whitespace,
/// lowercases. Shared by the embedding service and the invariant check above so
/// both sides of "did the description change" agree.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `sha256(normalize(text))`, hex-encoded.
#[must_use]
pub fn normalized_text_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let normalized = normalize_text(text);
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

/// A projection of `PlanningApplication` used by the "similar applications" view
/// and list endpoints. Built from a full application record; unknown/absent
/// fields are ignored rather than erroring (§9 open question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningApplicationSummary {
    pub application_id: String,
    pub authority: String,
    #[serde(default)]
    pub address: Option<String>,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub development_type: Option<String>,
    #[serde(default)]
    pub opportunity_score: Option<u8>,
    #[serde(default)]
    pub decision_date: Option<DateTime<Utc>>,
}

impl From<&PlanningApplication> for PlanningApplicationSummary {
    fn from(app: &PlanningApplication) -> Self {
        Self {
            application_id: app.application_id.clone(),
            authority: app.authority.clone(),
            address: app.address.clone(),
            status: app.status,
            development_type: app.development_type.clone(),
            opportunity_score: app.opportunity_score,
            decision_date: app.decision_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn opportunity_score_is_always_in_0_100(
            approval_probability in -2.0f64..2.0,
            market_potential in -2.0f64..2.0,
            project_viability in -2.0f64..2.0,
            strategic_fit in -2.0f64..2.0,
            timeline_score in -2.0f64..2.0,
            risk_score in -2.0f64..2.0,
        ) {
            let breakdown = OpportunityBreakdown {
                approval_probability,
                market_potential,
                project_viability,
                strategic_fit,
                timeline_score,
                risk_score,
            };
            let score = breakdown.opportunity_score();
            prop_assert!(score <= 100);
        }

        #[test]
        fn opportunity_score_is_monotonic_in_each_subscore(
            low in 0.0f64..0.5,
            high in 0.5f64..1.0,
        ) {
            let base = OpportunityBreakdown {
                approval_probability: 0.5,
                market_potential: 0.5,
                project_viability: 0.5,
                strategic_fit: 0.5,
                timeline_score: 0.5,
                risk_score: 0.5,
            };
            let worse = OpportunityBreakdown { approval_probability: low, ..base };
            let better = OpportunityBreakdown { approval_probability: high, ..base };
            prop_assert!(better.opportunity_score() >= worse.opportunity_score());
        }
    }

    fn sample_breakdown() -> OpportunityBreakdown {
        OpportunityBreakdown {
            approval_probability: 0.8,
            market_potential: 0.7,
            project_viability: 0.6,
            strategic_fit: 0.5,
            timeline_score: 0.9,
            risk_score: 0.2,
        }
    }

    #[test]
    fn opportunity_score_is_integer_in_0_100() {
        let score = sample_breakdown().opportunity_score();
        assert!(score <= 100);
    }

    #[test]
    fn opportunity_score_clips_out_of_range_subscores() {
        let breakdown = OpportunityBreakdown {
            approval_probability: 1.5,
            market_potential: -0.3,
            ..sample_breakdown()
        };
        let score = breakdown.opportunity_score();
        assert!(score <= 100);
    }

    #[test]
    fn higher_risk_score_lowers_opportunity_score() {
        let low_risk = OpportunityBreakdown {
            risk_score: 0.0,
            ..sample_breakdown()
        };
        let high_risk = OpportunityBreakdown {
            risk_score: 1.0,
            ..sample_breakdown()
        };
        assert!(low_risk.opportunity_score() > high_risk.opportunity_score());
    }

    #[test]
    fn normalize_text_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_text("  Hello   World \n"), "hello world");
    }

    #[test]
    fn description_hash_changes_with_description() {
        let mut app = sample_app();
        let h1 = app.description_hash();
        app.description = "a different proposal entirely".to_string();
        let h2 = app.description_hash();
        assert_ne!(h1, h2);
    }

    #[test]
    fn embedding_is_current_requires_matching_hash() {
        let mut app = sample_app();
        assert!(!app.embedding_is_current());
        app.description_embedding = Some(vec![0.0; DEFAULT_EMBEDDING_DIMENSIONS]);
        app.embedding_text_hash = Some(app.description_hash());
        assert!(app.embedding_is_current());
        app.description = "changed".to_string();
        assert!(!app.embedding_is_current());
    }

    #[test]
    fn summary_ignores_unmodeled_fields() {
        let app = sample_app();
        let summary = PlanningApplicationSummary::from(&app);
        assert_eq!(summary.application_id, app.application_id);
    }

    fn sample_app() -> PlanningApplication {
        PlanningApplication {
            application_id: "APP-1".to_string(),
            reference: None,
            authority: "Dover".to_string(),
            authority_code: None,
            address: None,
            postcode: None,
            location: None,
            ward: None,
            parish: None,
            easting: None,
            northing: None,
            status: ApplicationStatus::Submitted,
            decision: None,
            submission_date: None,
            validation_date: None,
            consultation_start_date: None,
            consultation_end_date: None,
            target_decision_date: None,
            decision_date: None,
            decided_date: None,
            appeal_date: None,
            n_statutory_days: None,
            development_type: None,
            application_type: None,
            use_class: None,
            description: "residential extension".to_string(),
            proposal: None,
            project_value: None,
            floor_area: None,
            site_area: None,
            num_units: None,
            num_bedrooms: None,
            building_height: None,
            parking_spaces: None,
            applicant: None,
            agent: None,
            planning_officer: None,
            documents: vec![],
            consultations: vec![],
            public_comments: PublicComments::default(),
            ai_summary: None,
            ai_key_points: vec![],
            ai_sentiment: None,
            complexity_score: None,
            opportunity_score: None,
            approval_probability: None,
            opportunity_breakdown: None,
            opportunity_rationale: None,
            market_insights: None,
            predicted_timeline: None,
            risk_assessment: None,
            risk_flags: vec![],
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
            other_fields: HashMap::new(),
        }
    }
}
