//! A `PlanningApplication` builder with sensible defaults for every field, so
//! tests only need to override what they actually care about.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use planning_core::{
    ApplicationStatus, Decision, GeoPoint, Party, PlanningApplication, PublicComments,
};

/// Builds a minimal-but-valid [`PlanningApplication`] with the given id and
/// `Submitted` status. Every optional field starts `None`/empty; chain the
/// `with_*` methods to fill in what a test needs.
#[must_use]
pub fn sample_application(application_id: &str) -> PlanningApplication {
    PlanningApplication {
        application_id: application_id.to_string(),
        reference: None,
        authority: "Dover District Council".to_string(),
        authority_code: Some("DOV".to_string()),
        address: Some("12 High Street, Dover".to_string()),
        postcode: Some("CT16 1DF".to_string()),
        location: Some(GeoPoint { lat: 51.1279, lon: 1.3134 }),
        ward: Some("Town and Pier".to_string()),
        parish: None,
        easting: None,
        northing: None,
        status: ApplicationStatus::Submitted,
        decision: None,
        submission_date: Some(Utc::now()),
        validation_date: None,
        consultation_start_date: None,
        consultation_end_date: None,
        target_decision_date: None,
        decision_date: None,
        decided_date: None,
        appeal_date: None,
        n_statutory_days: None,
        development_type: Some("Residential".to_string()),
        application_type: Some("Full".to_string()),
        use_class: None,
        description: "Single storey rear extension and loft conversion".to_string(),
        proposal: None,
        project_value: Some(75_000.0),
        floor_area: Some(42.5),
        site_area: None,
        num_units: Some(1),
        num_bedrooms: Some(2),
        building_height: None,
        parking_spaces: None,
        applicant: Some(Party {
            name: Some("Jane Smith".to_string()),
            company: None,
            party_type: Some("applicant".to_string()),
            address: None,
            contact: None,
        }),
        agent: None,
        planning_officer: None,
        documents: Vec::new(),
        consultations: Vec::new(),
        public_comments: PublicComments::default(),
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
        other_fields: HashMap::new(),
    }
}

/// Builder extensions for the common per-test overrides.
pub trait ApplicationFixtureExt {
    #[must_use]
    fn with_status(self, status: ApplicationStatus) -> Self;
    #[must_use]
    fn with_decision(self, decision: Decision, decision_date: DateTime<Utc>) -> Self;
    #[must_use]
    fn with_description(self, description: impl Into<String>) -> Self;
    #[must_use]
    fn with_submission_date(self, when: DateTime<Utc>) -> Self;
    #[must_use]
    fn with_last_changed(self, when: DateTime<Utc>) -> Self;
    #[must_use]
    fn with_opportunity_score(self, score: u8) -> Self;
    #[must_use]
    fn with_embedding(self, vector: Vec<f32>, model: &str) -> Self;
}

impl ApplicationFixtureExt for PlanningApplication {
    fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status = status;
        self
    }

    fn with_decision(mut self, decision: Decision, decision_date: DateTime<Utc>) -> Self {
        self.decision = Some(decision);
        self.decision_date = Some(decision_date);
        self.status = ApplicationStatus::Approved;
        self
    }

    fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn with_submission_date(mut self, when: DateTime<Utc>) -> Self {
        self.submission_date = Some(when);
        self
    }

    /// Stashes `last_changed` in `other_fields`, matching how it arrives from ES
    /// (it has no modeled field on [`PlanningApplication`]).
    fn with_last_changed(mut self, when: DateTime<Utc>) -> Self {
        self.other_fields.insert("last_changed".to_string(), serde_json::json!(when.to_rfc3339()));
        self
    }

    fn with_opportunity_score(mut self, score: u8) -> Self {
        self.opportunity_score = Some(score);
        self
    }

    fn with_embedding(mut self, vector: Vec<f32>, model: &str) -> Self {
        self.embedding_text_hash = Some(self.description_hash());
        self.embedding_model = Some(model.to_string());
        self.embedding_dimensions = Some(vector.len() as u32);
        self.embedding_generated_at = Some(Utc::now());
        self.description_embedding = Some(vector);
        self.ai_processed = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_application_has_no_embedding_by_default() {
        let app = sample_application("APP-1");
        assert!(!app.embedding_is_current());
    }

    #[test]
    fn with_embedding_produces_a_current_embedding() {
        let app = sample_application("APP-1").with_embedding(vec![0.1; 1536], "text-embedding-3-small");
        assert!(app.embedding_is_current());
    }

    #[test]
    fn with_last_changed_round_trips_through_other_fields() {
        let when = Utc::now();
        let app = sample_application("APP-1").with_last_changed(when);
        let raw = app.other_fields.get("last_changed").and_then(|v| v.as_str()).unwrap();
        assert_eq!(raw, when.to_rfc3339());
    }
}
