//! Source-text composition rules for [`crate::ApplicationEmbeddingType`] (§4.4).

use planning_core::PlanningApplication;

const DESCRIPTION_CAP: usize = 8_000;
const COMBINED_CAP: usize = 8_000;
const SUMMARY_FALLBACK_CAP: usize = 500;
const LOCATION_CAP: usize = 2_000;

/// Which composed view of a [`PlanningApplication`] to embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationEmbeddingType {
    Description,
    Combined,
    Document,
    Location,
}

fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

fn join_non_empty(parts: &[Option<&str>]) -> String {
    parts.iter().filter_map(|p| *p).filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Composes the text to embed for `embedding_type`, applying each type's
/// character cap.
#[must_use]
pub fn compose_text(app: &PlanningApplication, embedding_type: ApplicationEmbeddingType) -> String {
    match embedding_type {
        ApplicationEmbeddingType::Description => truncate_chars(&app.description, DESCRIPTION_CAP),
        ApplicationEmbeddingType::Combined => {
            let joined = join_non_empty(&[
                Some(app.description.as_str()),
                app.proposal.as_deref(),
                app.ai_summary.as_deref(),
                app.address.as_deref(),
                app.development_type.as_deref(),
                app.use_class.as_deref(),
            ]);
            truncate_chars(&joined, COMBINED_CAP)
        }
        ApplicationEmbeddingType::Document => match &app.ai_summary {
            Some(summary) if !summary.is_empty() => summary.clone(),
            _ => truncate_chars(&app.description, SUMMARY_FALLBACK_CAP),
        },
        ApplicationEmbeddingType::Location => {
            let joined = join_non_empty(&[
                app.postcode.as_deref(),
                app.ward.as_deref(),
                Some(app.authority.as_str()),
                app.address.as_deref(),
            ]);
            truncate_chars(&joined, LOCATION_CAP)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planning_core::ApplicationStatus;

    fn app() -> PlanningApplication {
        PlanningApplication {
            application_id: "APP-1".to_string(),
            reference: None,
            authority: "Example Council".to_string(),
            authority_code: None,
            address: Some("1 High Street".to_string()),
            postcode: Some("AB1 2CD".to_string()),
            location: None,
            ward: Some("Central".to_string()),
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
            development_type: Some("Residential".to_string()),
            application_type: None,
            use_class: Some("C3".to_string()),
            description: "Erection of a two-storey extension".to_string(),
            proposal: Some("Two-storey rear extension".to_string()),
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
    fn combined_joins_every_present_field() {
        let text = compose_text(&app(), ApplicationEmbeddingType::Combined);
        assert!(text.contains("extension"));
        assert!(text.contains("High Street"));
        assert!(text.contains("Residential"));
        assert!(text.contains("C3"));
    }

    #[test]
    fn document_falls_back_to_description_prefix_without_summary() {
        let text = compose_text(&app(), ApplicationEmbeddingType::Document);
        assert_eq!(text, app().description);
    }

    #[test]
    fn document_prefers_ai_summary_when_present() {
        let mut a = app();
        a.ai_summary = Some("A concise AI summary.".to_string());
        let text = compose_text(&a, ApplicationEmbeddingType::Document);
        assert_eq!(text, "A concise AI summary.");
    }

    #[test]
    fn location_joins_postcode_ward_authority_address() {
        let text = compose_text(&app(), ApplicationEmbeddingType::Location);
        assert_eq!(text, "AB1 2CD Central Example Council 1 High Street");
    }

    #[test]
    fn description_is_truncated_to_cap() {
        let mut a = app();
        a.description = "x".repeat(10_000);
        let text = compose_text(&a, ApplicationEmbeddingType::Description);
        assert_eq!(text.chars().count(), DESCRIPTION_CAP);
    }
}
