//! Opportunity Scorer (§4.5.1, C5): LLM-driven weighted scoring with a
//! deterministic fallback when the model reply doesn't parse.

use std::sync::Arc;
use std::time::Duration;

use planning_core::{ApplicationStatus, ChatMessage, CompletionRequest, LlmClient, OpportunityBreakdown, PlanningApplication, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

const FALLBACK_CONFIDENCE: f64 = 0.4;

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityResult {
    pub opportunity_score: u8,
    pub approval_probability: f64,
    pub confidence_score: f64,
    pub breakdown: OpportunityBreakdown,
    pub rationale: String,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmScoreReply {
    approval_probability: f64,
    market_potential: f64,
    project_viability: f64,
    strategic_fit: f64,
    timeline_score: f64,
    risk_score: f64,
    rationale: String,
    #[serde(default)]
    risk_factors: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

pub struct OpportunityScorer {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl OpportunityScorer {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub async fn score(&self, app: &PlanningApplication, market_context: Option<&str>) -> Result<OpportunityResult> {
        let prompt = build_prompt(app, market_context);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)], self.model.clone());

        let reply = match tokio::time::timeout(self.timeout, self.client.complete(request)).await {
            Ok(Ok(response)) => serde_json::from_str::<LlmScoreReply>(extract_json(&response.content)),
            Ok(Err(err)) => {
                warn!(error = %err, application_id = %app.application_id, "opportunity scoring call failed");
                Err(serde_json::Error::io(std::io::Error::other(err.to_string())))
            }
            Err(_) => {
                warn!(application_id = %app.application_id, "opportunity scoring timed out");
                Err(serde_json::Error::io(std::io::Error::other("timeout")))
            }
        };

        match reply {
            Ok(parsed) => {
                let breakdown = OpportunityBreakdown {
                    approval_probability: parsed.approval_probability,
                    market_potential: parsed.market_potential,
                    project_viability: parsed.project_viability,
                    strategic_fit: parsed.strategic_fit,
                    timeline_score: parsed.timeline_score,
                    risk_score: parsed.risk_score,
                }
                .clipped();

                Ok(OpportunityResult {
                    opportunity_score: breakdown.opportunity_score(),
                    approval_probability: breakdown.approval_probability,
                    confidence_score: 0.85,
                    breakdown,
                    rationale: parsed.rationale,
                    risk_factors: parsed.risk_factors,
                    recommendations: parsed.recommendations,
                })
            }
            Err(_) => Ok(heuristic_fallback(app)),
        }
    }
}

/// `extract_json` tolerates a reply wrapped in prose or a fenced code block by
/// slicing from the first `{` to the last `}`.
fn extract_json(content: &str) -> &str {
    let start = content.find('{');
    let end = content.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &content[s..=e],
        _ => content,
    }
}

fn build_prompt(app: &PlanningApplication, market_context: Option<&str>) -> String {
    format!(
        "You are assessing UK planning application opportunity. Reply with strict JSON only, no prose, matching this shape:\n\
         {{\"approval_probability\":0-1,\"market_potential\":0-1,\"project_viability\":0-1,\"strategic_fit\":0-1,\"timeline_score\":0-1,\"risk_score\":0-1,\"rationale\":\"...\",\"risk_factors\":[...],\"recommendations\":[...]}}\n\n\
         Application:\nauthority: {}\nstatus: {:?}\ndevelopment_type: {}\ndescription: {}\nproject_value: {:?}\n\n\
         Market context: {}",
        app.authority,
        app.status,
        app.development_type.as_deref().unwrap_or("unknown"),
        app.description,
        app.project_value,
        market_context.unwrap_or("none provided"),
    )
}

/// Deterministic type/status-based heuristic used when the LLM reply fails to
/// parse (§4.5.1). Reports low confidence so callers can treat it as partial.
fn heuristic_fallback(app: &PlanningApplication) -> OpportunityResult {
    let status_factor = match app.status {
        ApplicationStatus::Approved => 0.8,
        ApplicationStatus::UnderConsideration | ApplicationStatus::Validated | ApplicationStatus::Submitted => 0.5,
        ApplicationStatus::Appealed => 0.4,
        ApplicationStatus::Rejected | ApplicationStatus::Withdrawn => 0.2,
    };
    let type_factor = match app.development_type.as_deref() {
        Some("Residential") | Some("residential") => 0.6,
        Some("Commercial") | Some("commercial") => 0.55,
        _ => 0.5,
    };

    let breakdown = OpportunityBreakdown {
        approval_probability: status_factor,
        market_potential: type_factor,
        project_viability: 0.5,
        strategic_fit: 0.5,
        timeline_score: 0.5,
        risk_score: 1.0 - status_factor,
    }
    .clipped();

    OpportunityResult {
        opportunity_score: breakdown.opportunity_score(),
        approval_probability: breakdown.approval_probability,
        confidence_score: FALLBACK_CONFIDENCE,
        breakdown,
        rationale: "Generated from a deterministic status/type heuristic after the model reply could not be parsed.".to_string(),
        risk_factors: Vec::new(),
        recommendations: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use planning_core::{CompletionRequest as Req, CompletionStream, EmbeddingBatch, FinishReason, LlmResponse, TokenUsage, UsageStats};

    struct ScriptedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: Req) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: "test-model".to_string(),
                provider: "test".to_string(),
                tokens_used: TokenUsage::default(),
                cost_usd: 0.0,
                finish_reason: FinishReason::Stop,
            })
        }
        async fn stream_complete(&self, _request: Req) -> Result<CompletionStream> {
            unimplemented!()
        }
        async fn embed(&self, _texts: &[String], _model: &str) -> Result<EmbeddingBatch> {
            unimplemented!()
        }
        fn usage_stats(&self) -> UsageStats {
            UsageStats::default()
        }
    }

    fn test_app() -> PlanningApplication {
        planning_core::PlanningApplication {
            application_id: "APP-1".to_string(),
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
            status: ApplicationStatus::UnderConsideration,
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

    #[tokio::test]
    async fn well_formed_reply_produces_high_confidence_score() {
        let reply = r#"{"approval_probability":0.8,"market_potential":0.7,"project_viability":0.6,"strategic_fit":0.5,"timeline_score":0.6,"risk_score":0.2,"rationale":"looks good","risk_factors":["flood zone"],"recommendations":["add drainage plan"]}"#;
        let scorer = OpportunityScorer::new(Arc::new(ScriptedLlm { reply: reply.to_string() }), "claude-3-5-haiku-20241022", Duration::from_secs(5));
        let result = scorer.score(&test_app(), None).await.unwrap();
        assert!(result.opportunity_score > 0);
        assert_eq!(result.confidence_score, 0.85);
        assert_eq!(result.risk_factors, vec!["flood zone".to_string()]);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back_to_heuristic_with_low_confidence() {
        let scorer = OpportunityScorer::new(Arc::new(ScriptedLlm { reply: "not json at all".to_string() }), "claude-3-5-haiku-20241022", Duration::from_secs(5));
        let result = scorer.score(&test_app(), None).await.unwrap();
        assert_eq!(result.confidence_score, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn extract_json_strips_surrounding_prose() {
        let content = "Here you go:\n```json\n{\"a\":1}\n```\nhope that helps";
        assert_eq!(extract_json(content), "{\"a\":1}");
    }
}
