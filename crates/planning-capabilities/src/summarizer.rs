//! Document Summarizer (§4.5.2, C5).

use std::sync::Arc;

use planning_core::{ChatMessage, CompletionRequest, LlmClient, PlanningApplication, Result};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryType {
    General,
    Risks,
    Opportunities,
    Technical,
    Compliance,
}

impl SummaryType {
    fn focus(self) -> &'static str {
        match self {
            SummaryType::General => "a balanced overview of the application",
            SummaryType::Risks => "planning risks and objections",
            SummaryType::Opportunities => "commercial and development opportunities",
            SummaryType::Technical => "technical/construction considerations",
            SummaryType::Compliance => "policy and regulatory compliance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    fn instruction(self) -> &'static str {
        match self {
            SummaryLength::Short => "1-2 sentences",
            SummaryLength::Medium => "a single paragraph",
            SummaryLength::Long => "multiple paragraphs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub sentiment: Sentiment,
    pub complexity_score: f64,
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
}

#[derive(Debug, Deserialize)]
struct LlmSummaryReply {
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    sentiment: String,
    complexity_score: f64,
    #[serde(default)]
    recommendations: Vec<String>,
}

pub struct DocumentSummarizer {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl DocumentSummarizer {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { client, model: model.into() }
    }

    pub async fn summarize(&self, app: &PlanningApplication, summary_type: SummaryType, summary_length: SummaryLength) -> Result<SummaryResult> {
        let prompt = format!(
            "Summarize this UK planning application, focusing on {}. Write the summary in {}. \
             Reply with strict JSON only: {{\"summary\":\"...\",\"key_points\":[...],\"sentiment\":\"positive|neutral|negative\",\"complexity_score\":0-1,\"recommendations\":[...]}}\n\n\
             authority: {}\ndescription: {}\nproposal: {:?}",
            summary_type.focus(),
            summary_length.instruction(),
            app.authority,
            app.description,
            app.proposal,
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)], self.model.clone());

        let response = match self.client.complete(request).await {
            Ok(r) => r,
            Err(err) => {
                warn!(error = %err, application_id = %app.application_id, "summarization call failed");
                return Ok(fallback_summary(app));
            }
        };

        match parse_reply(&response.content) {
            Some(parsed) => Ok(SummaryResult {
                summary: parsed.summary,
                key_points: parsed.key_points,
                sentiment: parse_sentiment(&parsed.sentiment),
                complexity_score: parsed.complexity_score.clamp(0.0, 1.0),
                recommendations: parsed.recommendations,
                confidence_score: 0.8,
            }),
            None => Ok(fallback_summary(app)),
        }
    }
}

fn parse_reply(content: &str) -> Option<LlmSummaryReply> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    serde_json::from_str(&content[start..=end]).ok()
}

fn parse_sentiment(raw: &str) -> Sentiment {
    match raw.to_lowercase().as_str() {
        "positive" => Sentiment::Positive,
        "negative" => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

fn fallback_summary(app: &PlanningApplication) -> SummaryResult {
    let truncated: String = app.description.chars().take(200).collect();
    SummaryResult {
        summary: truncated,
        key_points: Vec::new(),
        sentiment: Sentiment::Neutral,
        complexity_score: 0.5,
        recommendations: Vec::new(),
        confidence_score: 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_extracts_embedded_json() {
        let content = "Sure!\n{\"summary\":\"s\",\"key_points\":[\"a\"],\"sentiment\":\"positive\",\"complexity_score\":0.4,\"recommendations\":[]}\nend";
        let parsed = parse_reply(content).unwrap();
        assert_eq!(parsed.summary, "s");
        assert_eq!(parsed.key_points, vec!["a".to_string()]);
    }

    #[test]
    fn unknown_sentiment_string_defaults_to_neutral() {
        assert_eq!(parse_sentiment("mixed"), Sentiment::Neutral);
        assert_eq!(parse_sentiment("POSITIVE"), Sentiment::Positive);
    }
}
