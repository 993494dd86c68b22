//! NLP Query Parser (§4.5.3, C5): deterministic intent classification and
//! Elasticsearch query emission from free text.

use regex::Regex;
use serde_json::{json, Value as JsonValue};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Search,
    Filter,
    Compare,
    Analyze,
    Explore,
}

#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub intent: QueryIntent,
    pub query_type: String,
    pub confidence_score: f64,
    pub suggestions: Vec<String>,
    pub elasticsearch_query: JsonValue,
}

const KNOWN_STATUSES: &[&str] = &["approved", "rejected", "withdrawn", "under consideration", "submitted", "appealed"];

fn postcode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[A-Z]{1,2}\d[A-Z\d]?\s*\d[A-Z]{2}\b").unwrap())
}

fn date_phrase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(last month|last quarter|last year|this year|since \d{4}|in \d{4})\b").unwrap())
}

fn numeric_qualifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(over|under|above|below|at least|at most)\s+£?([\d,]+)\b").unwrap())
}

/// Parses free text into an intent plus a deterministic Elasticsearch query
/// body (§4.5.3).
#[must_use]
pub fn parse_query(query: &str) -> ParsedQuery {
    let lowered = query.to_lowercase();
    let intent = classify_intent(&lowered);

    let mut filters: Vec<JsonValue> = Vec::new();
    let mut ranges: Vec<JsonValue> = Vec::new();

    if let Some(status) = KNOWN_STATUSES.iter().find(|s| lowered.contains(*s)) {
        filters.push(json!({ "term": { "status": status.replace(' ', "_") } }));
    }

    if let Some(m) = postcode_regex().find(&lowered) {
        filters.push(json!({ "match": { "postcode": m.as_str().to_uppercase() } }));
    }

    if let Some(m) = date_phrase_regex().find(&lowered) {
        filters.push(json!({ "match": { "_date_phrase": m.as_str() } }));
    }

    if let Some(caps) = numeric_qualifier_regex().captures(&lowered) {
        let qualifier = &caps[1];
        let value: f64 = caps[2].replace(',', "").parse().unwrap_or(0.0);
        let op = match qualifier {
            "over" | "above" => "gt",
            "under" | "below" => "lt",
            "at least" => "gte",
            _ => "lte",
        };
        ranges.push(json!({ "range": { "project_value": { op: value } } }));
    }

    let mut bool_query = json!({
        "must": { "multi_match": { "query": query, "fields": ["description", "address", "development_type"] } }
    });
    if !filters.is_empty() || !ranges.is_empty() {
        let mut all_filters = filters.clone();
        all_filters.extend(ranges.clone());
        bool_query["filter"] = json!(all_filters);
    }

    let elasticsearch_query = json!({ "query": { "bool": bool_query } });

    let has_structured_hits = !filters.is_empty() || !ranges.is_empty();
    let confidence_score = if has_structured_hits { 0.85 } else { 0.6 };

    let mut suggestions = Vec::new();
    if !has_structured_hits {
        suggestions.push("Try adding a status, postcode, or value qualifier to narrow the search.".to_string());
    }

    ParsedQuery {
        intent,
        query_type: format!("{intent:?}").to_lowercase(),
        confidence_score,
        suggestions,
        elasticsearch_query,
    }
}

fn classify_intent(lowered: &str) -> QueryIntent {
    if lowered.contains("compare") || lowered.contains(" vs ") || lowered.contains("versus") {
        QueryIntent::Compare
    } else if lowered.contains("trend") || lowered.contains("analy") || lowered.contains("why") {
        QueryIntent::Analyze
    } else if lowered.contains("show me") || lowered.contains("explore") || lowered.contains("what's out there") {
        QueryIntent::Explore
    } else if KNOWN_STATUSES.iter().any(|s| lowered.contains(s)) || numeric_qualifier_regex().is_match(lowered) {
        QueryIntent::Filter
    } else {
        QueryIntent::Search
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_token_becomes_a_term_filter() {
        let parsed = parse_query("approved applications in Manchester");
        assert_eq!(parsed.intent, QueryIntent::Filter);
        assert!(parsed.elasticsearch_query["query"]["bool"]["filter"][0]["term"]["status"] == "approved");
    }

    #[test]
    fn value_qualifier_becomes_a_range_clause() {
        let parsed = parse_query("developments over £500,000");
        let clauses = parsed.elasticsearch_query["query"]["bool"]["filter"].as_array().unwrap();
        assert!(clauses.iter().any(|c| c["range"]["project_value"]["gt"] == 500_000.0));
    }

    #[test]
    fn compare_keyword_sets_compare_intent() {
        let parsed = parse_query("compare approval rates across authorities");
        assert_eq!(parsed.intent, QueryIntent::Compare);
    }

    #[test]
    fn plain_text_falls_back_to_search_with_lower_confidence() {
        let parsed = parse_query("new homes near the river");
        assert_eq!(parsed.intent, QueryIntent::Search);
        assert_eq!(parsed.confidence_score, 0.6);
        assert!(!parsed.suggestions.is_empty());
    }
}
