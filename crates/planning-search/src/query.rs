//! Compiles a [`SearchFilters`] + free-text query into the ES query bodies
//! described by §4.10's request-option mapping table.

use planning_core::SearchRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

const MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 20;

const AI_FIELDS: &[&str] = &[
    "ai_summary",
    "ai_key_points",
    "ai_sentiment",
    "complexity_score",
    "opportunity_score",
    "approval_probability",
    "opportunity_breakdown",
    "opportunity_rationale",
    "market_insights",
    "predicted_timeline",
    "risk_assessment",
    "risk_flags",
    "confidence_score",
];

const VECTOR_FIELDS: &[&str] = &["description_embedding", "full_content_embedding", "summary_embedding", "location_embedding"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Relevance,
    SubmissionDate,
    DecisionDate,
    OpportunityScore,
    ApprovalProbability,
    ProjectValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// The recognized filter set (§4.10's mapping table); every other filter-like
/// field a caller might send is silently ignored, not rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub authorities: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub development_types: Vec<String>,
    #[serde(default)]
    pub application_types: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub submission_date_from: Option<String>,
    #[serde(default)]
    pub submission_date_to: Option<String>,
    #[serde(default)]
    pub decision_date_from: Option<String>,
    #[serde(default)]
    pub decision_date_to: Option<String>,
    #[serde(default)]
    pub opportunity_score_min: Option<u8>,
    #[serde(default)]
    pub opportunity_score_max: Option<u8>,
    #[serde(default)]
    pub approval_probability_min: Option<f64>,
    #[serde(default)]
    pub approval_probability_max: Option<f64>,
    #[serde(default)]
    pub project_value_min: Option<f64>,
    #[serde(default)]
    pub project_value_max: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_true")]
    pub include_ai_fields: bool,
}

fn default_page() -> u64 {
    1
}
fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}
fn default_true() -> bool {
    true
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: SearchFilters::default(),
            sort_by: None,
            sort_order: None,
            page: default_page(),
            page_size: default_page_size(),
            include_ai_fields: true,
        }
    }
}

fn terms_clause(field: &str, values: &[String]) -> Option<JsonValue> {
    if values.is_empty() {
        None
    } else {
        Some(json!({ "terms": { field: values } }))
    }
}

fn range_clause(field: &str, from: Option<&str>, to: Option<&str>) -> Option<JsonValue> {
    if from.is_none() && to.is_none() {
        return None;
    }
    let mut range = serde_json::Map::new();
    if let Some(from) = from {
        range.insert("gte".to_string(), json!(from));
    }
    if let Some(to) = to {
        range.insert("lte".to_string(), json!(to));
    }
    Some(json!({ "range": { field: range } }))
}

fn numeric_range_clause(field: &str, min: Option<f64>, max: Option<f64>) -> Option<JsonValue> {
    if min.is_none() && max.is_none() {
        return None;
    }
    let mut range = serde_json::Map::new();
    if let Some(min) = min {
        range.insert("gte".to_string(), json!(min));
    }
    if let Some(max) = max {
        range.insert("lte".to_string(), json!(max));
    }
    Some(json!({ "range": { field: range } }))
}

/// Builds the `bool` filter clause list shared by text search, semantic search,
/// and aggregations (§4.10's filter mapping rows).
#[must_use]
pub fn compile_filters(filters: &SearchFilters) -> Vec<JsonValue> {
    let mut clauses = Vec::new();

    if let Some(c) = terms_clause("authority", &filters.authorities) {
        clauses.push(c);
    }
    if let Some(c) = terms_clause("status", &filters.statuses) {
        clauses.push(c);
    }
    if let Some(c) = terms_clause("development_type", &filters.development_types) {
        clauses.push(c);
    }
    if let Some(c) = terms_clause("application_type", &filters.application_types) {
        clauses.push(c);
    }
    if let Some(c) = terms_clause("decision", &filters.decisions) {
        clauses.push(c);
    }
    if let Some(postcode) = &filters.postcode {
        clauses.push(json!({ "prefix": { "postcode": postcode } }));
    }
    if let Some(c) = range_clause("submission_date", filters.submission_date_from.as_deref(), filters.submission_date_to.as_deref()) {
        clauses.push(c);
    }
    if let Some(c) = range_clause("decision_date", filters.decision_date_from.as_deref(), filters.decision_date_to.as_deref()) {
        clauses.push(c);
    }
    if let Some(c) = numeric_range_clause("opportunity_score", filters.opportunity_score_min.map(f64::from), filters.opportunity_score_max.map(f64::from)) {
        clauses.push(c);
    }
    if let Some(c) = numeric_range_clause("approval_probability", filters.approval_probability_min, filters.approval_probability_max) {
        clauses.push(c);
    }
    if let Some(c) = numeric_range_clause("project_value", filters.project_value_min, filters.project_value_max) {
        clauses.push(c);
    }
    if let (Some(lat), Some(lon), Some(radius_km)) = (filters.lat, filters.lon, filters.radius_km) {
        clauses.push(json!({
            "geo_distance": {
                "distance": format!("{radius_km}km"),
                "location": { "lat": lat, "lon": lon },
            }
        }));
    }

    clauses
}

fn multi_match(query_text: &str) -> JsonValue {
    json!({
        "multi_match": {
            "query": query_text,
            "fields": ["description^2", "proposal^1.5", "address", "ai_summary^1.2"],
        }
    })
}

fn sort_clause(sort_by: Option<SortBy>, sort_order: SortOrder) -> Vec<JsonValue> {
    let order = match sort_order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    };
    match sort_by.unwrap_or(SortBy::Relevance) {
        SortBy::Relevance => vec![json!({ "_score": order })],
        SortBy::SubmissionDate => vec![json!({ "submission_date": order })],
        SortBy::DecisionDate => vec![json!({ "decision_date": order })],
        SortBy::OpportunityScore => vec![json!({ "opportunity_score": order })],
        SortBy::ApprovalProbability => vec![json!({ "approval_probability": order })],
        SortBy::ProjectValue => vec![json!({ "project_value": order })],
    }
}

fn source_fields(include_ai_fields: bool) -> Option<Vec<String>> {
    // Vector fields never leave the gateway, independent of `include_ai_fields`.
    let excluded = if include_ai_fields {
        VECTOR_FIELDS.iter().copied().collect::<Vec<_>>()
    } else {
        AI_FIELDS.iter().chain(VECTOR_FIELDS.iter()).copied().collect()
    };
    Some(excluded.into_iter().map(|f| format!("-{f}")).collect())
}

/// `CompileQuery` (§4.10): converts a [`SearchQuery`] into a [`planning_core::SearchRequest`].
#[must_use]
pub fn compile(request: &SearchQuery) -> SearchRequest {
    let must = if request.query.trim().is_empty() {
        json!({ "match_all": {} })
    } else {
        multi_match(&request.query)
    };

    let filter_clauses = compile_filters(&request.filters);
    let query = json!({
        "bool": {
            "must": [must],
            "filter": filter_clauses,
        }
    });

    let page = request.page.max(1);
    let page_size = request.page_size.min(MAX_PAGE_SIZE).max(1);

    SearchRequest {
        query: Some(query),
        sort: sort_clause(request.sort_by, request.sort_order.unwrap_or(SortOrder::Desc)),
        from: (page - 1) * page_size,
        size: page_size,
        source_fields: source_fields(request.include_ai_fields),
        knn: None,
        aggregations: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_text_becomes_match_all() {
        let request = SearchQuery::default();
        let compiled = compile(&request);
        assert_eq!(compiled.query.unwrap()["bool"]["must"][0], json!({ "match_all": {} }));
    }

    #[test]
    fn free_text_becomes_multi_match() {
        let mut request = SearchQuery::default();
        request.query = "retail extension".to_string();
        let compiled = compile(&request);
        assert!(compiled.query.unwrap()["bool"]["must"][0]["multi_match"].is_object());
    }

    #[test]
    fn page_size_is_capped_at_one_hundred() {
        let mut request = SearchQuery::default();
        request.page_size = 500;
        let compiled = compile(&request);
        assert_eq!(compiled.size, 100);
    }

    #[test]
    fn page_two_computes_correct_from_offset() {
        let mut request = SearchQuery::default();
        request.page = 3;
        request.page_size = 20;
        let compiled = compile(&request);
        assert_eq!(compiled.from, 40);
    }

    #[test]
    fn authorities_filter_becomes_terms_clause() {
        let filters = SearchFilters { authorities: vec!["Camden".to_string()], ..Default::default() };
        let clauses = compile_filters(&filters);
        assert_eq!(clauses[0], json!({ "terms": { "authority": ["Camden"] } }));
    }

    #[test]
    fn geo_filter_requires_all_three_components() {
        let filters = SearchFilters { lat: Some(51.5), ..Default::default() };
        assert!(compile_filters(&filters).is_empty());
    }

    #[test]
    fn excluding_ai_fields_also_excludes_vector_fields() {
        let mut request = SearchQuery::default();
        request.include_ai_fields = false;
        let compiled = compile(&request);
        let fields = compiled.source_fields.unwrap();
        assert!(fields.iter().any(|f| f == "-description_embedding"));
        assert!(fields.iter().any(|f| f == "-opportunity_score"));
    }

    #[test]
    fn vector_fields_are_excluded_even_when_ai_fields_are_included() {
        let mut request = SearchQuery::default();
        request.include_ai_fields = true;
        let compiled = compile(&request);
        let fields = compiled.source_fields.unwrap();
        assert!(fields.iter().any(|f| f == "-description_embedding"));
        assert!(!fields.iter().any(|f| f == "-opportunity_score"));
    }
}
