//! [`BackgroundTask`] and processing-result types (§3.1, §4.6, §4.7).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The AI feature set the orchestrator can run per application (§4.6, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiFeature {
    OpportunityScoring,
    Summarization,
    Embeddings,
    MarketContext,
}

/// The processing depth requested of the orchestrator (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Fast,
    Standard,
    Comprehensive,
    Batch,
}

impl ProcessingMode {
    /// The default feature set for this mode when the caller does not specify one
    /// explicitly (§4.6 step 1).
    #[must_use]
    pub fn default_features(self) -> HashSet<AiFeature> {
        use AiFeature::{Embeddings, MarketContext, OpportunityScoring, Summarization};
        match self {
            ProcessingMode::Fast => [OpportunityScoring].into_iter().collect(),
            ProcessingMode::Standard => {
                [OpportunityScoring, Summarization, MarketContext].into_iter().collect()
            }
            ProcessingMode::Comprehensive => {
                [OpportunityScoring, Summarization, Embeddings, MarketContext]
                    .into_iter()
                    .collect()
            }
            ProcessingMode::Batch => [OpportunityScoring, Embeddings].into_iter().collect(),
        }
    }

    /// Cache TTL for a result produced under this mode (§4.6 step 5).
    #[must_use]
    pub fn cache_ttl(self, features: &HashSet<AiFeature>) -> chrono::Duration {
        if features.contains(&AiFeature::Embeddings) {
            chrono::Duration::hours(72)
        } else if matches!(self, ProcessingMode::Comprehensive) {
            chrono::Duration::hours(48)
        } else {
            chrono::Duration::hours(24)
        }
    }

    /// Cache level for a result produced under this mode (§4.6 step 5).
    #[must_use]
    pub fn cache_level(self) -> crate::cache_types::CacheLevel {
        if matches!(self, ProcessingMode::Comprehensive) {
            crate::cache_types::CacheLevel::High
        } else {
            crate::cache_types::CacheLevel::Normal
        }
    }
}

/// Output of a single feature's run inside a [`ProcessingResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub feature: AiFeature,
    pub payload: serde_json::Value,
    pub confidence: f64,
}

/// Per-application output of the AI Orchestrator (§3.1, §8 invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub application_id: String,
    pub features_processed: Vec<AiFeature>,
    pub results: HashMap<String, serde_json::Value>,
    pub processing_time_ms: u64,
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence_scores: HashMap<String, f64>,
    pub generated_at: DateTime<Utc>,
    /// Set when this result was served from the cache rather than freshly computed.
    #[serde(default)]
    pub cached: bool,
}

impl ProcessingResult {
    /// `mean` of `confidence_scores`, or `0.5` when empty (§4.6 step 4).
    #[must_use]
    pub fn overall_confidence(&self) -> f64 {
        if self.confidence_scores.is_empty() {
            0.5
        } else {
            self.confidence_scores.values().sum::<f64>() / self.confidence_scores.len() as f64
        }
    }
}

/// Aggregate result of `ProcessBatch` (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessingResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub per_feature_counts: HashMap<String, usize>,
    pub average_confidence: f64,
    pub p50_processing_time_ms: u64,
    pub p95_processing_time_ms: u64,
    pub results: Vec<ProcessingResult>,
}

/// Priority of a [`BackgroundTask`] (§3.1, §4.7). Ordinal: Urgent=1 ... Low=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent = 1,
    High = 2,
    Normal = 3,
    Low = 4,
}

/// Lifecycle status of a [`BackgroundTask`] (§4.7's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// A unit of work processed by the Background Processor (§3.1, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub application_ids: Vec<String>,
    pub processing_mode: ProcessingMode,
    pub features: HashSet<AiFeature>,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub callback_url: Option<String>,
}

impl BackgroundTask {
    /// Creates a new, `Pending` task with `progress = 0.0`.
    #[must_use]
    pub fn new(
        task_type: impl Into<String>,
        priority: TaskPriority,
        application_ids: Vec<String>,
        processing_mode: ProcessingMode,
        features: HashSet<AiFeature>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            status: TaskStatus::Pending,
            priority,
            application_ids,
            processing_mode,
            features,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            result: None,
            error_message: None,
            callback_url,
        }
    }

    /// The queue ordinal: `priority_ordinal + retry_count`, so repeated failures
    /// degrade behind fresh work of the same nominal priority (§4.7).
    #[must_use]
    pub fn queue_ordinal(&self) -> u32 {
        self.priority as u32 + self.retry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_mode_defaults_to_opportunity_scoring_only() {
        let features = ProcessingMode::Fast.default_features();
        assert_eq!(features, [AiFeature::OpportunityScoring].into_iter().collect());
    }

    #[test]
    fn comprehensive_mode_includes_embeddings() {
        let features = ProcessingMode::Comprehensive.default_features();
        assert!(features.contains(&AiFeature::Embeddings));
        assert_eq!(features.len(), 4);
    }

    #[test]
    fn ttl_is_72h_when_embeddings_present_regardless_of_mode() {
        let features: HashSet<_> = [AiFeature::Embeddings].into_iter().collect();
        assert_eq!(
            ProcessingMode::Fast.cache_ttl(&features),
            chrono::Duration::hours(72)
        );
    }

    #[test]
    fn ttl_is_48h_for_comprehensive_without_embeddings() {
        let features: HashSet<_> = [AiFeature::Summarization].into_iter().collect();
        assert_eq!(
            ProcessingMode::Comprehensive.cache_ttl(&features),
            chrono::Duration::hours(48)
        );
    }

    #[test]
    fn overall_confidence_defaults_to_half_when_empty() {
        let result = ProcessingResult {
            application_id: "APP-1".to_string(),
            features_processed: vec![],
            results: HashMap::new(),
            processing_time_ms: 0,
            success: true,
            errors: vec![],
            warnings: vec![],
            confidence_scores: HashMap::new(),
            generated_at: Utc::now(),
            cached: false,
        };
        assert_eq!(result.overall_confidence(), 0.5);
    }

    #[test]
    fn queue_ordinal_degrades_with_retries() {
        let mut task = BackgroundTask::new(
            "ai_processing",
            TaskPriority::Urgent,
            vec!["APP-1".to_string()],
            ProcessingMode::Fast,
            ProcessingMode::Fast.default_features(),
            None,
        );
        let fresh_urgent = task.queue_ordinal();
        task.retry_count = 5;
        assert!(task.queue_ordinal() > fresh_urgent);
    }

    #[test]
    fn priority_ordering_urgent_first() {
        assert!(TaskPriority::Urgent < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::Low);
    }
}
