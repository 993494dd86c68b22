//! Shared types, error taxonomy, and cross-crate trait contracts for the
//! Planning Explorer AI platform.
//!
//! This crate has no I/O of its own: it defines the vocabulary
//! (`PlanningApplication`, `CacheEntry`, `BackgroundTask`, ...) and the trait
//! seams (`EsGateway`, `Cache`, `LlmClient`) that every other crate in the
//! workspace either implements or depends on.

pub mod cache;
pub mod cache_types;
pub mod config;
pub mod error;
pub mod es;
pub mod llm;
pub mod models;
pub mod task;

pub use cache::Cache;
pub use cache_types::{CacheEntry, CacheLevel, CacheStats, CacheType};
pub use config::AppConfig;
pub use error::{ErrorKind, PlanningError, Result};
pub use es::{
    BulkFailure, BulkOp, BulkResult, EsGateway, HealthStatus, KnnQuery, SearchAfterCursor,
    SearchHit, SearchRequest, SearchResponse,
};
pub use llm::{
    ChatMessage, CompletionRequest, CompletionStream, EmbeddingBatch, FinishReason, LlmClient,
    LlmResponse, Role, StreamChunk, TokenUsage, UsageStats,
};
pub use models::{
    normalize_text, normalized_text_hash, ApplicationStatus, Consultation, Decision, Document,
    GeoPoint, OpportunityBreakdown, Party, PlanningApplication, PlanningApplicationSummary,
    PublicComments, RiskAssessment, RiskLevel, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use task::{
    AiFeature, BackgroundTask, BatchProcessingResult, FeatureOutcome, ProcessingMode,
    ProcessingResult, TaskPriority, TaskStatus,
};
