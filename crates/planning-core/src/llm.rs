//! The provider-agnostic LLM Client contract (§4.3, C3).

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request (§4.3).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub use_cache: bool,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.2,
            use_cache: true,
        }
    }

    /// Deterministic key for the prompt-cache: a hash of `system_prompt` followed
    /// by the concatenated messages (§4.3 "prompt-caching").
    #[must_use]
    pub fn cache_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        if let Some(system) = &self.system_prompt {
            hasher.update(system.as_bytes());
        }
        hasher.update(b"\0");
        for message in &self.messages {
            hasher.update(format!("{:?}", message.role).as_bytes());
            hasher.update(b":");
            hasher.update(message.content.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Why a completion stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    ContentFilter,
    Cached,
}

/// A completion result (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub tokens_used: TokenUsage,
    pub cost_usd: f64,
    pub finish_reason: FinishReason,
}

/// Token accounting for a single call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn total(self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A streamed text chunk, or a terminal error surfaced mid-stream (§4.3, §7).
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    Done { finish_reason: FinishReason, tokens_used: TokenUsage, cost_usd: f64 },
}

/// A boxed, `Send` stream of completion chunks.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// The result of an embedding call (§4.3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

/// Cumulative usage exposed by `GetUsageStats` (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub per_model_cost_usd: HashMap<String, f64>,
    pub per_model_tokens: HashMap<String, u64>,
}

/// Provider-agnostic completion + embedding client (§4.3, C3).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs a completion to finish, applying prompt-caching when
    /// `request.use_cache` is set.
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse>;

    /// Runs a completion as a lazy stream of chunks; cancellation happens by
    /// dropping the stream.
    async fn stream_complete(&self, request: CompletionRequest) -> Result<CompletionStream>;

    /// Embeds a batch of texts with the given model, preserving input order.
    async fn embed(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch>;

    /// Cumulative usage across every call made through this client.
    fn usage_stats(&self) -> UsageStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_identical_requests() {
        let a = CompletionRequest::new(vec![ChatMessage::user("hello")], "claude-haiku");
        let b = CompletionRequest::new(vec![ChatMessage::user("hello")], "claude-opus");
        assert_eq!(a.cache_key(), b.cache_key(), "model is not part of the cache key");
    }

    #[test]
    fn cache_key_differs_for_different_content() {
        let a = CompletionRequest::new(vec![ChatMessage::user("hello")], "m");
        let b = CompletionRequest::new(vec![ChatMessage::user("goodbye")], "m");
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn token_usage_total_sums_both_directions() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        };
        assert_eq!(usage.total(), 15);
    }
}
