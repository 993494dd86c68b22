//! An in-memory stand-in for [`LlmClient`]: canned completions and
//! deterministic embeddings, so AI-feature tests never make a network call.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use planning_core::{
    ChatMessage, CompletionRequest, CompletionStream, EmbeddingBatch, FinishReason, LlmClient,
    LlmResponse, Result, StreamChunk, TokenUsage, UsageStats,
};

/// Replays a queue of canned completion replies (FIFO) and derives a
/// deterministic unit-length embedding from each input text's byte content, so
/// the same text always embeds to the same vector within a test run.
pub struct FakeLlmClient {
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    embedding_dimensions: usize,
    cost_per_call_usd: f64,
    usage: Mutex<UsageStats>,
}

impl FakeLlmClient {
    #[must_use]
    pub fn new(embedding_dimensions: usize) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: "This is a fake completion.".to_string(),
            embedding_dimensions,
            cost_per_call_usd: 0.001,
            usage: Mutex::new(UsageStats::default()),
        }
    }

    /// Queues a reply to be returned by the next `complete`/`stream_complete` call.
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(reply.into());
    }

    fn next_reply(&self) -> String {
        self.replies.lock().pop_front().unwrap_or_else(|| self.default_reply.clone())
    }

    fn record_usage(&self, model: &str, tokens: TokenUsage, cost_usd: f64) {
        let mut usage = self.usage.lock();
        usage.total_tokens += tokens.total();
        usage.total_cost_usd += cost_usd;
        *usage.per_model_tokens.entry(model.to_string()).or_insert(0) += tokens.total();
        *usage.per_model_cost_usd.entry(model.to_string()).or_insert(0.0) += cost_usd;
    }

    /// Derives a deterministic unit-length vector from `text`'s bytes, so two
    /// calls with the same text embed identically and different text embeds
    /// differently — without pulling in an actual model.
    #[must_use]
    pub fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let seed = planning_core::normalized_text_hash(text);
        let seed_bytes = seed.as_bytes();
        let mut vector: Vec<f32> = (0..self.embedding_dimensions)
            .map(|i| {
                let byte = seed_bytes[i % seed_bytes.len()];
                (f32::from(byte) / 255.0) - 0.5
            })
            .collect();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse> {
        let content = self.next_reply();
        let tokens_used = TokenUsage {
            input_tokens: request.messages.iter().map(|m| m.content.len() as u64 / 4).sum(),
            output_tokens: content.len() as u64 / 4,
        };
        self.record_usage(&request.model, tokens_used, self.cost_per_call_usd);
        Ok(LlmResponse {
            content,
            model: request.model,
            provider: "fake".to_string(),
            tokens_used,
            cost_usd: self.cost_per_call_usd,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let response = self.complete(request).await?;
        let chunks = vec![
            Ok(StreamChunk::Text(response.content)),
            Ok(StreamChunk::Done {
                finish_reason: response.finish_reason,
                tokens_used: response.tokens_used,
                cost_usd: response.cost_usd,
            }),
        ];
        let boxed: CompletionStream = Box::pin(stream::iter(chunks)) as Pin<Box<_>>;
        Ok(boxed)
    }

    async fn embed(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch> {
        let vectors: Vec<Vec<f32>> = texts.iter().map(|text| self.deterministic_embedding(text)).collect();
        let tokens_used: u64 = texts.iter().map(|t| t.len() as u64 / 4).sum();
        let cost_usd = self.cost_per_call_usd * texts.len() as f64;
        self.record_usage(model, TokenUsage { input_tokens: tokens_used, output_tokens: 0 }, cost_usd);
        Ok(EmbeddingBatch { vectors, tokens_used, cost_usd })
    }

    fn usage_stats(&self) -> UsageStats {
        self.usage.lock().clone()
    }
}

#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage::user(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic_for_identical_text() {
        let client = FakeLlmClient::new(8);
        let a = client.embed(&["hello world".to_string()], "m").await.unwrap();
        let b = client.embed(&["hello world".to_string()], "m").await.unwrap();
        assert_eq!(a.vectors, b.vectors);
    }

    #[tokio::test]
    async fn embed_differs_for_different_text() {
        let client = FakeLlmClient::new(8);
        let a = client.embed(&["hello".to_string()], "m").await.unwrap();
        let b = client.embed(&["goodbye".to_string()], "m").await.unwrap();
        assert_ne!(a.vectors, b.vectors);
    }

    #[tokio::test]
    async fn queued_reply_is_returned_once() {
        let client = FakeLlmClient::new(8);
        client.queue_reply("specific answer");
        let request = CompletionRequest::new(vec![user_message("question")], "m");
        let response = client.complete(request).await.unwrap();
        assert_eq!(response.content, "specific answer");
    }

    #[tokio::test]
    async fn usage_accumulates_across_calls() {
        let client = FakeLlmClient::new(8);
        client.embed(&["a".to_string()], "m").await.unwrap();
        client.embed(&["b".to_string()], "m").await.unwrap();
        assert_eq!(client.usage_stats().per_model_cost_usd["m"], client.cost_per_call_usd * 2.0);
    }
}
