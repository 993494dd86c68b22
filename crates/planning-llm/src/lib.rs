//! The LLM Client (§4.3, C3): a provider-agnostic completion and embedding
//! client that unifies Anthropic- and OpenAI-style backends behind
//! [`planning_core::LlmClient`], with prompt-caching, cost accounting, and an
//! optional daily token budget.

mod anthropic;
mod cost;
mod openai;

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use planning_core::{CompletionRequest, CompletionStream, EmbeddingBatch, FinishReason, LlmClient, LlmResponse, PlanningError, Result, StreamChunk, TokenUsage, UsageStats};
use tracing::warn;

use anthropic::AnthropicBackend;
use cost::{estimate_cost, pricing_table};
use openai::OpenAiBackend;

fn is_anthropic_model(model: &str) -> bool {
    model.starts_with("claude")
}

/// Unifies the Anthropic and OpenAI provider families behind one interface
/// (§4.3). Routes by model-name prefix: `claude*` goes to Anthropic, anything
/// else (including embedding models) goes to OpenAI.
pub struct PlanningLlmClient {
    anthropic: Option<AnthropicBackend>,
    openai: Option<OpenAiBackend>,
    pricing: HashMap<&'static str, (f64, f64)>,
    prompt_cache: DashMap<String, LlmResponse>,
    usage: Mutex<UsageStats>,
    daily_token_budget: Option<u64>,
}

impl PlanningLlmClient {
    #[must_use]
    pub fn new(anthropic_api_key: Option<String>, openai_api_key: Option<String>, daily_token_budget: Option<u64>) -> Self {
        Self {
            anthropic: anthropic_api_key.map(AnthropicBackend::new),
            openai: openai_api_key.map(OpenAiBackend::new),
            pricing: pricing_table(),
            prompt_cache: DashMap::new(),
            usage: Mutex::new(UsageStats::default()),
            daily_token_budget,
        }
    }

    fn provider_name(model: &str) -> &'static str {
        if is_anthropic_model(model) {
            "anthropic"
        } else {
            "openai"
        }
    }

    fn check_budget(&self) -> Result<()> {
        if let Some(budget) = self.daily_token_budget {
            let total = self.usage.lock().total_tokens;
            if total >= budget {
                return Err(PlanningError::budget_exceeded(format!(
                    "daily token budget of {budget} tokens has been reached ({total} used)"
                )));
            }
        }
        Ok(())
    }

    fn record_usage(&self, model: &str, tokens: TokenUsage, cost_usd: f64) {
        let mut usage = self.usage.lock();
        usage.total_cost_usd += cost_usd;
        usage.total_tokens += tokens.total();
        *usage.per_model_cost_usd.entry(model.to_string()).or_insert(0.0) += cost_usd;
        *usage.per_model_tokens.entry(model.to_string()).or_insert(0) += tokens.total();
    }

    async fn dispatch_complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage, FinishReason)> {
        if is_anthropic_model(&request.model) {
            let backend = self
                .anthropic
                .as_ref()
                .ok_or_else(|| PlanningError::ai_service_unavailable("no anthropic API key configured"))?;
            backend.complete(request).await
        } else {
            let backend = self
                .openai
                .as_ref()
                .ok_or_else(|| PlanningError::ai_service_unavailable("no openai API key configured"))?;
            backend.complete(request).await
        }
    }
}

#[async_trait]
impl LlmClient for PlanningLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse> {
        if request.use_cache {
            if let Some(cached) = self.prompt_cache.get(&request.cache_key()) {
                return Ok(LlmResponse {
                    content: cached.content.clone(),
                    model: request.model,
                    provider: cached.provider.clone(),
                    tokens_used: TokenUsage::default(),
                    cost_usd: 0.0,
                    finish_reason: FinishReason::Cached,
                });
            }
        }

        self.check_budget()?;

        let (content, tokens_used, finish_reason) = self.dispatch_complete(&request).await?;
        let cost_usd = estimate_cost(&request.model, tokens_used, &self.pricing);
        if !self.pricing.contains_key(request.model.as_str()) {
            warn!(model = %request.model, "no pricing entry for model, cost recorded as 0");
        }
        self.record_usage(&request.model, tokens_used, cost_usd);

        let response = LlmResponse {
            content,
            model: request.model.clone(),
            provider: Self::provider_name(&request.model).to_string(),
            tokens_used,
            cost_usd,
            finish_reason,
        };

        if request.use_cache {
            self.prompt_cache.insert(request.cache_key(), response.clone());
        }

        Ok(response)
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<CompletionStream> {
        self.check_budget()?;

        if is_anthropic_model(&request.model) {
            let backend = self
                .anthropic
                .as_ref()
                .ok_or_else(|| PlanningError::ai_service_unavailable("no anthropic API key configured"))?;
            let model = request.model.clone();
            let pricing = self.pricing.clone();
            let stream = backend.stream_complete(request).await?;
            Ok(Box::pin(async_stream::stream! {
                futures::pin_mut!(stream);
                use futures::StreamExt;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(StreamChunk::Done { finish_reason, tokens_used, .. }) => {
                            let cost_usd = estimate_cost(&model, tokens_used, &pricing);
                            yield Ok(StreamChunk::Done { finish_reason, tokens_used, cost_usd });
                        }
                        other => yield other,
                    }
                }
            }))
        } else {
            Err(PlanningError::ai_service_unavailable(
                "streaming is only implemented for anthropic-family models",
            ))
        }
    }

    async fn embed(&self, texts: &[String], model: &str) -> Result<EmbeddingBatch> {
        self.check_budget()?;

        let backend = self
            .openai
            .as_ref()
            .ok_or_else(|| PlanningError::ai_service_unavailable("no openai API key configured for embeddings"))?;
        let (vectors, tokens_used) = backend.embed(texts, model).await?;
        let cost_usd = estimate_cost(
            model,
            TokenUsage {
                input_tokens: tokens_used,
                output_tokens: 0,
            },
            &self.pricing,
        );
        self.record_usage(model, TokenUsage { input_tokens: tokens_used, output_tokens: 0 }, cost_usd);

        Ok(EmbeddingBatch {
            vectors,
            tokens_used,
            cost_usd,
        })
    }

    fn usage_stats(&self) -> UsageStats {
        self.usage.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planning_core::ChatMessage;

    fn client() -> PlanningLlmClient {
        PlanningLlmClient::new(Some("test-anthropic-key".to_string()), Some("test-openai-key".to_string()), Some(1_000))
    }

    #[test]
    fn routes_claude_models_to_anthropic() {
        assert_eq!(PlanningLlmClient::provider_name("claude-3-5-haiku-20241022"), "anthropic");
        assert_eq!(PlanningLlmClient::provider_name("gpt-4o"), "openai");
    }

    #[test]
    fn budget_check_passes_under_the_limit() {
        let client = client();
        assert!(client.check_budget().is_ok());
    }

    #[test]
    fn budget_check_fails_once_limit_is_reached() {
        let client = client();
        client.record_usage("claude-3-5-haiku-20241022", TokenUsage { input_tokens: 1_000, output_tokens: 0 }, 0.001);
        let err = client.check_budget().unwrap_err();
        assert_eq!(err.error_code(), "BUDGET_EXCEEDED");
    }

    #[test]
    fn usage_stats_accumulate_across_models() {
        let client = client();
        client.record_usage("claude-3-5-haiku-20241022", TokenUsage { input_tokens: 100, output_tokens: 50 }, 0.01);
        client.record_usage("gpt-4o", TokenUsage { input_tokens: 200, output_tokens: 100 }, 0.02);
        let stats = client.usage_stats();
        assert_eq!(stats.total_tokens, 450);
        assert!((stats.total_cost_usd - 0.03).abs() < 1e-9);
        assert_eq!(stats.per_model_tokens["gpt-4o"], 300);
    }

    #[tokio::test]
    async fn complete_without_any_configured_backend_fails() {
        let client = PlanningLlmClient::new(None, None, None);
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")], "claude-3-5-haiku-20241022");
        let err = client.complete(request).await.unwrap_err();
        assert_eq!(err.error_code(), "AI_SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn embedding_without_openai_key_fails() {
        let client = PlanningLlmClient::new(Some("key".to_string()), None, None);
        let err = client.embed(&["hello".to_string()], "text-embedding-3-small").await.unwrap_err();
        assert_eq!(err.error_code(), "AI_SERVICE_UNAVAILABLE");
    }
}
