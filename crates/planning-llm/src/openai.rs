//! OpenAI-style backend: chat completions and embeddings via `async-openai`
//! (§4.3, §4.4).

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, EmbeddingInput,
};
use async_openai::Client;
use planning_core::{CompletionRequest, FinishReason, PlanningError, Result, Role, TokenUsage};

const EMBEDDING_CHUNK_SIZE: usize = 512;

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
        }
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage, FinishReason)> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            let system_message = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(|e| PlanningError::internal(format!("invalid system message: {e}")))?;
            messages.push(system_message.into());
        }
        for m in &request.messages {
            if m.role == Role::System {
                continue;
            }
            let user_message = ChatCompletionRequestUserMessageArgs::default()
                .content(m.content.clone())
                .build()
                .map_err(|e| PlanningError::internal(format!("invalid chat message: {e}")))?;
            messages.push(user_message.into());
        }

        let openai_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(messages)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(|e| PlanningError::internal(format!("invalid completion request: {e}")))?;

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| PlanningError::ai_service_unavailable(format!("openai request failed: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PlanningError::ai_service_unavailable("openai returned no choices"))?;
        let content = choice.message.content.unwrap_or_default();
        let finish_reason = match choice.finish_reason {
            Some(async_openai::types::FinishReason::Length) => FinishReason::MaxTokens,
            Some(async_openai::types::FinishReason::ContentFilter) => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };
        let usage = response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u64::from(u.prompt_tokens),
                output_tokens: u64::from(u.completion_tokens),
            })
            .unwrap_or_default();

        Ok((content, usage, finish_reason))
    }

    pub async fn embed(&self, texts: &[String], model: &str) -> Result<(Vec<Vec<f32>>, u64)> {
        if texts.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        let mut total_tokens = 0u64;

        for chunk in texts.chunks(EMBEDDING_CHUNK_SIZE) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(model)
                .input(EmbeddingInput::StringArray(chunk.to_vec()))
                .build()
                .map_err(|e| PlanningError::internal(format!("invalid embedding request: {e}")))?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| PlanningError::ai_service_unavailable(format!("openai embedding request failed: {e}")))?;

            total_tokens += u64::from(response.usage.total_tokens);
            for data in response.data {
                vectors.push(data.embedding);
            }
        }

        Ok((vectors, total_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_embedding_chunk_size() {
        let texts: Vec<String> = (0..1000).map(|i| format!("text {i}")).collect();
        let chunks: Vec<_> = texts.chunks(EMBEDDING_CHUNK_SIZE).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), EMBEDDING_CHUNK_SIZE);
    }
}
