//! Anthropic-style completion backend: raw `reqwest` + SSE streaming, grounded
//! on the Anthropic Messages API shape (§4.3).

use async_stream::stream;
use futures::StreamExt;
use planning_core::{CompletionRequest, CompletionStream, FinishReason, PlanningError, Result, Role, StreamChunk, TokenUsage};
use serde::Deserialize;
use serde_json::json;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    http: reqwest::Client,
    api_key: String,
}

impl AnthropicBackend {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    fn request_body(request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "user",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = Self::request_body(request, stream);
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PlanningError::ai_service_unavailable(format!("anthropic request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body_text = response.text().await.unwrap_or_default();
            return Err(match (status.as_u16(), retry_after) {
                (429, Some(secs)) => PlanningError::rate_limit(format!("anthropic rate limited: {body_text}"), secs),
                (429, None) => PlanningError::rate_limit(format!("anthropic rate limited: {body_text}"), 30),
                _ => PlanningError::ai_service_unavailable(format!("anthropic error {status}: {body_text}")),
            });
        }
        Ok(response)
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage, FinishReason)> {
        let response = self.send(request, false).await?;
        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| PlanningError::ai_service_unavailable(format!("failed to parse anthropic response: {e}")))?;

        let content = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");
        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        };
        let finish_reason = match parsed.stop_reason.as_deref() {
            Some("max_tokens") => FinishReason::MaxTokens,
            _ => FinishReason::Stop,
        };
        Ok((content, usage, finish_reason))
    }

    pub async fn stream_complete(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let response = self.send(&request, true).await?;
        let byte_stream = response.bytes_stream();
        let mut event_stream = byte_stream.eventsource();

        let out = stream! {
            let mut input_tokens = 0u64;
            let mut output_tokens = 0u64;
            let mut finish_reason = FinishReason::Stop;

            while let Some(event) = event_stream.next().await {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => {
                        yield Err(PlanningError::ai_service_unavailable(format!("anthropic SSE error: {e}")));
                        return;
                    }
                };
                let Ok(parsed) = serde_json::from_str::<AnthropicStreamEvent>(&event.data) else {
                    continue;
                };
                match parsed {
                    AnthropicStreamEvent::ContentBlockDelta { delta } => {
                        yield Ok(StreamChunk::Text(delta.text));
                    }
                    AnthropicStreamEvent::MessageDelta { usage, delta } => {
                        output_tokens = usage.output_tokens;
                        if delta.stop_reason.as_deref() == Some("max_tokens") {
                            finish_reason = FinishReason::MaxTokens;
                        }
                    }
                    AnthropicStreamEvent::MessageStart { message } => {
                        input_tokens = message.usage.input_tokens;
                    }
                    AnthropicStreamEvent::Other => {}
                }
            }

            yield Ok(StreamChunk::Done {
                finish_reason,
                tokens_used: TokenUsage { input_tokens, output_tokens },
                cost_usd: 0.0,
            });
        };

        Ok(Box::pin(out))
    }
}

use eventsource_stream::Eventsource;

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartPayload },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: TextDelta },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: StopDelta, usage: Usage },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStartPayload {
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct StopDelta {
    stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use planning_core::ChatMessage;

    #[test]
    fn request_body_carries_system_prompt_and_messages() {
        let mut request = CompletionRequest::new(vec![ChatMessage::user("hello")], "claude-3-5-haiku-20241022");
        request.system_prompt = Some("be terse".to_string());
        let body = AnthropicBackend::request_body(&request, false);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn streaming_request_sets_stream_flag() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")], "claude-3-5-haiku-20241022");
        let body = AnthropicBackend::request_body(&request, true);
        assert_eq!(body["stream"], true);
    }
}
