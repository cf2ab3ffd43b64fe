use crate::costs::TokenUsage;
use crate::errors::ArchitectError;
use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, ToolCallRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;


const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Chat-completions backend over HTTP.
///
/// Speaks the OpenAI wire shape, which local gateways and most proxies also
/// accept; `base_url` points it anywhere.
pub struct OpenAiProvider {
    api_key: String,
    default_model: String,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        default_model: String,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            api_key,
            default_model,
            base_url: base_url.unwrap_or_else(|| API_URL.to_string()),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn build_payload(&self, req: &ChatRequest<'_>) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|msg| {
                // A cache-marked message carries its text as a structured
                // segment list so the backend can anchor its prompt cache.
                let content_value = if let Some(marker) = &msg.cache_control {
                    json!([{
                        "type": "text",
                        "text": msg.content,
                        "cache_control": {"type": marker}
                    }])
                } else {
                    json!(msg.content)
                };
                let mut m = json!({
                    "role": msg.role,
                    "content": content_value,
                });
                if let Some(tool_calls) = &msg.tool_calls {
                    m["tool_calls"] = json!(tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect::<Vec<_>>());
                }
                if let Some(tool_call_id) = &msg.tool_call_id {
                    m["tool_call_id"] = json!(tool_call_id);
                }
                m
            })
            .collect();

        let mut payload = json!({
            "model": req.model.unwrap_or(&self.default_model),
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        if let Some(tools) = &req.tools {
            if !tools.is_empty() {
                payload["tools"] = json!(tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }
        }

        payload
    }

    fn parse_response(body: &Value) -> Result<LLMResponse> {
        let choice = body["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("no choices in chat response")?;

        let message = &choice["message"];
        let content = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for tc in calls {
                if let Some(function) = tc["function"].as_object() {
                    let arguments = function["arguments"]
                        .as_str()
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCallRequest {
                        id: tc["id"].as_str().unwrap_or("").to_string(),
                        name: function["name"].as_str().unwrap_or("").to_string(),
                        arguments,
                    });
                }
            }
        }

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason: choice["finish_reason"].as_str().map(ToString::to_string),
            usage: extract_usage(&body["usage"]),
        })
    }

    fn classify_error(status: u16, retry_after: Option<u64>, body: &str) -> ArchitectError {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v["error"]["message"]
                    .as_str()
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| body.chars().take(200).collect());

        match status {
            429 => ArchitectError::RateLimit { retry_after },
            401 | 403 => ArchitectError::Provider {
                message: format!("authentication failed ({}): {}", status, detail),
                retryable: false,
            },
            408 | 500..=599 => ArchitectError::Provider {
                message: format!("transient backend error ({}): {}", status, detail),
                retryable: true,
            },
            _ => ArchitectError::Provider {
                message: format!("backend error ({}): {}", status, detail),
                retryable: false,
            },
        }
    }
}

/// Normalize provider usage shapes into [`TokenUsage`].
///
/// Cached input tokens appear as `prompt_tokens_details.cached_tokens`
/// (OpenAI) or `cache_read_input_tokens` (Anthropic-compatible gateways).
fn extract_usage(usage: &Value) -> TokenUsage {
    let cached = usage["prompt_tokens_details"]["cached_tokens"]
        .as_u64()
        .or_else(|| usage["cache_read_input_tokens"].as_u64())
        .unwrap_or(0);
    TokenUsage {
        prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        cached_input_tokens: cached,
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        let payload = self.build_payload(&req);
        debug!(
            model = req.model.unwrap_or(&self.default_model),
            messages = req.messages.len(),
            "dispatching chat request"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                // Connection-level failures are transient by definition.
                anyhow::Error::from(ArchitectError::Provider {
                    message: format!("request failed: {}", e),
                    retryable: true,
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status.as_u16(), retry_after, &body).into());
        }

        let body: Value = response
            .json()
            .await
            .context("failed to decode chat response body")?;
        Self::parse_response(&body)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
