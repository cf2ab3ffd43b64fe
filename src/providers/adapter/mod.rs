use crate::costs::TokenUsage;
use crate::providers::base::{
    ChatRequest, LLMProvider, LLMResponse, Message, RetryConfig, ToolDefinition,
};
use crate::providers::cache::ResponseCache;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;


/// Model families that honor prompt-cache markers on message segments.
const PROMPT_CACHE_FAMILIES: &[&str] = &["claude"];

/// Uniform request surface over a chat-completions backend.
///
/// Wraps an [`LLMProvider`] with prompt-cache marker injection, the local
/// response cache, and retry policy. The agent loop only ever talks to this.
pub struct ModelAdapter {
    provider: Arc<dyn LLMProvider>,
    model: String,
    prompt_caching: bool,
    response_cache: Option<ResponseCache>,
    retry: RetryConfig,
    temperature: f32,
    max_tokens: u32,
}

impl ModelAdapter {
    pub fn new(provider: Arc<dyn LLMProvider>, model: String) -> Self {
        Self {
            provider,
            model,
            prompt_caching: false,
            response_cache: None,
            retry: RetryConfig::default(),
            temperature: 0.2,
            max_tokens: 8192,
        }
    }

    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.prompt_caching = enabled;
        self
    }

    pub fn with_response_cache(mut self, cache: Option<ResponseCache>) -> Self {
        self.response_cache = cache;
        self
    }

    pub fn with_retry(mut self, max_retries: usize) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One model call: cache markers, response-cache lookup, dispatch with
    /// retries, store-back.
    pub async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let prepared = self.prepare_messages_with_caching(messages);

        if let Some(cache) = &self.response_cache {
            if let Some(mut reply) = cache.get(&prepared, tools) {
                debug!("response cache hit; billing zero tokens");
                reply.usage = TokenUsage::default();
                return Ok(reply);
            }
        }

        let request = ChatRequest {
            messages: prepared.clone(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            model: Some(&self.model),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let reply = self
            .provider
            .chat_with_retry(request, Some(self.retry.clone()))
            .await?;

        if let Some(cache) = &self.response_cache {
            cache.set(&prepared, tools, &reply);
        }

        Ok(reply)
    }

    /// When prompt caching is enabled and the model family supports it, mark
    /// the system message so the backend anchors its prompt cache there. All
    /// other messages pass through unchanged.
    fn prepare_messages_with_caching(&self, messages: &[Message]) -> Vec<Message> {
        if !self.prompt_caching || !model_supports_prompt_cache(&self.model) {
            return messages.to_vec();
        }
        messages
            .iter()
            .map(|msg| {
                if msg.role == "system" {
                    let mut marked = msg.clone();
                    marked.cache_control = Some("ephemeral".to_string());
                    marked
                } else {
                    msg.clone()
                }
            })
            .collect()
    }
}

fn model_supports_prompt_cache(model: &str) -> bool {
    PROMPT_CACHE_FAMILIES
        .iter()
        .any(|family| model.starts_with(family))
}
