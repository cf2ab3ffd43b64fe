//! Scripted provider for loop and adapter tests.

use crate::costs::TokenUsage;
use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, Message, ToolCallRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Provider that replays a queue of scripted replies and records every
/// request it receives.
pub struct MockProvider {
    replies: Mutex<VecDeque<anyhow::Result<LLMResponse>>>,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    pub fn new(replies: Vec<anyhow::Result<LLMResponse>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text_reply(content: &str) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse {
            content: Some(content.to_string()),
            tool_calls: vec![],
            finish_reason: Some("stop".to_string()),
            usage: TokenUsage::new(100, 20, 0),
        })
    }

    pub fn tool_reply(calls: &[(&str, &str, Value)]) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse {
            content: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCallRequest {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    arguments: args.clone(),
                })
                .collect(),
            finish_reason: Some("tool_calls".to_string()),
            usage: TokenUsage::new(100, 20, 0),
        })
    }

    /// Number of chat calls this provider has served.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        self.requests.lock().unwrap().push(req.messages);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("mock provider exhausted")))
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}
