use crate::config::McpServerConfig;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg(test)]
mod tests;

/// Consecutive failures that open the circuit breaker.
const CIRCUIT_THRESHOLD: u32 = 3;
/// How long a tripped circuit stays open before the next attempt.
const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(60);

/// A tool definition as returned by `tools/list`.
#[derive(Debug, Clone)]
pub struct McpToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Remote tools are sensitive by default; server metadata can opt a
    /// read-only tool out via `annotations.readOnlyHint`.
    pub sensitive: bool,
}

/// Flattened result of a `tools/call`.
#[derive(Debug, Clone)]
pub struct McpCallResult {
    pub content: String,
    pub is_error: bool,
}

/// JSON-RPC 2.0 client for one MCP server, over HTTP.
///
/// Holds a keep-alive connection; request ids are allocated under a mutex so
/// concurrent calls through a shared client never collide.
pub struct McpClient {
    server_name: String,
    url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
    next_id: Mutex<u64>,
    consecutive_failures: AtomicU32,
    circuit_open_until: Mutex<Option<Instant>>,
}

impl McpClient {
    pub fn new(config: &McpServerConfig) -> Self {
        Self {
            server_name: config.name.clone(),
            url: config.url.clone(),
            token: config.resolve_token(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            next_id: Mutex::new(1),
            consecutive_failures: AtomicU32::new(0),
            circuit_open_until: Mutex::new(None),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn call_timeout(&self) -> Duration {
        self.timeout
    }

    fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = *next;
        *next += 1;
        id
    }

    fn circuit_check(&self) -> Result<()> {
        let open_until = *self
            .circuit_open_until
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(until) = open_until {
            if Instant::now() < until {
                anyhow::bail!(
                    "MCP server '{}' circuit open after repeated failures; retrying later",
                    self.server_name
                );
            }
        }
        Ok(())
    }

    fn record_outcome(&self, success: bool) {
        if success {
            self.consecutive_failures.store(0, Ordering::Release);
            *self
                .circuit_open_until
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
            if failures >= CIRCUIT_THRESHOLD {
                warn!(
                    "MCP server '{}' failed {} consecutive calls; opening circuit",
                    self.server_name, failures
                );
                *self
                    .circuit_open_until
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) =
                    Some(Instant::now() + CIRCUIT_COOLDOWN);
            }
        }
    }

    /// One JSON-RPC 2.0 round trip.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        self.circuit_check()?;

        let id = self.allocate_id();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(server = %self.server_name, method, id, "mcp rpc call");

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let outcome = async {
            let response = request
                .send()
                .await
                .with_context(|| format!("MCP server '{}' unreachable", self.server_name))?;
            let status = response.status();
            anyhow::ensure!(
                status.is_success(),
                "MCP server '{}' returned HTTP {}",
                self.server_name,
                status
            );
            let body: Value = response
                .json()
                .await
                .with_context(|| format!("MCP server '{}' sent invalid JSON", self.server_name))?;
            if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
                anyhow::bail!(
                    "MCP server '{}' RPC error {}: {}",
                    self.server_name,
                    error["code"].as_i64().unwrap_or(0),
                    error["message"].as_str().unwrap_or("unknown error")
                );
            }
            Ok(body["result"].clone())
        }
        .await;

        self.record_outcome(outcome.is_ok());
        outcome
    }

    /// Enumerate the server's tools via `tools/list`.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        let result = self.rpc("tools/list", json!({})).await?;
        let tools = result["tools"]
            .as_array()
            .context("tools/list result has no 'tools' array")?;

        Ok(tools
            .iter()
            .filter_map(|tool| {
                let name = tool["name"].as_str()?;
                let read_only = tool["annotations"]["readOnlyHint"]
                    .as_bool()
                    .unwrap_or(false);
                Some(McpToolDefinition {
                    name: name.to_string(),
                    description: tool["description"].as_str().unwrap_or("").to_string(),
                    input_schema: if tool["inputSchema"].is_object() {
                        tool["inputSchema"].clone()
                    } else {
                        json!({"type": "object", "properties": {}})
                    },
                    sensitive: !read_only,
                })
            })
            .collect())
    }

    /// Invoke a remote tool via `tools/call` and flatten its content blocks.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpCallResult> {
        let result = self
            .rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        let is_error = result["isError"].as_bool().unwrap_or(false);
        let mut content = String::new();
        if let Some(blocks) = result["content"].as_array() {
            for block in blocks {
                if !content.is_empty() {
                    content.push('\n');
                }
                match block["type"].as_str() {
                    Some("text") => content.push_str(block["text"].as_str().unwrap_or("")),
                    Some(other) => content.push_str(&format!("[unsupported content: {}]", other)),
                    None => content.push_str("[unsupported content block]"),
                }
            }
        }
        if content.is_empty() {
            content = "(no output)".to_string();
        }

        Ok(McpCallResult { content, is_error })
    }
}
