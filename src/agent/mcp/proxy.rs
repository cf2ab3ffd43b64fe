use crate::agent::mcp::client::{McpClient, McpToolDefinition};
use crate::agent::tools::base::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Presents a single remote MCP tool as a local [`Tool`].
///
/// Registered under a server-qualified name so tools from different servers
/// never collide; the upstream name is kept for the actual `tools/call`.
pub struct McpProxyTool {
    client: Arc<McpClient>,
    qualified_name: String,
    original_name: String,
    description: String,
    input_schema: Value,
    sensitive: bool,
}

impl McpProxyTool {
    pub fn new(client: Arc<McpClient>, definition: McpToolDefinition) -> Self {
        let qualified_name = format!("{}_{}", client.server_name(), definition.name);
        Self {
            client,
            qualified_name,
            original_name: definition.name,
            description: definition.description,
            input_schema: definition.input_schema,
            sensitive: definition.sensitive,
        }
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.qualified_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.input_schema.clone()
    }

    fn sensitive(&self) -> bool {
        self.sensitive
    }

    fn execution_timeout(&self) -> Option<Duration> {
        // Grace over the client timeout so the RPC error surfaces first.
        Some(self.client.call_timeout() + Duration::from_secs(5))
    }

    async fn execute(&self, args: Value) -> ToolResult {
        debug!("mcp tool call: {}", self.qualified_name);
        match self.client.call_tool(&self.original_name, args).await {
            Ok(result) if result.is_error => ToolResult::fail(result.content),
            Ok(result) => ToolResult::ok(result.content),
            Err(e) => {
                warn!("mcp tool '{}' failed: {}", self.qualified_name, e);
                ToolResult::fail(format!("MCP call failed: {}", e))
            }
        }
    }
}
