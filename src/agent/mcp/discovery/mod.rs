use crate::agent::mcp::client::McpClient;
use crate::agent::mcp::proxy::McpProxyTool;
use crate::agent::tools::base::Tool;
use crate::agent::tools::registry::ToolRegistry;
use crate::config::McpServerConfig;
use std::sync::Arc;
use tracing::{info, warn};


/// Outcome of one discovery pass over the configured servers.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    pub servers_total: usize,
    pub servers_ok: usize,
    pub servers_failed: usize,
    pub tools_discovered: usize,
    pub tools_registered: usize,
    pub errors: Vec<String>,
}

/// Enumerates configured MCP servers and registers their tools.
///
/// Per-server failures are non-fatal: they are logged and counted, the other
/// servers proceed, and the registry stays consistent.
#[derive(Default)]
pub struct McpDiscovery;

impl McpDiscovery {
    pub fn new() -> Self {
        Self
    }

    pub async fn discover_and_register(
        &self,
        servers: &[McpServerConfig],
        registry: &mut ToolRegistry,
    ) -> DiscoveryStats {
        let mut stats = DiscoveryStats {
            servers_total: servers.len(),
            ..DiscoveryStats::default()
        };

        for server in servers {
            let client = Arc::new(McpClient::new(server));
            match client.list_tools().await {
                Ok(definitions) => {
                    stats.servers_ok += 1;
                    stats.tools_discovered += definitions.len();
                    for definition in definitions {
                        let tool = McpProxyTool::new(client.clone(), definition);
                        let name = tool.name().to_string();
                        match registry.register(Arc::new(tool)) {
                            Ok(()) => stats.tools_registered += 1,
                            Err(e) => {
                                warn!("skipping MCP tool '{}': {}", name, e);
                                stats.errors.push(e.to_string());
                            }
                        }
                    }
                    info!(
                        "mcp server '{}': {} tools registered",
                        server.name, stats.tools_registered
                    );
                }
                Err(e) => {
                    stats.servers_failed += 1;
                    warn!("mcp discovery failed for '{}': {}", server.name, e);
                    stats.errors.push(format!("{}: {}", server.name, e));
                }
            }
        }

        stats
    }
}
