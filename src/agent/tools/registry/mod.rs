use crate::agent::tools::base::Tool;
use crate::errors::ArchitectError;
use crate::providers::base::ToolDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;


/// Named set of tools. Read-only after setup; safe to share across loops.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ArchitectError> {
        let name = tool.name().to_string();
        if name.is_empty() || name.len() > 256 || name.chars().any(char::is_control) {
            return Err(ArchitectError::Tool {
                tool: name.clone(),
                message: "invalid tool name".to_string(),
            });
        }
        if self.tools.contains_key(&name) {
            return Err(ArchitectError::Tool {
                tool: name.clone(),
                message: format!("DuplicateTool: '{}' is already registered", name),
            });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tools, sorted by name for deterministic export.
    pub fn list_all(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Model-facing schemas for a subset of tools, in subset order.
    /// Unknown names are skipped with a warning.
    pub fn schemas_for(&self, subset: &[String]) -> Vec<Value> {
        subset
            .iter()
            .filter_map(|name| match self.tools.get(name) {
                Some(tool) => Some(tool.to_schema()),
                None => {
                    warn!("skipping unknown tool '{}' in schema export", name);
                    None
                }
            })
            .collect()
    }

    /// Tool definitions for the provider layer, for a subset of tools.
    pub fn definitions_for(&self, subset: &[String]) -> Vec<ToolDefinition> {
        subset
            .iter()
            .filter_map(|name| match self.tools.get(name) {
                Some(tool) => Some(ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                }),
                None => {
                    warn!("skipping unknown tool '{}' in definition export", name);
                    None
                }
            })
            .collect()
    }
}
