pub mod base;
pub mod edit;
pub mod filesystem;
pub mod registry;
pub mod search;
pub mod shell;

pub use base::{Tool, ToolResult};
pub use registry::ToolRegistry;

use crate::workspace::Workspace;
use anyhow::Result;
use std::sync::Arc;

/// Names of every built-in tool, in registration order.
pub const BUILTIN_TOOLS: &[&str] = &[
    "read_file",
    "list_files",
    "find_files",
    "grep",
    "search_code",
    "write_file",
    "edit_file",
    "apply_patch",
    "delete_file",
    "run_command",
];

/// Built-in tools that only read workspace state.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "read_file",
    "list_files",
    "find_files",
    "grep",
    "search_code",
];

/// Register the full built-in tool set against a workspace.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    workspace: &Arc<Workspace>,
    exec_timeout_secs: u64,
) -> Result<()> {
    registry.register(Arc::new(filesystem::ReadFileTool::new(workspace.clone())))?;
    registry.register(Arc::new(filesystem::ListFilesTool::new(workspace.clone())))?;
    registry.register(Arc::new(filesystem::FindFilesTool::new(workspace.clone())))?;
    registry.register(Arc::new(search::GrepTool::new(workspace.clone())))?;
    registry.register(Arc::new(search::SearchCodeTool::new(workspace.clone())))?;
    registry.register(Arc::new(filesystem::WriteFileTool::new(workspace.clone())))?;
    registry.register(Arc::new(edit::EditFileTool::new(workspace.clone())))?;
    registry.register(Arc::new(edit::ApplyPatchTool::new(workspace.clone())))?;
    registry.register(Arc::new(filesystem::DeleteFileTool::new(workspace.clone())))?;
    registry.register(Arc::new(shell::RunCommandTool::new(
        workspace.clone(),
        exec_timeout_secs,
    )))?;
    Ok(())
}
