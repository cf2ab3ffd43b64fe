use crate::agent::tools::base::{parse_args, validate_as, Tool, ToolResult};
use crate::workspace::Workspace;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

#[cfg(test)]
mod tests;

/// Maximum file size that `read_file` will load (10 MB).
const MAX_READ_BYTES: u64 = 10 * 1024 * 1024;

pub struct ReadFileTool {
    workspace: Arc<Workspace>,
}

impl ReadFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadFileArgs {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given workspace-relative path."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<ReadFileArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: ReadFileArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        if !resolved.exists() {
            return ToolResult::fail(format!("NotFound: file '{}' does not exist", args.path));
        }
        if !resolved.is_file() {
            return ToolResult::fail(format!(
                "'{}' is a directory; use list_files to inspect it",
                args.path
            ));
        }

        match std::fs::metadata(&resolved) {
            Ok(meta) if meta.len() > MAX_READ_BYTES => {
                return ToolResult::fail(format!(
                    "file too large ({} bytes, max {})",
                    meta.len(),
                    MAX_READ_BYTES
                ));
            }
            Err(e) => return ToolResult::fail(format!("error reading file metadata: {}", e)),
            _ => {}
        }

        match std::fs::read_to_string(&resolved) {
            Ok(content) => ToolResult::ok(content),
            Err(e) => ToolResult::fail(format!("error reading file: {}", e)),
        }
    }
}

pub struct ListFilesTool {
    workspace: Arc<Workspace>,
}

impl ListFilesTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ListFilesArgs {
    #[serde(default = "default_path")]
    path: String,
    pattern: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the direct children of a directory, optionally filtered by a glob pattern."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory to list (default: workspace root)"
                },
                "pattern": {
                    "type": "string",
                    "description": "Optional glob filter, e.g. *.md"
                }
            }
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<ListFilesArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: ListFilesArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        if !resolved.is_dir() {
            return ToolResult::fail(format!("NotFound: directory '{}' does not exist", args.path));
        }

        let pattern = match args.pattern.as_deref().map(glob::Pattern::new) {
            Some(Ok(pattern)) => Some(pattern),
            Some(Err(e)) => return ToolResult::fail(format!("ValidationError: invalid pattern: {}", e)),
            None => None,
        };

        let mut entries = Vec::new();
        match std::fs::read_dir(&resolved) {
            Ok(read_dir) => {
                for entry in read_dir.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if let Some(pattern) = &pattern {
                        if !pattern.matches(&name) {
                            continue;
                        }
                    }
                    let suffix = if entry.path().is_dir() { "/" } else { "" };
                    entries.push(format!("{}{}", name, suffix));
                }
            }
            Err(e) => return ToolResult::fail(format!("error reading directory: {}", e)),
        }
        entries.sort();
        if entries.is_empty() {
            ToolResult::ok("(empty)")
        } else {
            ToolResult::ok(entries.join("\n"))
        }
    }
}

pub struct FindFilesTool {
    workspace: Arc<Workspace>,
}

impl FindFilesTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FindFilesArgs {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Recursively find files whose name or relative path matches a glob pattern."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. *.rs or src/**/*.rs"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search under (default: workspace root)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<FindFilesArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: FindFilesArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        let pattern = match glob::Pattern::new(&args.pattern) {
            Ok(pattern) => pattern,
            Err(e) => return ToolResult::fail(format!("ValidationError: invalid pattern: {}", e)),
        };

        let mut matches = Vec::new();
        for entry in WalkDir::new(&resolved)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let relative = self.workspace.relative(entry.path());
            let relative_str = relative.to_string_lossy();
            let file_name = entry.file_name().to_string_lossy();
            if pattern.matches(&relative_str) || pattern.matches(&file_name) {
                matches.push(relative_str.to_string());
            }
        }
        matches.sort();
        if matches.is_empty() {
            ToolResult::ok("(no matches)")
        } else {
            ToolResult::ok(matches.join("\n"))
        }
    }
}

/// Skip hidden directories (.git and friends) during recursive walks.
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n != ".")
}

/// Write modes for [`WriteFileTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WriteMode {
    Overwrite,
    /// Appends to the file, creating it when absent.
    Append,
    /// Refuses to replace an existing file.
    CreateNew,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self::Overwrite
    }
}

pub struct WriteFileTool {
    workspace: Arc<Workspace>,
}

impl WriteFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteFileArgs {
    path: String,
    content: String,
    #[serde(default)]
    mode: WriteMode,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. \
         For small targeted changes prefer edit_file or apply_patch; use \
         write_file for new files or full rewrites."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["overwrite", "append", "create_new"],
                    "description": "overwrite (default), append, or create_new (fail if the file exists)"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<WriteFileArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: WriteFileArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        if args.mode == WriteMode::CreateNew && resolved.exists() {
            return ToolResult::fail(format!(
                "file '{}' already exists (mode=create_new)",
                args.path
            ));
        }

        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::fail(format!("error creating parent directories: {}", e));
            }
        }

        let result = match args.mode {
            WriteMode::Overwrite | WriteMode::CreateNew => std::fs::write(&resolved, &args.content),
            WriteMode::Append => std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .and_then(|mut f| std::io::Write::write_all(&mut f, args.content.as_bytes())),
        };

        match result {
            Ok(()) => ToolResult::ok(format!(
                "File written: {} ({} bytes)",
                args.path,
                args.content.len()
            )),
            Err(e) => ToolResult::fail(format!("error writing file: {}", e)),
        }
    }
}

pub struct DeleteFileTool {
    workspace: Arc<Workspace>,
}

impl DeleteFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteFileArgs {
    path: String,
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file. Only available when the workspace allows deletion."
    }

    fn sensitive(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to delete"
                }
            },
            "required": ["path"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<DeleteFileArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: DeleteFileArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        if !self.workspace.allow_delete() {
            return ToolResult::fail(
                "deletion is disabled for this workspace (allow_delete = false)",
            );
        }

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        if !resolved.is_file() {
            return ToolResult::fail(format!("NotFound: file '{}' does not exist", args.path));
        }

        match std::fs::remove_file(&resolved) {
            Ok(()) => ToolResult::ok(format!("File deleted: {}", args.path)),
            Err(e) => ToolResult::fail(format!("error deleting file: {}", e)),
        }
    }
}
