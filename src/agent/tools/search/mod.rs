use crate::agent::tools::base::{parse_args, validate_as, Tool, ToolResult};
use crate::agent::tools::filesystem::is_hidden;
use crate::workspace::Workspace;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;


/// Stop collecting matches past this count and note the truncation.
const MAX_MATCHES: usize = 200;

/// Skip files larger than this when scanning (likely binaries or artifacts).
const MAX_SCAN_BYTES: u64 = 2 * 1024 * 1024;

enum Needle {
    Literal(String),
    Pattern(Regex),
}

impl Needle {
    fn matches(&self, line: &str) -> bool {
        match self {
            Needle::Literal(text) => line.contains(text.as_str()),
            Needle::Pattern(re) => re.is_match(line),
        }
    }
}

/// Line-anchored scan shared by `grep` and `search_code`.
fn scan(workspace: &Workspace, root: &Path, needle: &Needle) -> ToolResult {
    let mut matches = Vec::new();
    let mut truncated = false;

    let files: Box<dyn Iterator<Item = std::path::PathBuf>> = if root.is_file() {
        Box::new(std::iter::once(root.to_path_buf()))
    } else {
        Box::new(
            WalkDir::new(root)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path()),
        )
    };

    'outer: for path in files {
        if std::fs::metadata(&path).map_or(true, |m| m.len() > MAX_SCAN_BYTES) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue; // non-UTF-8, skip
        };
        let relative = workspace.relative(&path);
        for (line_no, line) in content.lines().enumerate() {
            if needle.matches(line) {
                if matches.len() >= MAX_MATCHES {
                    truncated = true;
                    break 'outer;
                }
                matches.push(format!(
                    "{}:{}: {}",
                    relative.display(),
                    line_no + 1,
                    line.trim_end()
                ));
            }
        }
    }

    if matches.is_empty() {
        return ToolResult::ok("(no matches)");
    }
    let mut output = matches.join("\n");
    if truncated {
        output.push_str(&format!("\n[truncated at {} matches]", MAX_MATCHES));
    }
    ToolResult::ok(output)
}

pub struct GrepTool {
    workspace: Arc<Workspace>,
}

impl GrepTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GrepArgs {
    /// Literal text to search for.
    text: Option<String>,
    /// Regular expression to search for.
    pattern: Option<String>,
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    ".".to_string()
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents line by line. Provide 'text' for a literal \
         match or 'pattern' for a regular expression."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Literal text to find"
                },
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to find"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search (default: workspace root)"
                }
            }
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<GrepArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: GrepArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        let needle = match (&args.text, &args.pattern) {
            (Some(_), Some(_)) => {
                return ToolResult::fail(
                    "ValidationError: provide either 'text' or 'pattern', not both",
                );
            }
            (None, None) => {
                return ToolResult::fail(
                    "ValidationError: one of 'text' or 'pattern' is required",
                );
            }
            (Some(text), None) => Needle::Literal(text.clone()),
            (None, Some(pattern)) => match Regex::new(pattern) {
                Ok(re) => Needle::Pattern(re),
                Err(e) => {
                    return ToolResult::fail(format!("ValidationError: invalid pattern: {}", e));
                }
            },
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        if !resolved.exists() {
            return ToolResult::fail(format!("NotFound: path '{}' does not exist", args.path));
        }

        scan(&self.workspace, &resolved, &needle)
    }
}

pub struct SearchCodeTool {
    workspace: Arc<Workspace>,
}

impl SearchCodeTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchCodeArgs {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Semantic code search: find definitions, usages, and patterns across \
         the codebase. Accepts a regular expression."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression describing the code to find"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (default: workspace root)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<SearchCodeArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: SearchCodeArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        // Fall back to a literal scan when the pattern is not a valid regex;
        // models often pass plain identifiers here.
        let needle = match Regex::new(&args.pattern) {
            Ok(re) => Needle::Pattern(re),
            Err(_) => Needle::Literal(args.pattern.clone()),
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        if !resolved.exists() {
            return ToolResult::fail(format!("NotFound: path '{}' does not exist", args.path));
        }

        scan(&self.workspace, &resolved, &needle)
    }
}
