use serde_json::Value;
use std::fmt::Write as _;


/// Tools that mutate workspace or system state. Only these are intercepted
/// and recorded in dry-run mode.
pub const WRITE_TOOLS: &[&str] = &[
    "write_file",
    "edit_file",
    "apply_patch",
    "delete_file",
    "run_command",
];

/// Read-only tools; never recorded, even when they fail.
pub const READ_TOOLS: &[&str] = &[
    "read_file",
    "list_files",
    "find_files",
    "grep",
    "search_code",
];

/// One intercepted write action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub step: usize,
    pub tool: String,
    pub summary: String,
}

/// Collects the write actions a dry run would have performed.
#[derive(Debug, Default)]
pub struct DryRunTracker {
    actions: Vec<PlannedAction>,
}

impl DryRunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a WRITE-set tool call. Read-only and unknown tools are ignored.
    pub fn record(&mut self, step: usize, tool: &str, args: &Value) {
        if !WRITE_TOOLS.contains(&tool) {
            return;
        }
        self.actions.push(PlannedAction {
            step,
            tool: tool.to_string(),
            summary: summarize_args(tool, args),
        });
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> &[PlannedAction] {
        &self.actions
    }

    /// Numbered markdown plan, or the literal "No write actions".
    pub fn get_plan_summary(&self) -> String {
        if self.actions.is_empty() {
            return "No write actions".to_string();
        }
        let mut out = String::from("## Dry Run Plan\n\n");
        for (i, action) in self.actions.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {}: {} (step {})",
                i + 1,
                action.tool,
                action.summary,
                action.step
            );
        }
        let _ = write!(out, "\n{} write action(s)", self.actions.len());
        out
    }
}

/// Max length for summarized argument values.
const SUMMARY_VALUE_MAX: usize = 60;

fn truncate_value(value: &str) -> String {
    if value.chars().count() > SUMMARY_VALUE_MAX {
        let truncated: String = value.chars().take(SUMMARY_VALUE_MAX).collect();
        format!("{}...", truncated)
    } else {
        value.to_string()
    }
}

/// Compact one-line summary of a tool's argument map, for logs and plans.
pub fn summarize_args(tool: &str, args: &Value) -> String {
    match tool {
        "run_command" => args["command"]
            .as_str()
            .map_or_else(|| "(no args)".to_string(), |c| {
                format!("command={}", truncate_value(c))
            }),
        "write_file" | "edit_file" | "apply_patch" | "delete_file" | "read_file" => args["path"]
            .as_str()
            .map_or_else(|| "(no args)".to_string(), |p| format!("path={}", p)),
        "grep" => {
            let needle = args["text"].as_str().or_else(|| args["pattern"].as_str());
            match needle {
                Some(needle) => format!(
                    "\"{}\" in {}",
                    truncate_value(needle),
                    args["path"].as_str().unwrap_or(".")
                ),
                None => "(no args)".to_string(),
            }
        }
        "search_code" => match args["pattern"].as_str() {
            Some(pattern) => format!(
                "\"{}\" in {}",
                truncate_value(pattern),
                args["path"].as_str().unwrap_or(".")
            ),
            None => "(no args)".to_string(),
        },
        "list_files" => args["path"].as_str().unwrap_or(".").to_string(),
        "find_files" => args["pattern"].as_str().unwrap_or(".").to_string(),
        _ => {
            // Unknown tool (MCP or future): show the first value, or the keys.
            let Some(map) = args.as_object() else {
                return "(no args)".to_string();
            };
            if map.is_empty() {
                return "(no args)".to_string();
            }
            if let Some(first) = map.values().find_map(Value::as_str) {
                return truncate_value(first);
            }
            format!(
                "args={}",
                map.keys().cloned().collect::<Vec<_>>().join(",")
            )
        }
    }
}
