use crate::agent::tools::base::{parse_args, validate_as, Tool, ToolResult};
use crate::workspace::Workspace;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;


/// Context lines emitted around a change in generated diffs.
const DIFF_CONTEXT: usize = 3;

/// Split content into lines, tracking whether it ended with a newline so the
/// patched result reproduces the original byte-for-byte.
fn split_lines(content: &str) -> (Vec<&str>, bool) {
    if content.is_empty() {
        return (Vec::new(), false);
    }
    let mut lines: Vec<&str> = content.split('\n').collect();
    let trailing_newline = lines.last() == Some(&"");
    if trailing_newline {
        lines.pop();
    }
    (lines, trailing_newline)
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut joined = lines.join("\n");
    if trailing_newline {
        joined.push('\n');
    }
    joined
}

/// Produce a single-hunk unified diff from `old` to `new`.
///
/// The hunk covers the changed region plus up to [`DIFF_CONTEXT`] context
/// lines on each side; [`apply_patch`] on the old content yields the new
/// content exactly.
pub(crate) fn unified_diff(old: &str, new: &str) -> String {
    let (old_lines, old_trailing) = split_lines(old);
    let (new_lines, new_trailing) = split_lines(new);

    // A final line without a trailing newline is a different physical line
    // than the same text with one; it can only match its counterpart when
    // both files terminate the same way.
    let line_eq = |i: usize, j: usize| {
        if old_lines[i] != new_lines[j] {
            return false;
        }
        let old_terminated = i + 1 < old_lines.len() || old_trailing;
        let new_terminated = j + 1 < new_lines.len() || new_trailing;
        old_terminated == new_terminated
    };

    let mut prefix = 0;
    while prefix < old_lines.len() && prefix < new_lines.len() && line_eq(prefix, prefix) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old_lines.len() - prefix
        && suffix < new_lines.len() - prefix
        && line_eq(old_lines.len() - 1 - suffix, new_lines.len() - 1 - suffix)
    {
        suffix += 1;
    }

    let ctx_start = prefix.saturating_sub(DIFF_CONTEXT);
    let old_changed_end = old_lines.len() - suffix;
    let new_changed_end = new_lines.len() - suffix;
    let ctx_end = (old_changed_end + DIFF_CONTEXT).min(old_lines.len());

    let orig_count = ctx_end - ctx_start;
    let new_count = orig_count - (old_changed_end - prefix) + (new_changed_end - prefix);

    // Unified-diff convention: an empty range is written with the line
    // number of the preceding line, not line+1.
    let orig_start = if orig_count == 0 { ctx_start } else { ctx_start + 1 };
    let new_start = if new_count == 0 { ctx_start } else { ctx_start + 1 };
    let mut out = String::new();
    out.push_str(&format!(
        "@@ -{},{} +{},{} @@\n",
        orig_start, orig_count, new_start, new_count
    ));
    for line in &old_lines[ctx_start..prefix] {
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    for line in &old_lines[prefix..old_changed_end] {
        out.push('-');
        out.push_str(line);
        out.push('\n');
    }
    if !old_trailing && old_changed_end == old_lines.len() && old_changed_end > prefix {
        out.push_str("\\ No newline at end of file\n");
    }
    for line in &new_lines[prefix..new_changed_end] {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    if !new_trailing && new_changed_end == new_lines.len() && new_changed_end > prefix {
        out.push_str("\\ No newline at end of file\n");
    }
    for line in &old_lines[old_changed_end..ctx_end] {
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Apply a unified-diff patch to `content`.
///
/// Parses `@@ -a,b +c,d @@` hunks, verifies every context and removed line
/// against the current content, and supports pure insertion hunks
/// (`orig_count = 0`). The error carries the first mismatched line.
pub(crate) fn apply_patch(content: &str, patch: &str) -> Result<String, String> {
    let (old_lines, trailing_newline) = split_lines(content);
    let mut output: Vec<String> = Vec::new();
    let mut cursor = 0usize;
    // Trailing newline of the result: the old file's unless a
    // "\ No newline at end of file" marker says otherwise.
    let mut result_trailing: Option<bool> = None;
    let mut last_tag = ' ';

    let hunk_re = regex::Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
        .expect("hunk header regex is valid");

    let patch_lines: Vec<&str> = patch.split('\n').collect();
    let mut i = 0;
    let mut saw_hunk = false;

    while i < patch_lines.len() {
        let line = patch_lines[i];
        if line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with('\\') {
            i += 1;
            continue;
        }
        let Some(captures) = hunk_re.captures(line) else {
            if line.trim().is_empty() {
                i += 1;
                continue;
            }
            if !saw_hunk {
                return Err(format!(
                    "PatchError: expected hunk header '@@ -a,b +c,d @@', found '{}'",
                    line
                ));
            }
            return Err(format!("PatchError: unexpected line outside hunk: '{}'", line));
        };
        saw_hunk = true;

        let orig_start: usize = captures[1].parse().unwrap_or(0);
        let orig_count: usize = captures
            .get(2)
            .map_or(1, |m| m.as_str().parse().unwrap_or(1));

        // A zero-count hunk inserts after line `orig_start`; a normal hunk
        // starts at it.
        let hunk_index = if orig_count == 0 {
            orig_start
        } else {
            orig_start.saturating_sub(1)
        };
        if hunk_index < cursor {
            return Err("PatchError: hunks are out of order".to_string());
        }
        if hunk_index > old_lines.len() {
            return Err(format!(
                "PatchError: hunk start {} is beyond end of file ({} lines)",
                orig_start,
                old_lines.len()
            ));
        }
        for line in &old_lines[cursor..hunk_index] {
            output.push((*line).to_string());
        }
        cursor = hunk_index;

        i += 1;
        while i < patch_lines.len() {
            let body = patch_lines[i];
            if hunk_re.is_match(body) {
                break;
            }
            if body.is_empty() {
                // Trailing newline artifact of splitting the patch text.
                i += 1;
                continue;
            }
            let (tag, text) = body.split_at(1);
            if let Some(t) = tag.chars().next() {
                if t != '\\' {
                    last_tag = t;
                }
            }
            match tag {
                " " => {
                    if cursor >= old_lines.len() || old_lines[cursor] != text {
                        return Err(format!(
                            "PatchError: context mismatch at line {}: expected '{}', found '{}'",
                            cursor + 1,
                            text,
                            old_lines.get(cursor).copied().unwrap_or("<eof>")
                        ));
                    }
                    output.push(text.to_string());
                    cursor += 1;
                }
                "-" => {
                    if cursor >= old_lines.len() || old_lines[cursor] != text {
                        return Err(format!(
                            "PatchError: removed line mismatch at line {}: expected '{}', found '{}'",
                            cursor + 1,
                            text,
                            old_lines.get(cursor).copied().unwrap_or("<eof>")
                        ));
                    }
                    cursor += 1;
                }
                "+" => output.push(text.to_string()),
                // "No newline at end of file": after a removed line the OLD
                // file ended bare (so the result gains a newline unless the
                // new side says otherwise); after an added/context line the
                // result itself ends bare.
                "\\" => {
                    result_trailing = Some(last_tag == '-');
                }
                _ => {
                    return Err(format!(
                        "PatchError: invalid hunk line prefix in '{}'",
                        body
                    ));
                }
            }
            i += 1;
        }
    }

    if !saw_hunk {
        return Err("PatchError: patch contains no hunks".to_string());
    }

    for line in &old_lines[cursor..] {
        output.push((*line).to_string());
    }
    Ok(join_lines(&output, result_trailing.unwrap_or(trailing_newline)))
}

pub struct EditFileTool {
    workspace: Arc<Workspace>,
}

impl EditFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EditFileArgs {
    path: String,
    old_str: String,
    new_str: String,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "PREFERRED way to modify a file: replace old_str (which must occur \
         exactly once) with new_str. Falls back: apply_patch for multi-spot \
         changes, write_file for full rewrites."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to edit"
                },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to replace; must occur exactly once"
                },
                "new_str": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_str", "new_str"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<EditFileArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: EditFileArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        if args.old_str.is_empty() {
            return ToolResult::fail("old_str must not be empty");
        }

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        if !resolved.is_file() {
            return ToolResult::fail(format!("NotFound: file '{}' does not exist", args.path));
        }

        let content = match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(e) => return ToolResult::fail(format!("error reading file: {}", e)),
        };

        let count = content.matches(&args.old_str).count();
        if count == 0 {
            return ToolResult::fail(format!(
                "old_str not found in '{}'; make sure it matches exactly",
                args.path
            ));
        }
        if count > 1 {
            return ToolResult::fail(format!(
                "old_str occurs {} times in '{}'; add surrounding context to make it unique",
                count, args.path
            ));
        }

        let new_content = content.replacen(&args.old_str, &args.new_str, 1);
        if let Err(e) = std::fs::write(&resolved, &new_content) {
            return ToolResult::fail(format!("error writing file: {}", e));
        }

        let diff = unified_diff(&content, &new_content);
        ToolResult::ok(format!("Edited {}\n\nDiff:\n{}", args.path, diff))
    }
}

pub struct ApplyPatchTool {
    workspace: Arc<Workspace>,
}

impl ApplyPatchTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplyPatchArgs {
    path: String,
    patch: String,
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a unified-diff patch (one or more @@ hunks) to a file. Use for \
         multi-spot edits; prefer edit_file for a single replacement and \
         write_file only for full rewrites."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to patch"
                },
                "patch": {
                    "type": "string",
                    "description": "Unified diff with @@ -a,b +c,d @@ hunks"
                }
            },
            "required": ["path", "patch"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<ApplyPatchArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: ApplyPatchArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };

        let resolved = match self.workspace.resolve(&args.path) {
            Ok(resolved) => resolved,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        if !resolved.is_file() {
            return ToolResult::fail(format!("NotFound: file '{}' does not exist", args.path));
        }

        let content = match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(e) => return ToolResult::fail(format!("error reading file: {}", e)),
        };

        match apply_patch(&content, &args.patch) {
            Ok(patched) => {
                if let Err(e) = std::fs::write(&resolved, &patched) {
                    return ToolResult::fail(format!("error writing file: {}", e));
                }
                let added = args
                    .patch
                    .lines()
                    .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
                    .count();
                let removed = args
                    .patch
                    .lines()
                    .filter(|l| l.starts_with('-') && !l.starts_with("---"))
                    .count();
                ToolResult::ok(format!(
                    "Patched {} (+{} -{})",
                    args.path, added, removed
                ))
            }
            Err(e) => ToolResult::fail(e),
        }
    }
}
