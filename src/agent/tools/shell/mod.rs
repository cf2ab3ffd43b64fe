use crate::agent::tools::base::{parse_args, validate_as, Tool, ToolResult};
use crate::workspace::Workspace;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Per-stream cap on captured output. stdout and stderr are clipped
/// independently so a chatty stdout can never crowd out error text.
const STREAM_CAP_BYTES: usize = 512 * 1024;

/// Environment variables whose names contain these fragments are withheld
/// from child processes.
const SECRET_ENV_FRAGMENTS: &[&str] = &["KEY", "TOKEN", "SECRET", "PASSWORD", "CREDENTIAL"];

pub struct RunCommandTool {
    workspace: Arc<Workspace>,
    default_timeout_secs: u64,
}

impl RunCommandTool {
    pub fn new(workspace: Arc<Workspace>, default_timeout_secs: u64) -> Self {
        Self {
            workspace,
            default_timeout_secs,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunCommandArgs {
    command: String,
    /// Wall-clock limit in seconds; the configured default applies otherwise.
    timeout: Option<u64>,
}

/// Build an inherited-minus-secrets environment for the child.
fn scrubbed_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(name, _)| {
            let upper = name.to_uppercase();
            !SECRET_ENV_FRAGMENTS.iter().any(|frag| upper.contains(frag))
        })
        .collect()
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace root and return its combined output."
    }

    fn sensitive(&self) -> bool {
        true
    }

    fn execution_timeout(&self) -> Option<Duration> {
        // Grace over the internal limit so the process-group kill runs first.
        Some(Duration::from_secs(self.default_timeout_secs + 5))
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Wall-clock limit in seconds (default from config)"
                }
            },
            "required": ["command"]
        })
    }

    fn validate(&self, args: &Value) -> Result<(), String> {
        validate_as::<RunCommandArgs>(args)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: RunCommandArgs = match parse_args(args) {
            Ok(args) => args,
            Err(e) => return ToolResult::fail(e),
        };
        let timeout_secs = args.timeout.unwrap_or(self.default_timeout_secs);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&args.command);
        cmd.current_dir(self.workspace.root());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env_clear();
        cmd.envs(scrubbed_env());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return ToolResult::fail(format!("error spawning command: {}", e)),
        };
        #[cfg(unix)]
        let pgid = child.id();

        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => {
                let combined = render_output(&output.stdout, &output.stderr);

                if output.status.success() {
                    ToolResult::ok(if combined.is_empty() {
                        "(no output)".to_string()
                    } else {
                        combined
                    })
                } else {
                    let code = output
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string());
                    ToolResult::fail(format!("command exited with status {}: {}", code, combined))
                }
            }
            Ok(Err(e)) => ToolResult::fail(format!("error running command: {}", e)),
            Err(_) => {
                // Kill the whole process group so children die with the shell.
                #[cfg(unix)]
                if let Some(pid) = pgid {
                    unsafe {
                        if libc::killpg(pid as i32, libc::SIGKILL) != 0 {
                            warn!("failed to kill process group {}", pid);
                        }
                    }
                }
                ToolResult::fail(format!("command timed out after {} seconds", timeout_secs))
            }
        }
    }
}

/// Decode one captured stream and clip it to [`STREAM_CAP_BYTES`], backing
/// up to a character boundary so no UTF-8 sequence is split. Returns the
/// text and whether anything was dropped.
fn clip_stream(raw: &[u8]) -> (String, bool) {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= STREAM_CAP_BYTES {
        return (text.into_owned(), false);
    }
    let mut cut = STREAM_CAP_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    (text[..cut].to_string(), true)
}

/// Merge the two streams into one transcript: stdout first, then an
/// `[stderr]` section when there is any, then a clip notice if either
/// stream was cut.
fn render_output(stdout_raw: &[u8], stderr_raw: &[u8]) -> String {
    let (stdout, stdout_clipped) = clip_stream(stdout_raw);
    let (stderr, stderr_clipped) = clip_stream(stderr_raw);

    let mut transcript = stdout;
    if !stderr.is_empty() {
        if !transcript.is_empty() {
            transcript.push('\n');
        }
        transcript.push_str("[stderr]\n");
        transcript.push_str(&stderr);
    }
    if stdout_clipped || stderr_clipped {
        transcript.push_str("\n[output clipped at 512 KiB per stream]");
    }
    transcript
}
