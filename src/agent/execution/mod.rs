use crate::agent::dryrun::{summarize_args, DryRunTracker, WRITE_TOOLS};
use crate::agent::tools::base::ToolResult;
use crate::agent::tools::registry::ToolRegistry;
use crate::workspace::Workspace;
use serde_json::Value;
use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};


/// When to ask the user before running a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Never prompt.
    Yolo,
    /// Prompt only for sensitive tools or sensitive target paths.
    ConfirmSensitive,
    /// Prompt for every call.
    ConfirmAll,
}

impl FromStr for ConfirmMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yolo" => Ok(ConfirmMode::Yolo),
            "confirm-sensitive" => Ok(ConfirmMode::ConfirmSensitive),
            "confirm-all" => Ok(ConfirmMode::ConfirmAll),
            _ => Err(format!("unknown confirm mode: {}", s)),
        }
    }
}

impl std::fmt::Display for ConfirmMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConfirmMode::Yolo => "yolo",
            ConfirmMode::ConfirmSensitive => "confirm-sensitive",
            ConfirmMode::ConfirmAll => "confirm-all",
        })
    }
}

/// Answers confirmation prompts. Injected so tests and non-interactive hosts
/// never touch real stdin.
pub trait Confirmer: Send + Sync {
    fn is_interactive(&self) -> bool;
    fn confirm(&self, prompt: &str) -> bool;
}

/// Reads y/n answers from the terminal.
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn confirm(&self, prompt: &str) -> bool {
        eprint!("{} [y/N] ", prompt);
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Uniform tool invocation pipeline: resolve, validate, confirm, dry-run,
/// dispatch, record.
///
/// Tool-level failures never propagate out of here; every outcome is a
/// [`ToolResult`] the loop appends as a tool message.
pub struct ExecutionEngine {
    registry: Arc<ToolRegistry>,
    workspace: Arc<Workspace>,
    confirm_mode: ConfirmMode,
    confirmer: Box<dyn Confirmer>,
    dry_run: bool,
    dry_run_tracker: Mutex<DryRunTracker>,
    current_step: AtomicUsize,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        workspace: Arc<Workspace>,
        confirm_mode: ConfirmMode,
    ) -> Self {
        Self {
            registry,
            workspace,
            confirm_mode,
            confirmer: Box::new(StdinConfirmer),
            dry_run: false,
            dry_run_tracker: Mutex::new(DryRunTracker::new()),
            current_step: AtomicUsize::new(0),
        }
    }

    pub fn with_confirmer(mut self, confirmer: Box<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn set_dry_run(&mut self, enabled: bool) {
        self.dry_run = enabled;
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Step number stamped on events and planned actions; set by the loop.
    pub fn set_step(&self, step: usize) {
        self.current_step.store(step, Ordering::Release);
    }

    pub fn confirm_mode(&self) -> ConfirmMode {
        self.confirm_mode
    }

    pub fn plan_summary(&self) -> String {
        self.dry_run_tracker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_plan_summary()
    }

    pub fn planned_action_count(&self) -> usize {
        self.dry_run_tracker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .action_count()
    }

    /// Execute one tool call through the full policy pipeline.
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolResult {
        let step = self.current_step.load(Ordering::Acquire);
        let started = Instant::now();
        let result = self.execute_inner(tool_name, args).await;
        let result = result.with_duration(started.elapsed());

        let event_summary = if result.success {
            result.output.chars().take(80).collect::<String>()
        } else {
            result.error.clone().unwrap_or_default()
        };
        if result.success {
            info!(
                step,
                tool = tool_name,
                duration_ms = result.duration.as_millis() as u64,
                "tool call succeeded: {}",
                event_summary
            );
        } else {
            warn!(
                step,
                tool = tool_name,
                duration_ms = result.duration.as_millis() as u64,
                "tool call failed: {}",
                event_summary
            );
        }
        result
    }

    async fn execute_inner(&self, tool_name: &str, args: Value) -> ToolResult {
        let step = self.current_step.load(Ordering::Acquire);

        let Some(tool) = self.registry.get(tool_name) else {
            return ToolResult::fail(format!("UnknownTool: '{}' is not registered", tool_name));
        };

        let args_summary = summarize_args(tool_name, &args);
        info!(step, tool = tool_name, args = %args_summary, "tool call");

        // Schema validation comes before any policy decision: a malformed
        // call is a ValidationError even when it would also be refused,
        // prompted for, or intercepted by dry-run.
        if let Err(e) = tool.validate(&args) {
            return ToolResult::fail(e);
        }

        // Sensitive-path rule: outside yolo, a sensitive target is refused
        // outright; a prompt cannot override it.
        if self.confirm_mode != ConfirmMode::Yolo {
            if let Some(path) = args["path"].as_str() {
                if let Ok(resolved) = self.workspace.resolve(path) {
                    if self.workspace.is_sensitive(&resolved) {
                        return ToolResult::fail(
                            crate::errors::ArchitectError::SensitiveBlocked(path.to_string())
                                .to_string(),
                        );
                    }
                }
            }
        }

        let needs_prompt = match self.confirm_mode {
            ConfirmMode::Yolo => false,
            ConfirmMode::ConfirmAll => true,
            ConfirmMode::ConfirmSensitive => tool.sensitive(),
        };
        if needs_prompt {
            if !self.confirmer.is_interactive() {
                return ToolResult::fail(format!(
                    "confirmation required for '{}' but stdin is not interactive",
                    tool_name
                ));
            }
            let prompt = format!("Run {} ({})?", tool_name, args_summary);
            if !self.confirmer.confirm(&prompt) {
                return ToolResult::fail(format!("refused by user: {}", tool_name));
            }
        }

        if self.dry_run && WRITE_TOOLS.contains(&tool_name) {
            self.dry_run_tracker
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .record(step, tool_name, &args);
            return ToolResult::ok(format!("[dry-run] planned: {}", args_summary));
        }

        self.dispatch(tool, tool_name, args).await
    }

    /// Run the tool in a spawned task so panics are caught and the per-tool
    /// timeout is enforced; both become failed results, keeping the loop alive.
    async fn dispatch(
        &self,
        tool: Arc<dyn crate::agent::tools::base::Tool>,
        tool_name: &str,
        args: Value,
    ) -> ToolResult {
        let timeout = tool.execution_timeout();
        let handle = tokio::task::spawn(async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, tool.execute(args)).await {
                    Ok(result) => result,
                    Err(_) => ToolResult::fail(format!(
                        "tool timed out after {}s",
                        limit.as_secs()
                    )),
                },
                None => tool.execute(args).await,
            }
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let panic_payload = join_err.into_panic();
                let panic_msg = panic_payload
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic_payload.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown cause");
                error!("tool '{}' panicked: {}", tool_name, panic_msg);
                ToolResult::fail(format!("tool '{}' crashed: {}", tool_name, panic_msg))
            }
            Err(_) => ToolResult::fail(format!("tool '{}' was cancelled", tool_name)),
        }
    }
}
