use crate::agent::tools::base::ToolResult;
use crate::costs::{CostSummary, TokenUsage};
use crate::providers::base::{Message, ToolCallRequest};

/// Terminal and in-flight loop status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Running,
    Success,
    Failed,
    Interrupted,
    BudgetExceeded,
    MaxSteps,
    Timeout,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Running => "running",
            AgentStatus::Success => "success",
            AgentStatus::Failed => "failed",
            AgentStatus::Interrupted => "interrupted",
            AgentStatus::BudgetExceeded => "budget_exceeded",
            AgentStatus::MaxSteps => "max_steps",
            AgentStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != AgentStatus::Running
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one tool call within a step, correlated by call id.
#[derive(Debug, Clone)]
pub struct StepToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub result: ToolResult,
}

/// One model-call-plus-tool-calls unit of work. Append-only: once a step is
/// pushed onto the state it is never mutated.
#[derive(Debug, Clone)]
pub struct Step {
    /// 1-based step number.
    pub number: usize,
    pub reply_content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_results: Vec<StepToolResult>,
    pub usage: TokenUsage,
}

/// Full observable state of one agent loop run.
///
/// Owned exclusively by its loop while running; frozen on any terminal
/// transition. Terminal transitions preserve the partial step list so the
/// final report can explain what happened.
#[derive(Debug)]
pub struct AgentState {
    pub status: AgentStatus,
    /// Number of completed steps.
    pub current_step: usize,
    pub steps: Vec<Step>,
    pub final_output: Option<String>,
    /// Full transcript, including tool messages.
    pub messages: Vec<Message>,
    /// Error text for `failed` terminations.
    pub error: Option<String>,
    pub cost: Option<CostSummary>,
    /// Dry-run plan, when the run executed with dry-run enabled.
    pub plan_summary: Option<String>,
    /// Plan-phase output attached by the mixed runner.
    pub plan_output: Option<String>,
}

impl AgentState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            status: AgentStatus::Running,
            current_step: 0,
            steps: Vec::new(),
            final_output: None,
            messages,
            error: None,
            cost: None,
            plan_summary: None,
            plan_output: None,
        }
    }

    pub fn total_tool_calls(&self) -> usize {
        self.steps.iter().map(|s| s.tool_calls.len()).sum()
    }
}
