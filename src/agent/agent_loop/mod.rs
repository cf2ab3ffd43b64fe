use crate::agent::context::ContextBuilder;
use crate::agent::execution::ExecutionEngine;
use crate::agent::profiles::AgentProfile;
use crate::agent::state::{AgentState, AgentStatus, Step, StepToolResult};
use crate::agent::tools::registry::ToolRegistry;
use crate::costs::CostTracker;
use crate::providers::adapter::ModelAdapter;
use crate::providers::base::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

/// Templates appended as system-side reminders when a soft limit approaches.
#[derive(Debug, Clone)]
pub struct CloseInstructions {
    pub steps: String,
    pub cost: String,
}

impl Default for CloseInstructions {
    fn default() -> Self {
        Self {
            steps: "You are close to the step limit for this run. Finalize now: \
                    wrap up the current work and reply with your result instead \
                    of starting anything new."
                .to_string(),
            cost: "The cost warning threshold for this run has been crossed. \
                   Finalize now: wrap up the current work and reply with your \
                   result instead of starting anything new."
                .to_string(),
        }
    }
}

/// Remaining-step margin at which the step close-instruction fires.
const CLOSE_STEP_MARGIN: usize = 2;

/// The control loop: drives the model through tool calls until a terminal
/// state, enforcing step, cost, time, and cancellation limits.
///
/// Owns its [`AgentState`] exclusively; the state is frozen and returned on
/// any terminal transition, partial step list included.
pub struct AgentLoop {
    adapter: ModelAdapter,
    engine: Arc<ExecutionEngine>,
    registry: Arc<ToolRegistry>,
    profile: AgentProfile,
    context: ContextBuilder,
    cost_tracker: Option<CostTracker>,
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
    close_instructions: CloseInstructions,
    /// Cost attribution label ("agent", "plan", "build").
    source: String,
}

impl AgentLoop {
    pub fn new(
        adapter: ModelAdapter,
        engine: Arc<ExecutionEngine>,
        registry: Arc<ToolRegistry>,
        profile: AgentProfile,
        context: ContextBuilder,
    ) -> Self {
        Self {
            adapter,
            engine,
            registry,
            profile,
            context,
            cost_tracker: None,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
            close_instructions: CloseInstructions::default(),
            source: "agent".to_string(),
        }
    }

    pub fn with_cost_tracker(mut self, tracker: CostTracker) -> Self {
        self.cost_tracker = Some(tracker);
        self
    }

    /// Cooperative cancellation flag, set by the host on interrupt.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub async fn run(&mut self, task: &str) -> AgentState {
        self.run_seeded(task, &[]).await
    }

    /// Run with extra user-context messages appended after the task (the
    /// mixed runner seeds the build phase with the plan this way).
    pub async fn run_seeded(&mut self, task: &str, extra_context: &[String]) -> AgentState {
        let mut messages = self.context.build(&self.profile, task, &[]);
        for extra in extra_context {
            messages.push(Message::user(extra.clone()));
        }
        let definitions = self.registry.definitions_for(&self.profile.allowed_tools);

        let mut state = AgentState::new(messages);
        let mut steps_close_injected = false;
        let mut cost_close_injected = false;

        info!(
            agent = %self.profile.name,
            max_steps = self.profile.max_steps,
            tools = definitions.len(),
            "agent loop start"
        );

        loop {
            if state.current_step >= self.profile.max_steps {
                state.status = AgentStatus::MaxSteps;
                break;
            }
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    state.status = AgentStatus::Timeout;
                    break;
                }
            }
            if self.cancel.load(Ordering::Acquire) {
                state.error = Some(crate::errors::ArchitectError::Cancelled.to_string());
                state.status = AgentStatus::Interrupted;
                break;
            }

            let step_number = state.current_step + 1;
            self.engine.set_step(step_number);

            if !steps_close_injected
                && self.profile.max_steps - state.current_step <= CLOSE_STEP_MARGIN
            {
                state
                    .messages
                    .push(Message::system(self.close_instructions.steps.clone()));
                steps_close_injected = true;
            }

            let reply = match self.adapter.complete(&state.messages, &definitions).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("model call failed terminally: {}", e);
                    state.error = Some(e.to_string());
                    state.status = AgentStatus::Failed;
                    break;
                }
            };

            let mut step = Step {
                number: step_number,
                reply_content: reply.content.clone(),
                tool_calls: reply.tool_calls.clone(),
                tool_results: Vec::new(),
                usage: reply.usage.clone(),
            };

            let mut budget_exceeded = false;
            if let Some(tracker) = &mut self.cost_tracker {
                if let Err(e) =
                    tracker.record(step_number, self.adapter.model(), &reply.usage, &self.source)
                {
                    warn!("{}", e);
                    budget_exceeded = true;
                } else if tracker.warned() && !cost_close_injected {
                    state
                        .messages
                        .push(Message::system(self.close_instructions.cost.clone()));
                    cost_close_injected = true;
                }
            }

            state.messages.push(Message::assistant(
                reply.content.clone().unwrap_or_default(),
                (!reply.tool_calls.is_empty()).then(|| reply.tool_calls.clone()),
            ));

            if budget_exceeded {
                // Keep the transcript well-formed: unexecuted calls still get
                // a correlated tool message carrying the refusal.
                for call in &reply.tool_calls {
                    state.messages.push(Message::tool_result(
                        call.id.clone(),
                        "ERROR: budget exceeded; call not executed",
                    ));
                }
                state.final_output = reply.content;
                state.steps.push(step);
                state.current_step = step_number;
                state.status = AgentStatus::BudgetExceeded;
                break;
            }

            if reply.tool_calls.is_empty() {
                // A content-only reply terminates the loop.
                state.final_output = reply.content;
                state.steps.push(step);
                state.current_step = step_number;
                state.status = AgentStatus::Success;
                break;
            }

            // Content alongside tool calls is preserved above, but the calls
            // still run: only a content-only reply terminates.
            for call in &reply.tool_calls {
                let result = self.engine.execute(&call.name, call.arguments.clone()).await;
                let content = if result.success {
                    result.output.clone()
                } else {
                    format!(
                        "ERROR: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    )
                };
                state.messages.push(Message::tool_result(call.id.clone(), content));
                step.tool_results.push(StepToolResult {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result,
                });
            }

            state.steps.push(step);
            state.current_step = step_number;
        }

        if let Some(tracker) = &self.cost_tracker {
            state.cost = Some(tracker.summary());
            info!("cost: {}", tracker.format_summary_line());
        }
        if self.engine.dry_run() {
            state.plan_summary = Some(self.engine.plan_summary());
        }

        info!(
            status = %state.status,
            steps = state.current_step,
            tool_calls = state.total_tool_calls(),
            "agent loop finished"
        );
        state
    }
}
