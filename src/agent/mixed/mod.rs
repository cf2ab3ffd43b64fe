use crate::agent::agent_loop::AgentLoop;
use crate::agent::memory::ProceduralMemory;
use crate::agent::state::AgentState;
use std::path::PathBuf;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

/// Orchestrates the plan → build handoff.
///
/// The plan phase runs with a read-only profile and produces a plan text; the
/// build phase is seeded with the original task plus that plan. The returned
/// state is the build phase's, with the plan attached as metadata. When
/// procedural memory is enabled, the build conversation is scanned for user
/// corrections at the end of the session.
pub struct MixedRunner {
    plan_loop: AgentLoop,
    build_loop: AgentLoop,
    workspace_root: PathBuf,
    memory_enabled: bool,
}

impl MixedRunner {
    pub fn new(
        plan_loop: AgentLoop,
        build_loop: AgentLoop,
        workspace_root: impl Into<PathBuf>,
        memory_enabled: bool,
    ) -> Self {
        Self {
            plan_loop,
            build_loop,
            workspace_root: workspace_root.into(),
            memory_enabled,
        }
    }

    pub async fn run(&mut self, task: &str) -> AgentState {
        info!(agent = %self.plan_loop.profile().name, "mixed mode: plan phase");
        let plan_state = self.plan_loop.run(task).await;
        let plan_text = plan_state.final_output.unwrap_or_default();
        if plan_text.is_empty() {
            warn!(
                status = %plan_state.status,
                "plan phase produced no output; building without a plan"
            );
        }

        info!(agent = %self.build_loop.profile().name, "mixed mode: build phase");
        let mut build_state = if plan_text.is_empty() {
            self.build_loop.run(task).await
        } else {
            let seed = format!(
                "A planning pass produced this implementation plan; follow it \
                 unless the workspace contradicts it:\n\n{}",
                plan_text
            );
            self.build_loop.run_seeded(task, &[seed]).await
        };
        if !plan_text.is_empty() {
            build_state.plan_output = Some(plan_text);
        }

        if self.memory_enabled {
            let mut memory = ProceduralMemory::new(&self.workspace_root);
            let corrections = memory.analyze_session(&build_state.messages);
            if !corrections.is_empty() {
                info!("captured {} correction(s) in procedural memory", corrections.len());
            }
        }

        build_state
    }
}
