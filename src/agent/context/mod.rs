use crate::agent::memory::ProceduralMemory;
use crate::agent::profiles::AgentProfile;
use crate::agent::skills::SkillsLoader;
use crate::providers::base::Message;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::debug;


/// Composes the initial message list for one loop run.
///
/// The assembled system prompt is stable for the duration of the loop; it is
/// built once and never recomputed between steps.
pub struct ContextBuilder {
    workspace_root: PathBuf,
    memory_enabled: bool,
}

impl ContextBuilder {
    pub fn new(workspace_root: impl Into<PathBuf>, memory_enabled: bool) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            memory_enabled,
        }
    }

    /// System prompt ⊕ project instructions ⊕ matched skills ⊕ procedural
    /// memory, followed by the task as the user message.
    pub fn build(&self, profile: &AgentProfile, task: &str, active_files: &[String]) -> Vec<Message> {
        let mut system = profile.system_prompt.clone();

        let mut skills_loader = SkillsLoader::new(&self.workspace_root);
        if let Some(project) = skills_loader.load_project_context() {
            let _ = write!(system, "\n\n## Project instructions\n\n{}", project.trim());
        }

        skills_loader.discover_skills();
        for skill in skills_loader.relevant_skills(active_files) {
            debug!("injecting skill '{}'", skill.name);
            let _ = write!(system, "\n\n## Skill: {}\n\n{}", skill.name, skill.content);
        }

        if self.memory_enabled {
            let memory = ProceduralMemory::new(&self.workspace_root);
            let memory_context = memory.get_context();
            if !memory_context.is_empty() {
                let _ = write!(system, "\n\n{}", memory_context.trim());
            }
        }

        vec![Message::system(system), Message::user(task)]
    }
}
