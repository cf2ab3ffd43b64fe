use crate::agent::execution::ConfirmMode;
use crate::agent::tools::{BUILTIN_TOOLS, READ_ONLY_TOOLS};
use crate::config::AgentProfileConfig;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Named bundle of system prompt, allowed tool subset, confirm mode and step
/// ceiling. Profiles select what one loop is allowed to do.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub confirm_mode: ConfirmMode,
    pub max_steps: usize,
}

const PLAN_PROMPT: &str = "\
You are a software planning assistant. Study the workspace with the read-only \
tools available to you and produce a concrete, numbered implementation plan \
for the given task. Do not modify anything. Finish with the plan as your \
final answer.";

const BUILD_PROMPT: &str = "\
You are a software engineering assistant working inside a sandboxed \
workspace. Use the available tools to complete the task: read before you \
write, prefer edit_file for targeted changes, and verify your work with \
run_command where a test command exists. When the task is complete, reply \
with a short summary instead of calling more tools.";

const REVIEW_PROMPT: &str = "\
You are a code review assistant. Inspect the workspace with the read-only \
tools and report concrete findings: bugs, risks, and improvement \
suggestions, each with file and line references. Do not modify anything.";

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

/// Built-in agent profiles.
pub fn default_profiles() -> BTreeMap<String, AgentProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "plan".to_string(),
        AgentProfile {
            name: "plan".to_string(),
            system_prompt: PLAN_PROMPT.to_string(),
            allowed_tools: owned(READ_ONLY_TOOLS),
            confirm_mode: ConfirmMode::ConfirmAll,
            max_steps: 15,
        },
    );
    profiles.insert(
        "build".to_string(),
        AgentProfile {
            name: "build".to_string(),
            system_prompt: BUILD_PROMPT.to_string(),
            allowed_tools: owned(BUILTIN_TOOLS),
            confirm_mode: ConfirmMode::ConfirmSensitive,
            max_steps: 40,
        },
    );
    profiles.insert(
        "review".to_string(),
        AgentProfile {
            name: "review".to_string(),
            system_prompt: REVIEW_PROMPT.to_string(),
            allowed_tools: owned(READ_ONLY_TOOLS),
            confirm_mode: ConfirmMode::Yolo,
            max_steps: 20,
        },
    );
    profiles
}

/// Resolve a profile by name, applying config overrides over the built-ins.
/// A name only present in the overrides map yields a profile based on `build`.
pub fn get_profile(
    name: &str,
    overrides: &BTreeMap<String, AgentProfileConfig>,
) -> Option<AgentProfile> {
    let defaults = default_profiles();
    let base = defaults.get(name).cloned().or_else(|| {
        overrides.contains_key(name).then(|| {
            let mut base = defaults["build"].clone();
            base.name = name.to_string();
            base
        })
    })?;

    let Some(over) = overrides.get(name) else {
        return Some(base);
    };

    let mut profile = base;
    if let Some(system_prompt) = &over.system_prompt {
        profile.system_prompt.clone_from(system_prompt);
    }
    if let Some(allowed_tools) = &over.allowed_tools {
        profile.allowed_tools.clone_from(allowed_tools);
    }
    if let Some(confirm_mode) = &over.confirm_mode {
        if let Ok(mode) = ConfirmMode::from_str(confirm_mode) {
            profile.confirm_mode = mode;
        }
    }
    if let Some(max_steps) = over.max_steps {
        profile.max_steps = max_steps;
    }
    Some(profile)
}

/// All profile names: built-ins plus config-defined ones, sorted.
pub fn list_profiles(overrides: &BTreeMap<String, AgentProfileConfig>) -> Vec<String> {
    let mut names: Vec<String> = default_profiles().keys().cloned().collect();
    for name in overrides.keys() {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names.sort();
    names
}
