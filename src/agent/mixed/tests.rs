use super::*;
use crate::agent::agent_loop::AgentLoop;
use crate::agent::context::ContextBuilder;
use crate::agent::execution::{ConfirmMode, ExecutionEngine};
use crate::agent::profiles;
use crate::agent::state::AgentStatus;
use crate::agent::tools::{register_builtin_tools, ToolRegistry};
use crate::providers::adapter::ModelAdapter;
use crate::providers::base::LLMResponse;
use crate::providers::testing::MockProvider;
use crate::workspace::Workspace;
use std::collections::BTreeMap;
use std::sync::Arc;

fn make_loop(
    dir: &tempfile::TempDir,
    profile_name: &str,
    replies: Vec<anyhow::Result<LLMResponse>>,
) -> (Arc<MockProvider>, AgentLoop) {
    let workspace = Arc::new(Workspace::new(dir.path(), false, &[]));
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, &workspace, 10).unwrap();
    let registry = Arc::new(registry);
    // Tests run headless, so both phases execute without prompts.
    let engine = ExecutionEngine::new(registry.clone(), workspace, ConfirmMode::Yolo);
    let provider = Arc::new(MockProvider::new(replies));
    let adapter = ModelAdapter::new(provider.clone(), "gpt-4o".to_string()).with_retry(0);
    let profile = profiles::get_profile(profile_name, &BTreeMap::new()).unwrap();
    let context = ContextBuilder::new(dir.path(), false);
    let agent_loop = AgentLoop::new(adapter, Arc::new(engine), registry, profile, context)
        .with_source(profile_name);
    (provider, agent_loop)
}

#[tokio::test]
async fn plan_output_seeds_build_phase() {
    let dir = tempfile::tempdir().unwrap();
    let (_plan_provider, plan_loop) = make_loop(
        &dir,
        "plan",
        vec![MockProvider::text_reply("1. Create the file\n2. Fill it in")],
    );
    let (build_provider, build_loop) = make_loop(
        &dir,
        "build",
        vec![MockProvider::text_reply("Implemented per plan.")],
    );

    let mut runner = MixedRunner::new(plan_loop, build_loop, dir.path(), false);
    let state = runner.run("build the thing").await;

    assert_eq!(state.status, AgentStatus::Success);
    assert_eq!(state.final_output.as_deref(), Some("Implemented per plan."));
    assert_eq!(
        state.plan_output.as_deref(),
        Some("1. Create the file\n2. Fill it in")
    );

    // The build conversation saw the original task AND the plan.
    let requests = build_provider.requests.lock().unwrap();
    let user_contents: Vec<&str> = requests[0]
        .iter()
        .filter(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_contents[0], "build the thing");
    assert!(user_contents[1].contains("1. Create the file"));
}

#[tokio::test]
async fn empty_plan_builds_without_seed() {
    let dir = tempfile::tempdir().unwrap();
    // Plan phase fails terminally: no plan text.
    let (_plan_provider, plan_loop) = make_loop(
        &dir,
        "plan",
        vec![Err(anyhow::Error::from(
            crate::errors::ArchitectError::Provider {
                message: "backend down".into(),
                retryable: false,
            },
        ))],
    );
    let (build_provider, build_loop) = make_loop(
        &dir,
        "build",
        vec![MockProvider::text_reply("built anyway")],
    );

    let mut runner = MixedRunner::new(plan_loop, build_loop, dir.path(), false);
    let state = runner.run("task").await;

    assert_eq!(state.status, AgentStatus::Success);
    assert!(state.plan_output.is_none());
    let requests = build_provider.requests.lock().unwrap();
    let user_count = requests[0].iter().filter(|m| m.role == "user").count();
    assert_eq!(user_count, 1);
}

#[tokio::test]
async fn phases_run_in_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let (plan_provider, plan_loop) =
        make_loop(&dir, "plan", vec![MockProvider::text_reply("the plan")]);
    let (build_provider, build_loop) =
        make_loop(&dir, "build", vec![MockProvider::text_reply("the build")]);

    let mut runner = MixedRunner::new(plan_loop, build_loop, dir.path(), false);
    runner.run("task").await;

    assert_eq!(plan_provider.call_count(), 1);
    assert_eq!(build_provider.call_count(), 1);
}

#[tokio::test]
async fn corrections_captured_when_memory_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let (_plan_provider, plan_loop) =
        make_loop(&dir, "plan", vec![MockProvider::text_reply("plan")]);
    let (_build_provider, build_loop) =
        make_loop(&dir, "build", vec![MockProvider::text_reply("done")]);

    let mut runner = MixedRunner::new(plan_loop, build_loop, dir.path(), true);
    let mut state = runner.run("task").await;

    // Simulate a user correction mid-conversation, then re-analyze: the
    // memory pass is driven from the final transcript.
    state
        .messages
        .push(crate::providers::base::Message::user(
            "No, use tokio::spawn instead of std threads",
        ));
    let mut memory = crate::agent::memory::ProceduralMemory::new(dir.path());
    let corrections = memory.analyze_session(&state.messages);
    assert_eq!(corrections.len(), 1);
    assert!(corrections[0].contains("tokio::spawn"));

    // Re-running the analyzer does not duplicate the entry.
    let mut memory_again = crate::agent::memory::ProceduralMemory::new(dir.path());
    memory_again.analyze_session(&state.messages);
    assert_eq!(memory_again.entries().len(), 1);
}
