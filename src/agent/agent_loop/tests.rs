use super::*;
use crate::agent::execution::ConfirmMode;
use crate::agent::profiles;
use crate::agent::tools::register_builtin_tools;
use crate::costs::PriceBook;
use crate::providers::testing::MockProvider;
use crate::workspace::Workspace;
use serde_json::json;
use std::collections::BTreeMap;

struct LoopFixture {
    dir: tempfile::TempDir,
    provider: Arc<MockProvider>,
    agent_loop: AgentLoop,
}

fn fixture(replies: Vec<anyhow::Result<crate::providers::base::LLMResponse>>) -> LoopFixture {
    fixture_with(replies, 10, false)
}

fn fixture_with(
    replies: Vec<anyhow::Result<crate::providers::base::LLMResponse>>,
    max_steps: usize,
    dry_run: bool,
) -> LoopFixture {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Arc::new(Workspace::new(dir.path(), true, &[]));
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, &workspace, 10).unwrap();
    let registry = Arc::new(registry);

    let mut engine = ExecutionEngine::new(registry.clone(), workspace, ConfirmMode::Yolo);
    engine.set_dry_run(dry_run);

    let provider = Arc::new(MockProvider::new(replies));
    let adapter = ModelAdapter::new(provider.clone(), "gpt-4o".to_string()).with_retry(0);

    let mut profile = profiles::get_profile("build", &BTreeMap::new()).unwrap();
    profile.max_steps = max_steps;

    let context = ContextBuilder::new(dir.path(), false);
    let agent_loop = AgentLoop::new(adapter, Arc::new(engine), registry, profile, context);

    LoopFixture {
        dir,
        provider,
        agent_loop,
    }
}

/// Every assistant tool-call id must appear in exactly one subsequent tool
/// message, in order, before the next assistant message.
fn assert_well_formed(messages: &[Message]) {
    let mut i = 0;
    while i < messages.len() {
        if messages[i].role == "assistant" {
            if let Some(calls) = &messages[i].tool_calls {
                let mut pending: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
                let mut j = i + 1;
                while j < messages.len() && messages[j].role == "tool" {
                    let id = messages[j]
                        .tool_call_id
                        .as_deref()
                        .expect("tool message without call id");
                    assert_eq!(
                        pending.first().copied(),
                        Some(id),
                        "tool results out of order"
                    );
                    pending.remove(0);
                    j += 1;
                }
                assert!(pending.is_empty(), "missing tool results for {pending:?}");
                i = j;
                continue;
            }
        }
        i += 1;
    }
}

#[tokio::test]
async fn content_only_reply_succeeds() {
    let mut fx = fixture(vec![MockProvider::text_reply("All done.")]);
    let state = fx.agent_loop.run("say hi").await;

    assert_eq!(state.status, AgentStatus::Success);
    assert_eq!(state.final_output.as_deref(), Some("All done."));
    assert_eq!(state.current_step, 1);
    assert_eq!(state.steps.len(), 1);
    assert_eq!(state.total_tool_calls(), 0);
    assert_well_formed(&state.messages);
}

#[tokio::test]
async fn tool_call_then_final_answer() {
    let mut fx = fixture(vec![
        MockProvider::tool_reply(&[("call_1", "read_file", json!({"path": "notes.txt"}))]),
        MockProvider::text_reply("The file says: hello"),
    ]);
    std::fs::write(fx.dir.path().join("notes.txt"), "hello").unwrap();

    let state = fx.agent_loop.run("what does notes.txt say?").await;

    assert_eq!(state.status, AgentStatus::Success);
    assert_eq!(state.current_step, 2);
    assert_eq!(state.steps.len(), 2);
    assert_eq!(state.total_tool_calls(), 1);
    assert!(state.steps[0].tool_results[0].result.success);

    let tool_msg = state
        .messages
        .iter()
        .find(|m| m.role == "tool")
        .expect("tool message present");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_msg.content, "hello");
    assert_well_formed(&state.messages);
}

#[tokio::test]
async fn tool_calls_within_a_step_run_sequentially_in_order() {
    let mut fx = fixture(vec![
        MockProvider::tool_reply(&[
            ("c1", "write_file", json!({"path": "x.txt", "content": "written first"})),
            ("c2", "read_file", json!({"path": "x.txt"})),
        ]),
        MockProvider::text_reply("done"),
    ]);

    let state = fx.agent_loop.run("write then read").await;
    assert_eq!(state.status, AgentStatus::Success);
    // The read saw the write: calls executed in emission order.
    let read_result = &state.steps[0].tool_results[1];
    assert_eq!(read_result.result.output, "written first");
    assert_well_formed(&state.messages);
}

#[tokio::test]
async fn max_steps_bound_holds() {
    let replies = (0..10)
        .map(|i| {
            let id = format!("c{i}");
            MockProvider::tool_reply(&[(id.as_str(), "list_files", json!({"path": "."}))])
        })
        .collect();
    let mut fx = fixture_with(replies, 3, false);

    let state = fx.agent_loop.run("loop forever").await;
    assert_eq!(state.status, AgentStatus::MaxSteps);
    assert_eq!(state.current_step, 3);
    assert!(state.current_step <= 3);
    assert_eq!(fx.provider.call_count(), 3);
    assert_well_formed(&state.messages);
}

#[tokio::test]
async fn budget_exceeded_preserves_step_and_transcript() {
    let LoopFixture {
        dir: _dir,
        provider: _provider,
        agent_loop,
    } = fixture(vec![MockProvider::tool_reply(&[(
        "c1",
        "list_files",
        json!({"path": "."}),
    )])]);
    let tracker = CostTracker::new(PriceBook::default(), Some(0.000_001), None);
    let mut agent_loop = agent_loop.with_cost_tracker(tracker);

    let state = agent_loop.run("anything").await;
    assert_eq!(state.status, AgentStatus::BudgetExceeded);
    // The step that crossed the budget is still in the state.
    assert_eq!(state.steps.len(), 1);
    assert_eq!(state.current_step, 1);
    let cost = state.cost.unwrap();
    assert!(cost.total_cost_usd >= 0.000_001);
    // Unexecuted calls still got correlated error messages.
    assert_well_formed(&state.messages);
    let tool_msg = state.messages.iter().find(|m| m.role == "tool").unwrap();
    assert!(tool_msg.content.contains("budget exceeded"));
}

#[tokio::test]
async fn cancellation_interrupts_before_dispatch() {
    let LoopFixture {
        dir: _dir,
        provider,
        agent_loop,
    } = fixture(vec![MockProvider::text_reply("never reached")]);
    let cancel = Arc::new(AtomicBool::new(true));
    let mut agent_loop = agent_loop.with_cancel_flag(cancel);

    let state = agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Interrupted);
    assert_eq!(state.current_step, 0);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn past_deadline_times_out() {
    let LoopFixture {
        dir: _dir,
        provider: _provider,
        agent_loop,
    } = fixture(vec![MockProvider::text_reply("never reached")]);
    let mut agent_loop =
        agent_loop.with_deadline(Some(Instant::now() - std::time::Duration::from_secs(1)));

    let state = agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Timeout);
    assert_eq!(state.current_step, 0);
}

#[tokio::test]
async fn permanent_model_error_fails_the_loop() {
    let mut fx = fixture(vec![Err(anyhow::Error::from(
        crate::errors::ArchitectError::Provider {
            message: "invalid request".into(),
            retryable: false,
        },
    ))]);

    let state = fx.agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Failed);
    assert!(state.error.unwrap().contains("invalid request"));
    assert_eq!(state.current_step, 0);
}

#[tokio::test]
async fn content_alongside_tool_calls_is_preserved_and_tools_still_run() {
    let mut both = MockProvider::tool_reply(&[("c1", "list_files", json!({"path": "."}))]).unwrap();
    both.content = Some("Let me look around.".to_string());
    let mut fx = fixture(vec![Ok(both), MockProvider::text_reply("done")]);

    let state = fx.agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Success);
    assert_eq!(state.steps.len(), 2);
    let assistant = state
        .messages
        .iter()
        .find(|m| m.role == "assistant")
        .unwrap();
    assert_eq!(assistant.content, "Let me look around.");
    assert!(assistant.tool_calls.is_some());
    assert_well_formed(&state.messages);
}

#[tokio::test]
async fn failed_tool_call_still_yields_correlated_message() {
    let mut fx = fixture(vec![
        MockProvider::tool_reply(&[("c1", "bogus_tool", json!({}))]),
        MockProvider::text_reply("recovered"),
    ]);

    let state = fx.agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Success);
    let tool_msg = state.messages.iter().find(|m| m.role == "tool").unwrap();
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    assert!(tool_msg.content.contains("ERROR"));
    assert!(tool_msg.content.contains("UnknownTool"));
    assert!(!state.steps[0].tool_results[0].result.success);
    assert_well_formed(&state.messages);
}

#[tokio::test]
async fn close_instruction_injected_near_step_limit() {
    let mut fx = fixture_with(
        vec![
            MockProvider::tool_reply(&[("c1", "list_files", json!({"path": "."}))]),
            MockProvider::text_reply("wrapping up"),
        ],
        2,
        false,
    );

    let state = fx.agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Success);
    let injected = state
        .messages
        .iter()
        .any(|m| m.role == "system" && m.content.contains("step limit"));
    assert!(injected, "close instruction missing from transcript");
    // Injected once, not per step.
    let count = state
        .messages
        .iter()
        .filter(|m| m.role == "system" && m.content.contains("step limit"))
        .count();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn dry_run_produces_plan_and_leaves_workspace_untouched() {
    let mut fx = fixture_with(
        vec![
            MockProvider::tool_reply(&[(
                "c1",
                "write_file",
                json!({"path": "generated.txt", "content": "output"}),
            )]),
            MockProvider::text_reply("planned"),
        ],
        10,
        true,
    );

    let state = fx.agent_loop.run("task").await;
    assert_eq!(state.status, AgentStatus::Success);
    assert!(!fx.dir.path().join("generated.txt").exists());
    let plan = state.plan_summary.unwrap();
    assert!(plan.contains("write_file"));
    assert!(plan.contains("1 write action(s)"));
}
