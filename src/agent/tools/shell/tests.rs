use super::*;
use serde_json::json;

fn tool() -> (tempfile::TempDir, RunCommandTool) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Arc::new(Workspace::new(dir.path(), false, &[]));
    (dir, RunCommandTool::new(ws, 10))
}

#[tokio::test]
async fn captures_stdout() {
    let (_dir, tool) = tool();
    let result = tool.execute(json!({"command": "echo hello"})).await;
    assert!(result.success);
    assert_eq!(result.output.trim(), "hello");
}

#[tokio::test]
async fn runs_in_workspace_root() {
    let (dir, tool) = tool();
    let result = tool.execute(json!({"command": "pwd"})).await;
    assert!(result.success);
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(result.output.trim(), expected.to_string_lossy());
}

#[tokio::test]
async fn nonzero_exit_is_failure_with_output() {
    let (_dir, tool) = tool();
    let result = tool
        .execute(json!({"command": "echo before; exit 3"}))
        .await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("status 3"));
    assert!(error.contains("before"));
}

#[tokio::test]
async fn stderr_captured_and_labelled() {
    let (_dir, tool) = tool();
    let result = tool
        .execute(json!({"command": "echo out; echo err >&2"}))
        .await;
    assert!(result.success);
    assert!(result.output.contains("out"));
    assert!(result.output.contains("[stderr]"));
    assert!(result.output.contains("err"));
}

#[tokio::test]
async fn times_out_and_kills() {
    let (_dir, tool) = tool();
    let start = std::time::Instant::now();
    let result = tool
        .execute(json!({"command": "sleep 30", "timeout": 1}))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    assert!(start.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn secret_env_vars_not_inherited() {
    std::env::set_var("ARCHITECT_TEST_API_KEY", "sekrit");
    let (_dir, tool) = tool();
    let result = tool
        .execute(json!({"command": "env | grep ARCHITECT_TEST_API_KEY || echo ABSENT"}))
        .await;
    std::env::remove_var("ARCHITECT_TEST_API_KEY");
    assert!(result.success);
    assert!(result.output.contains("ABSENT"));
}

#[tokio::test]
async fn empty_output_marker() {
    let (_dir, tool) = tool();
    let result = tool.execute(json!({"command": "true"})).await;
    assert!(result.success);
    assert_eq!(result.output, "(no output)");
}

#[test]
fn clip_stream_respects_char_boundaries() {
    // Multi-byte characters spanning the cap must not be split.
    let repeated = "é".repeat(STREAM_CAP_BYTES);
    let (clipped, was_clipped) = clip_stream(repeated.as_bytes());
    assert!(was_clipped);
    assert!(clipped.len() <= STREAM_CAP_BYTES);
    assert!(clipped.chars().all(|c| c == 'é'));

    let (small, was_clipped) = clip_stream("short".as_bytes());
    assert!(!was_clipped);
    assert_eq!(small, "short");
}

#[test]
fn render_output_clips_streams_independently() {
    let big_stdout = vec![b'a'; STREAM_CAP_BYTES + 10];
    let transcript = render_output(&big_stdout, b"important error");
    // stderr survives in full even when stdout overflows its own cap.
    assert!(transcript.contains("important error"));
    assert!(transcript.contains("[output clipped"));
}

#[test]
fn run_command_is_sensitive() {
    let dir = tempfile::tempdir().unwrap();
    let ws = Arc::new(Workspace::new(dir.path(), false, &[]));
    assert!(RunCommandTool::new(ws, 10).sensitive());
}
