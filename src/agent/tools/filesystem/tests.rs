use super::*;
use serde_json::json;

fn workspace() -> (tempfile::TempDir, Arc<Workspace>) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Arc::new(Workspace::new(dir.path(), true, &[]));
    (dir, ws)
}

fn locked_workspace() -> (tempfile::TempDir, Arc<Workspace>) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Arc::new(Workspace::new(dir.path(), false, &[]));
    (dir, ws)
}

#[tokio::test]
async fn read_file_returns_content() {
    let (dir, ws) = workspace();
    std::fs::write(dir.path().join("hello.txt"), "hello world\n").unwrap();

    let result = ReadFileTool::new(ws)
        .execute(json!({"path": "hello.txt"}))
        .await;
    assert!(result.success);
    assert_eq!(result.output, "hello world\n");
}

#[tokio::test]
async fn read_file_not_found() {
    let (_dir, ws) = workspace();
    let result = ReadFileTool::new(ws)
        .execute(json!({"path": "missing.txt"}))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("NotFound"));
}

#[tokio::test]
async fn read_file_traversal_refused() {
    let (_dir, ws) = workspace();
    let result = ReadFileTool::new(ws)
        .execute(json!({"path": "../etc/passwd"}))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("PathEscape"));
}

#[tokio::test]
async fn read_file_rejects_unknown_arg() {
    let (_dir, ws) = workspace();
    let result = ReadFileTool::new(ws)
        .execute(json!({"path": "x", "nope": true}))
        .await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("ValidationError"));
    assert!(error.contains("nope"));
}

#[tokio::test]
async fn read_file_missing_required_arg() {
    let (_dir, ws) = workspace();
    let result = ReadFileTool::new(ws).execute(json!({})).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("path"));
}

#[tokio::test]
async fn list_files_sorted_with_dir_suffix() {
    let (dir, ws) = workspace();
    std::fs::write(dir.path().join("b.txt"), "").unwrap();
    std::fs::write(dir.path().join("a.txt"), "").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let result = ListFilesTool::new(ws).execute(json!({"path": "."})).await;
    assert!(result.success);
    assert_eq!(result.output, "a.txt\nb.txt\nsub/");
}

#[tokio::test]
async fn list_files_pattern_filter() {
    let (dir, ws) = workspace();
    std::fs::write(dir.path().join("a.md"), "").unwrap();
    std::fs::write(dir.path().join("b.rs"), "").unwrap();

    let result = ListFilesTool::new(ws)
        .execute(json!({"path": ".", "pattern": "*.md"}))
        .await;
    assert!(result.success);
    assert_eq!(result.output, "a.md");
}

#[tokio::test]
async fn find_files_recursive() {
    let (dir, ws) = workspace();
    std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
    std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
    std::fs::write(dir.path().join("src/nested/util.rs"), "").unwrap();
    std::fs::write(dir.path().join("notes.md"), "").unwrap();

    let result = FindFilesTool::new(ws)
        .execute(json!({"pattern": "*.rs"}))
        .await;
    assert!(result.success);
    assert!(result.output.contains("src/main.rs"));
    assert!(result.output.contains("src/nested/util.rs"));
    assert!(!result.output.contains("notes.md"));
}

#[tokio::test]
async fn find_files_skips_hidden_dirs() {
    let (dir, ws) = workspace();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".git/config.rs"), "").unwrap();

    let result = FindFilesTool::new(ws)
        .execute(json!({"pattern": "*.rs"}))
        .await;
    assert!(result.success);
    assert_eq!(result.output, "(no matches)");
}

#[tokio::test]
async fn write_file_creates_parents() {
    let (dir, ws) = workspace();
    let result = WriteFileTool::new(ws)
        .execute(json!({"path": "deep/nested/file.txt", "content": "data"}))
        .await;
    assert!(result.success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("deep/nested/file.txt")).unwrap(),
        "data"
    );
}

#[tokio::test]
async fn write_file_create_new_refuses_overwrite() {
    let (dir, ws) = workspace();
    std::fs::write(dir.path().join("existing.txt"), "old").unwrap();

    let result = WriteFileTool::new(ws)
        .execute(json!({"path": "existing.txt", "content": "new", "mode": "create_new"}))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("already exists"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("existing.txt")).unwrap(),
        "old"
    );
}

#[tokio::test]
async fn write_file_append_creates_when_absent() {
    let (dir, ws) = workspace();
    let tool = WriteFileTool::new(ws);
    let result = tool
        .execute(json!({"path": "log.txt", "content": "one\n", "mode": "append"}))
        .await;
    assert!(result.success);
    let result = tool
        .execute(json!({"path": "log.txt", "content": "two\n", "mode": "append"}))
        .await;
    assert!(result.success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("log.txt")).unwrap(),
        "one\ntwo\n"
    );
}

#[tokio::test]
async fn write_file_rejects_bad_mode() {
    let (_dir, ws) = workspace();
    let result = WriteFileTool::new(ws)
        .execute(json!({"path": "x.txt", "content": "", "mode": "replace"}))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("ValidationError"));
}

#[tokio::test]
async fn delete_file_gated_by_allow_delete() {
    let (dir, ws) = locked_workspace();
    std::fs::write(dir.path().join("victim.txt"), "x").unwrap();

    let result = DeleteFileTool::new(ws)
        .execute(json!({"path": "victim.txt"}))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("allow_delete"));
    assert!(dir.path().join("victim.txt").exists());
}

#[tokio::test]
async fn delete_file_removes_when_allowed() {
    let (dir, ws) = workspace();
    std::fs::write(dir.path().join("victim.txt"), "x").unwrap();

    let result = DeleteFileTool::new(ws)
        .execute(json!({"path": "victim.txt"}))
        .await;
    assert!(result.success);
    assert!(!dir.path().join("victim.txt").exists());
}
