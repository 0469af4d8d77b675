use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn daybook_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("daybook");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(root.join("shot1.png"), (0..1024).map(|i| (i % 256) as u8).collect::<Vec<u8>>())
        .unwrap();

    let config_content = format!(
        r#"[storage]
root = "{}/store"

[retrieval]
default_page_size = 10
max_page_size = 50

[embedding]
provider = "hash"
model = "hash-256"
dims = 256

[workers]
enabled = false
"#,
        root.display()
    );

    let config_path = config_dir.join("daybook.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_daybook(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = daybook_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run daybook binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_store() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_daybook(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Initialized daybook store"));

    let store = tmp.path().join("store");
    assert!(store.join("metadata.sqlite").exists());
    assert!(store.join("vectors.sqlite").exists());
    assert!(store.join("files").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_daybook(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_daybook(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_note_then_get() {
    let (_tmp, config_path) = setup_test_env();
    run_daybook(&config_path, &["init"]);

    let (stdout, stderr, success) = run_daybook(
        &config_path,
        &[
            "note",
            "2025-02-14",
            "--title",
            "Release day",
            "--notes",
            "shipped the migration",
            "--tag",
            "work",
            "--tag",
            "release",
        ],
    );
    assert!(success, "note failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Updated session 2025-02-14"));

    let (stdout, _, success) = run_daybook(&config_path, &["get", "2025-02-14"]);
    assert!(success);
    assert!(stdout.contains("--- Session 2025-02-14 ---"));
    assert!(stdout.contains("Release day"));
    assert!(stdout.contains("release, work"));
    assert!(stdout.contains("shipped the migration"));

    let (stdout, _, success) = run_daybook(&config_path, &["sessions"]);
    assert!(success);
    assert!(stdout.contains("1 sessions"));
    assert!(stdout.contains("2025-02-14"));

    let (stdout, _, success) = run_daybook(&config_path, &["search", "migration"]);
    assert!(success);
    assert!(stdout.contains("1 matching sessions"));
}

#[test]
fn test_get_missing_session_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_daybook(&config_path, &["init"]);

    let (_, stderr, success) = run_daybook(&config_path, &["get", "1999-01-01"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_screenshot_search_delete() {
    let (tmp, config_path) = setup_test_env();
    run_daybook(&config_path, &["init"]);

    let shot = tmp.path().join("shot1.png");
    let (stdout, stderr, success) = run_daybook(
        &config_path,
        &["screenshot", "2025-01-01", "Notes", shot.to_str().unwrap()],
    );
    assert!(success, "screenshot failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Saved 2025-01-01/Notes/shot1.png (1024 bytes)"));
    assert!(tmp
        .path()
        .join("store/files/2025-01-01/Notes/shot1.png")
        .exists());

    let (stdout, _, success) = run_daybook(&config_path, &["search", "Notes"]);
    assert!(success);
    assert!(stdout.contains("2025-01-01"));

    let (stdout, _, success) = run_daybook(&config_path, &["get", "2025-01-01"]);
    assert!(success);
    assert!(stdout.contains("screenshot: 2025-01-01/Notes/shot1.png"));

    let (stdout, stderr, success) = run_daybook(&config_path, &["delete", "2025-01-01"]);
    assert!(success, "delete failed: stdout={}, stderr={}", stdout, stderr);
    assert!(!tmp.path().join("store/files/2025-01-01").exists());

    let (stdout, _, success) = run_daybook(&config_path, &["search", "Notes"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (_, _, success) = run_daybook(&config_path, &["delete", "2025-01-01"]);
    assert!(!success, "deleting a missing session should fail");
}

#[test]
fn test_keyword_search_rejects_semantic_filters() {
    let (_tmp, config_path) = setup_test_env();
    run_daybook(&config_path, &["init"]);

    let (_, stderr, success) =
        run_daybook(&config_path, &["search", "anything", "--app", "Editor"]);
    assert!(!success);
    assert!(stderr.contains("--mode semantic"), "stderr: {}", stderr);
}

#[test]
fn test_embed_pending_then_semantic_search() {
    let (tmp, config_path) = setup_test_env();
    run_daybook(&config_path, &["init"]);

    let shot = tmp.path().join("shot1.png");
    run_daybook(
        &config_path,
        &["screenshot", "2025-03-03", "Browser", shot.to_str().unwrap()],
    );

    let (stdout, stderr, success) = run_daybook(&config_path, &["embed", "pending"]);
    assert!(success, "embed failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("total pending: 1"));
    assert!(stdout.contains("embedded: 1"));

    let (stdout, _, success) = run_daybook(&config_path, &["embed", "pending"]);
    assert!(success);
    assert!(stdout.contains("all blocks up to date"));

    let (stdout, stderr, success) = run_daybook(
        &config_path,
        &["search", "browser", "--mode", "semantic", "--top-k", "3"],
    );
    assert!(success, "semantic failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2025-03-03 / Browser"));
}

#[test]
fn test_stats_and_reindex() {
    let (_tmp, config_path) = setup_test_env();
    run_daybook(&config_path, &["init"]);
    run_daybook(&config_path, &["note", "2025-04-01", "--notes", "quiet day"]);

    let (stdout, stderr, success) = run_daybook(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Sessions:    1"));
    assert!(stdout.contains("hash-256"));

    let (stdout, stderr, success) = run_daybook(&config_path, &["reindex"]);
    assert!(success, "reindex failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sessions indexed: 1"));

    let (stdout, _, success) = run_daybook(&config_path, &["reindex", "2025-04-01"]);
    assert!(success);
    assert!(stdout.contains("already current"));
}
