//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against a throwaway data directory.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command with `TENFOLD_HOME` pointed at `home`.
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "tenfold-cli", "--"])
        .args(args)
        .env("TENFOLD_HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (code, stdout, stderr) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_register_and_stats() {
    let home = TempDir::new().unwrap();
    let user = run_json(home.path(), &["user", "register", "42"]);
    assert_eq!(user["user_id"], 42);
    assert_eq!(user["current_streak"], 0);

    let stats = run_json(home.path(), &["user", "stats", "42"]);
    assert_eq!(stats["completed_days"], 0);
    assert_eq!(stats["reachable"], true);
}

#[test]
fn test_today_offers_question_change() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["today", "7"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Question of the day"));
    assert!(stdout.contains("[change question: 3 left]"));
}

#[test]
fn test_answers_complete_the_day() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["answer", "7", "a\nb\nc\nd"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Answers: 4/10"));

    let (code, stdout, _) = run_cli(home.path(), &["answer", "7", "e\nf\ng\nh\ni\nj\nk"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("today's task is complete"));

    let (code, _, stderr) = run_cli(home.path(), &["answer", "7", "late"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("already finalized"));

    let stats = run_json(home.path(), &["user", "stats", "7"]);
    assert_eq!(stats["current_streak"], 1);
    assert_eq!(stats["today"]["answers_count"], 11);
}

#[test]
fn test_change_question_limit() {
    let home = TempDir::new().unwrap();
    run_cli(home.path(), &["today", "9"]);
    for _ in 0..3 {
        let (code, _, _) = run_cli(home.path(), &["change-question", "9"]);
        assert_eq!(code, 0);
    }
    let (code, _, stderr) = run_cli(home.path(), &["change-question", "9"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("limit"));
}

#[test]
fn test_day_close_reports_misses() {
    let home = TempDir::new().unwrap();
    run_cli(home.path(), &["answer", "3", "only one"]);
    let stats = run_json(home.path(), &["stats"]);
    let date = stats["date"].as_str().unwrap().to_string();

    let report = run_json(home.path(), &["day", "close", "--date", &date]);
    assert_eq!(report["missed_users"], serde_json::json!([3]));

    let again = run_json(home.path(), &["day", "close", "--date", &date]);
    assert_eq!(again["missed_users"], serde_json::json!([]));
}

#[test]
fn test_day_issue_counts_users() {
    let home = TempDir::new().unwrap();
    run_cli(home.path(), &["user", "register", "1"]);
    run_cli(home.path(), &["user", "register", "2"]);
    let report = run_json(home.path(), &["day", "issue"]);
    assert_eq!(report["attempted"], 2);
    assert_eq!(report["delivered"], 2);
}

#[test]
fn test_question_and_badge_catalogs() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["question", "add", "Ten uses for a paperclip?"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Question added:"));

    let questions = run_json(home.path(), &["question", "list"]);
    assert!(questions
        .as_array()
        .unwrap()
        .iter()
        .any(|q| q["text"] == "Ten uses for a paperclip?"));

    let badges = run_json(home.path(), &["badge", "list"]);
    assert_eq!(badges.as_array().unwrap().len(), 4);
}

#[test]
fn test_config_get_set() {
    let home = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(
        home.path(),
        &["config", "get", "progress.completion_threshold"],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "10");

    let (code, _, _) = run_cli(home.path(), &["config", "set", "schedule.issue_at", "09:30"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "schedule.issue_at"]);
    assert_eq!(stdout.trim(), "09:30");

    let (code, _, _) = run_cli(home.path(), &["config", "set", "schedule.issue_at", "25:99"]);
    assert_ne!(code, 0);
}
