//! Integration tests for the talkroom CLI
//!
//! Each test drives the real binary against a database in a temporary
//! directory, walking a participant from joining a room to a refund.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{Duration, Utc};
use serde_json::Value;
use tempfile::TempDir;

struct Env {
    _dir: TempDir,
    db: PathBuf,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = dir.path().join("talkroom.db");
        // Never created, so defaults apply regardless of the host's config
        let config = dir.path().join("missing.toml");
        Self { _dir: dir, db, config }
    }

    fn run(&self, args: &[&str]) -> std::process::Output {
        run_talkroom(args, &self.db, &self.config)
    }

    fn json(&self, args: &[&str]) -> Value {
        let mut full = args.to_vec();
        full.push("--json");
        let output = self.run(&full);
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            stderr(&output)
        );
        serde_json::from_str(&stdout(&output)).expect("stdout should be JSON")
    }
}

fn run_talkroom(args: &[&str], db_path: &Path, config_path: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_talkroom"))
        .args(args)
        .env("TALKROOM_DB", db_path)
        .env("TALKROOM_CONFIG", config_path)
        .env_remove("TALKROOM_USER")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute talkroom")
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Host (id 1) with a free room starting in three days, and a second user (id 2).
fn seeded() -> (Env, String) {
    let env = Env::new();
    assert!(env.run(&["init"]).status.success());
    env.json(&["user", "add", "Host", "host@example.com"]);
    env.json(&["user", "add", "Mina", "mina@example.com"]);

    let starts = (Utc::now() + Duration::days(3)).to_rfc3339();
    let room = env.json(&[
        "room", "create", "Atomic Habits", "--starts-at", &starts, "--keywords", "habit,focus", "--weeks", "1",
        "--user", "1",
    ]);
    let room_id = room["data"]["id"].as_i64().expect("room id").to_string();
    (env, room_id)
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_talkroom"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("talkroom"));
    assert!(out.contains("Talk rooms"));
}

#[test]
fn test_init_reports_path() {
    let env = Env::new();
    let output = env.run(&["init"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Database initialized at"));
    assert!(env.db.exists());
}

#[test]
fn test_missing_user_is_an_error() {
    let env = Env::new();
    let output = env.run(&["daily", "logs"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no acting user"));
}

#[test]
fn test_json_error_shape() {
    let env = Env::new();
    let output = env.run(&["room", "show", "99", "--json"]);
    assert!(!output.status.success());
    let value: Value = serde_json::from_str(&stdout(&output)).expect("error should be JSON");
    assert_eq!(value["success"], false);
    assert_eq!(value["error"], "Room not found");
}

// =============================================================================
// Room Tests
// =============================================================================

#[test]
fn test_room_list_and_join() {
    let (env, room) = seeded();

    let list = env.json(&["room", "list"]);
    assert_eq!(list["data"][0]["title"], "Atomic Habits");
    assert_eq!(list["data"][0]["keywords"][1], "focus");

    assert!(env.run(&["room", "join", &room, "--user", "2"]).status.success());
    let again = env.run(&["room", "join", &room, "--user", "2"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("already joined"));

    let detail = env.json(&["room", "show", &room]);
    assert_eq!(detail["data"]["participants"].as_array().map(Vec::len), Some(2));
}

#[test]
fn test_only_host_edits_room() {
    let (env, room) = seeded();
    assert!(!env.run(&["room", "edit", &room, "--title", "Mine now", "--user", "2"]).status.success());

    let edited = env.json(&["room", "edit", &room, "--title", "Atomic Habits II", "--user", "1"]);
    assert_eq!(edited["data"]["title"], "Atomic Habits II");
}

// =============================================================================
// Review, Chat, Course and Daily Flow
// =============================================================================

#[test]
fn test_review_gates_chat() {
    let (env, room) = seeded();
    assert!(env.run(&["room", "join", &room, "--user", "2"]).status.success());

    let blocked = env.run(&["chat", "send", &room, "hello", "--user", "2"]);
    assert!(!blocked.status.success());

    env.json(&["review", &room, "Chapter 3 changed my mornings", "--rating", "5", "--user", "2"]);
    env.json(&["chat", "send", &room, "hello", "--user", "2"]);

    let history = env.json(&["chat", "history", &room]);
    let messages = history["data"].as_array().expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "hello");
    assert_eq!(messages[0]["kind"], "Text");
}

#[test]
fn test_course_daily_and_aggregate() {
    let (env, room) = seeded();
    assert!(env.run(&["room", "join", &room, "--user", "2"]).status.success());
    env.json(&["review", &room, "Worth it", "--user", "2"]);

    let course = env.json(&["course", "design", &room, "--template", "morning", "--user", "2"]);
    assert_eq!(course["data"]["total_days"], 7);

    env.json(&["daily", "morning", &room, "Read 20 pages", "--share", "--user", "2"]);
    env.json(&["daily", "evening", &room, "Read 25 pages", "--user", "2"]);

    let status = env.json(&["daily", "status", &room, "--user", "2"]);
    assert_eq!(status["data"]["day_number"], 1);
    assert_eq!(status["data"]["log"]["evening_review"], "Read 25 pages");

    let feed = env.json(&["feed", "list"]);
    assert_eq!(feed["data"][0]["content"], "Read 20 pages");

    let report = env.json(&["aggregate"]);
    assert_eq!(report["data"]["processedUsers"], 2);

    // A second run on the same day must not grow the streak again
    env.json(&["aggregate"]);
    let profile = env.json(&["profile", "2"]);
    assert_eq!(profile["data"]["profile"]["user"]["streak_days"], 1);
    assert_eq!(profile["data"]["profile"]["promises_written"], 1);
}

// =============================================================================
// Refund and Notification Tests
// =============================================================================

#[test]
fn test_refund_once() {
    let (env, room) = seeded();
    assert!(env.run(&["room", "join", &room, "--user", "2"]).status.success());

    let outcome = env.json(&["refund", "request", &room, "--user", "2"]);
    assert_eq!(outcome["data"]["success"], true);
    assert_eq!(outcome["data"]["refundPercentage"], 100);

    let again = env.run(&["refund", "request", &room, "--user", "2"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("already processed"));

    let notes = env.json(&["notify", "list", "--unread", "--user", "2"]);
    assert_eq!(notes["data"][0]["title"], "Refund complete");
}

#[test]
fn test_notify_send_and_read() {
    let (env, _) = seeded();
    let delivery = env.json(&["notify", "send", "2", "Time to write", "--kind", "nudge"]);
    assert_eq!(delivery["data"]["pushed"], false);
    let id = delivery["data"]["notification_id"].as_i64().expect("id").to_string();

    env.json(&["notify", "read", &id, "--user", "2"]);
    let unread = env.json(&["notify", "list", "--unread", "--user", "2"]);
    assert_eq!(unread["data"].as_array().map(Vec::len), Some(0));

    // Another user's notification is not theirs to read
    assert!(!env.run(&["notify", "read", &id, "--user", "1"]).status.success());
}
