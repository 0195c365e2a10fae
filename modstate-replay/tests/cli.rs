//! Command-line behavior of modstate-replay

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

const APP_TREE: &str = r#"
name = "app"

[[children]]
name = "user"
emits = ["LOADING_START", "LOADING_END"]
reacts_to = ["article"]

[[children.on]]
event = "LOADING_START"
ops = [{ op = "set", path = "/ui/isLoading", value = true }]

[[children.on]]
event = "LOADING_END"
ops = [{ op = "set", path = "/ui/isLoading", value = false }]

[[children.on]]
event = "ARTICLE/ARTICLES_FETCH_SUCCESS"
ops = [{ op = "increment", path = "/data/fetches" }]

[children.accessors]
isLoading = { flag = "/ui/isLoading" }

[[children.children]]
name = "article"
emits = ["ARTICLES_FETCH_SUCCESS"]

[children.children.initial.data]
articles = []

[[children.children.on]]
event = "ARTICLES_FETCH_SUCCESS"
ops = [{ op = "set_payload", path = "/data/articles" }]

[children.children.accessors]
articleCount = { count = "/data/articles" }

[[children]]
name = "payment"

[children.initial.data]
balance = 10

[children.accessors]
balance = { pointer = "/data/balance" }
"#;

const EVENTS: &str = r#"{"id": "USER/LOADING_START"}
{"id": "ARTICLE/ARTICLES_FETCH_SUCCESS", "payload": [{"id": 1}, {"id": 2}]}

{"id": "NONEXISTENT/EVENT", "payload": {"x": 1}}
{"id": "USER/LOADING_END"}
"#;

fn setup() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let tree_path = temp_dir.path().join("app.toml");
    fs::write(&tree_path, APP_TREE).unwrap();
    let config_path = temp_dir.path().join("config.toml");
    (
        temp_dir,
        tree_path.to_string_lossy().to_string(),
        config_path.to_string_lossy().to_string(),
    )
}

fn replay(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("modstate-replay").unwrap();
    cmd.env("MODSTATE_CONFIG", config_path);
    cmd
}

#[test]
fn test_final_state_from_stdin() {
    let (_temp_dir, tree_path, config_path) = setup();

    let output = replay(&config_path)
        .arg(&tree_path)
        .write_stdin(EVENTS)
        .output()
        .unwrap();
    assert!(output.status.success());

    let state: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state["USER"]["ui"], json!({"isLoading": false}));
    assert_eq!(state["USER"]["data"], json!({"fetches": 1}));
    assert_eq!(state["USER"]["ARTICLE"]["data"]["articles"], json!([{"id": 1}, {"id": 2}]));
    assert_eq!(state["PAYMENT"]["data"], json!({"balance": 10}));
}

#[test]
fn test_each_prints_one_snapshot_per_event() {
    let (temp_dir, tree_path, config_path) = setup();
    let events_path = temp_dir.path().join("events.jsonl");
    fs::write(&events_path, EVENTS).unwrap();

    let output = replay(&config_path)
        .arg(&tree_path)
        .arg("--events")
        .arg(&events_path)
        .arg("--each")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let snapshots: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(snapshots.len(), 4);
    assert_eq!(snapshots[0]["USER"]["ui"]["isLoading"], json!(true));
    // The unowned event leaves the snapshot as it was
    assert_eq!(snapshots[1], snapshots[2]);
    assert_eq!(snapshots[3]["USER"]["ui"]["isLoading"], json!(false));
}

#[test]
fn test_select_from_ancestor() {
    let (_temp_dir, tree_path, config_path) = setup();

    replay(&config_path)
        .args([tree_path.as_str(), "--select", "ARTICLE.articleCount", "--as", "USER"])
        .write_stdin(EVENTS)
        .assert()
        .success()
        .stdout(predicate::str::diff("2\n"));
}

#[test]
fn test_select_defaults_to_owner() {
    let (_temp_dir, tree_path, config_path) = setup();

    replay(&config_path)
        .args([tree_path.as_str(), "--select", "USER.isLoading", "--each"])
        .write_stdin(EVENTS)
        .assert()
        .success()
        .stdout(predicate::str::diff("true\ntrue\ntrue\nfalse\n"));
}

#[test]
fn test_select_from_sibling_is_rejected() {
    let (_temp_dir, tree_path, config_path) = setup();

    replay(&config_path)
        .args([tree_path.as_str(), "--select", "ARTICLE.articleCount", "--as", "PAYMENT"])
        .write_stdin(EVENTS)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("PAYMENT may not read ARTICLE.articleCount"));
}

#[test]
fn test_unknown_accessor_is_rejected() {
    let (_temp_dir, tree_path, config_path) = setup();

    replay(&config_path)
        .args([tree_path.as_str(), "--select", "USER.nothing"])
        .write_stdin(EVENTS)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown accessor USER.nothing"));
}

#[test]
fn test_malformed_line_reports_line_number() {
    let (_temp_dir, tree_path, config_path) = setup();

    replay(&config_path)
        .arg(&tree_path)
        .write_stdin("{\"id\": \"USER/LOADING_START\"}\nnot json\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Malformed event on line 2"));
}

#[test]
fn test_empty_input_prints_initial_state() {
    let (_temp_dir, tree_path, config_path) = setup();

    let output = replay(&config_path)
        .arg(&tree_path)
        .write_stdin("")
        .output()
        .unwrap();
    assert!(output.status.success());

    let state: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state["USER"]["ARTICLE"]["data"], json!({"articles": []}));
    assert_eq!(state["data"], json!({}));
}

#[test]
fn test_unhandled_event_is_logged_not_fatal() {
    let (_temp_dir, tree_path, config_path) = setup();

    replay(&config_path)
        .arg(&tree_path)
        .write_stdin("{\"id\": \"NONEXISTENT/EVENT\"}\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("no module owns this event"));
}
