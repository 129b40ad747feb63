//! CLI tests for `cmdtree run`.

use std::fs;
use std::process::Command;

use assert_cmd::cargo;

const MANIFEST: &str = r#"{
    "commands": [
        { "path": "greet", "aliases": ["hi"], "response": "Hello {name}!",
          "parameters": [
              { "name": "name", "type": "string", "required": true },
              { "name": "-loud", "type": "boolean" }
          ] },
        { "path": "admin", "permission": "admin", "response": "welcome" },
        { "path": "as", "trailing": true, "response": "as {who}",
          "parameters": [{ "name": "who", "type": "string", "required": true }] },
        { "path": "as greet", "response": "greeted" }
    ]
}"#;

fn cmdtree() -> Command {
    Command::new(cargo::cargo_bin!("cmdtree"))
}

fn write_manifest(content: &str) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("manifest.json");
    fs::write(&path, content).expect("write manifest");
    (dir, path.to_string_lossy().to_string())
}

fn run_json(path: &str, extra: &[&str]) -> (Option<i32>, serde_json::Value) {
    let output = cmdtree()
        .args(["run", path, "--output", "json"])
        .args(extra)
        .output()
        .expect("run command");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json = serde_json::from_str(&stdout).expect("valid json");
    (output.status.code(), json)
}

#[test]
fn run_binds_values_and_renders_response() {
    let (_dir, path) = write_manifest(MANIFEST);
    let (code, json) = run_json(&path, &["--", "hi", "Bob", "-loud"]);
    assert_eq!(code, Some(0));
    assert_eq!(json["ok"], true);
    assert_eq!(json["address"], "greet");
    assert_eq!(json["values"]["name"], "Bob");
    assert_eq!(json["values"]["-loud"], true);
    assert_eq!(json["response"], "Hello Bob!");
    assert!(json["error"].is_null());
}

#[test]
fn line_input_is_split_on_spaces() {
    let (_dir, path) = write_manifest(MANIFEST);
    let (code, json) = run_json(&path, &["--line", "greet Alice"]);
    assert_eq!(code, Some(0));
    assert_eq!(json["response"], "Hello Alice!");
}

#[test]
fn missing_argument_exits_one_with_token_index() {
    let (_dir, path) = write_manifest(MANIFEST);
    let (code, json) = run_json(&path, &["--", "greet"]);
    assert_eq!(code, Some(1));
    assert_eq!(json["attempted"], true);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["kind"], "argument-required");
    assert_eq!(json["error"]["message"], "Argument 'name' is required");
    assert_eq!(json["error"]["token"], 1);
}

#[test]
fn unmatched_input_exits_two() {
    let (_dir, path) = write_manifest(MANIFEST);
    let (code, json) = run_json(&path, &["--", "nope"]);
    assert_eq!(code, Some(2));
    assert_eq!(json["attempted"], false);
    assert_eq!(json["error"]["kind"], "no-command");
}

#[test]
fn permissions_come_from_flags() {
    let (_dir, path) = write_manifest(MANIFEST);
    // Hidden without the permission.
    let (code, _) = run_json(&path, &["--", "admin"]);
    assert_eq!(code, Some(2));
    let (code, json) = run_json(&path, &["--perm", "admin", "--", "admin"]);
    assert_eq!(code, Some(0));
    assert_eq!(json["response"], "welcome");
}

#[test]
fn trailing_replies_are_collected_as_messages() {
    let (_dir, path) = write_manifest(MANIFEST);
    let (code, json) = run_json(&path, &["--", "as", "root", "greet"]);
    assert_eq!(code, Some(0));
    assert_eq!(json["address"], "as greet");
    assert_eq!(json["messages"], serde_json::json!(["as root"]));
    assert_eq!(json["response"], "greeted");
}

#[test]
fn pretty_errors_underline_the_input() {
    let (_dir, path) = write_manifest(MANIFEST);
    let output = cmdtree()
        .args(["run", &path, "--output", "pretty", "--", "greet", "Bob", "extra"])
        .output()
        .expect("run command");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Too many arguments"), "stderr: {stderr}");
    assert!(stderr.contains("greet Bob"), "stderr: {stderr}");
}

#[test]
fn pretty_success_prints_response() {
    let (_dir, path) = write_manifest(MANIFEST);
    let output = cmdtree()
        .args(["run", &path, "--output", "pretty", "--", "greet", "Bea"])
        .output()
        .expect("run command");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Hello Bea!");
}

#[test]
fn invalid_manifest_fails_with_context() {
    let (_dir, path) = write_manifest("{ not json");
    let output = cmdtree()
        .args(["run", &path, "--", "greet"])
        .output()
        .expect("run command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load manifest"), "stderr: {stderr}");
}

#[test]
fn missing_manifest_file_fails() {
    let output = cmdtree()
        .args(["run", "does-not-exist.json", "--", "greet"])
        .output()
        .expect("run command");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read manifest"), "stderr: {stderr}");
}
