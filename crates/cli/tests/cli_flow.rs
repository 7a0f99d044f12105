use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

struct Workspace {
    project: TempDir,
    state: TempDir,
}

fn setup() -> Workspace {
    let project = tempdir().unwrap();
    fs::write(
        project.path().join("orders.py"),
        r#"def load_order(order_id):
    """Fetch one order by id."""
    return validate_order({"id": order_id})


def validate_order(order):
    return order
"#,
    )
    .unwrap();
    Workspace {
        project,
        state: tempdir().unwrap(),
    }
}

#[allow(deprecated)]
fn codeweave(ws: &Workspace) -> Command {
    let mut cmd = Command::cargo_bin("codeweave").expect("binary");
    cmd.current_dir(ws.state.path())
        .env("CODEWEAVE_EMBEDDING_MODE", "stub")
        .arg("--store")
        .arg(ws.state.path().join("knowledge.json"))
        .arg("--index-dir")
        .arg(ws.state.path().join("index"));
    cmd
}

fn json_of(ws: &Workspace, args: &[&str]) -> Value {
    let output = codeweave(ws).arg("--json").args(args).output().expect("run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn analyze(ws: &Workspace) {
    codeweave(ws)
        .arg("analyze")
        .arg(ws.project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Knowledge store:"));
}

fn entity_id(ws: &Workspace, name: &str) -> String {
    let hits = json_of(ws, &["search", name]);
    hits[0]["id"].as_str().expect("entity id").to_string()
}

#[test]
fn search_before_analyze_asks_for_a_build() {
    let ws = setup();
    codeweave(&ws)
        .args(["search", "order"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("codeweave analyze"));
}

#[test]
fn analyze_then_query_the_graph() {
    let ws = setup();
    analyze(&ws);
    assert!(Path::new(&ws.state.path().join("knowledge.json")).is_file());

    let hits = json_of(&ws, &["search", "load_order"]);
    assert_eq!(hits.as_array().map(Vec::len), Some(1));
    assert_eq!(hits[0]["kind"], "function");

    let load = entity_id(&ws, "load_order");
    let callees = json_of(&ws, &["callees", &load]);
    assert_eq!(callees[0]["name"], "validate_order");

    let validate = entity_id(&ws, "validate_order");
    let impact = json_of(&ws, &["impact", &validate]);
    assert_eq!(impact["direct_dependents"][0], load.as_str());

    let trace = json_of(&ws, &["trace", &validate, "--direction", "callers"]);
    assert_eq!(trace[0]["call_depth"], 1);

    let stats = json_of(&ws, &["stats"]);
    assert!(stats["total_entities"].as_u64().unwrap_or(0) >= 3);
}

#[test]
fn context_for_unknown_entity_exits_not_found() {
    let ws = setup();
    analyze(&ws);

    codeweave(&ws)
        .args(["context", "no_such_thing"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("no_such_thing"));

    let bundle = json_of(&ws, &["context", "load_order", "--task", "debug"]);
    assert_eq!(bundle["task_type"], "debug");
    assert!(bundle["context_text"]
        .as_str()
        .unwrap_or_default()
        .contains("def load_order"));
}

#[test]
fn unknown_task_is_a_usage_error() {
    let ws = setup();
    codeweave(&ws)
        .args(["context", "load_order", "--task", "poetry"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn retrieve_without_index_falls_back_to_names() {
    let ws = setup();
    analyze(&ws);

    let result = json_of(&ws, &["retrieve", "where is load_order defined", "--limit", "1"]);
    assert_eq!(result["retrieval_mode"], "lexical");
    assert_eq!(result["task_type"], "locate");
    assert!(!result["errors"].as_array().expect("errors").is_empty());
    assert!(result["selected_entities"][0]["entity_id"]
        .as_str()
        .unwrap_or_default()
        .ends_with("::load_order"));
}

#[test]
fn index_enables_semantic_retrieval() {
    let ws = setup();
    let report = json_of(&ws, &["index", ws.project.path().to_str().expect("utf-8 path")]);
    assert_eq!(report["index"]["files"], 1);

    let result = json_of(&ws, &["retrieve", "load_order validate_order"]);
    assert_eq!(result["retrieval_mode"], "semantic");
    assert!(result["errors"].as_array().expect("errors").is_empty());

    let stats = json_of(&ws, &["stats"]);
    assert!(stats["total_chunks"].as_u64().unwrap_or(0) >= 2);
}
