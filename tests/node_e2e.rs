//! End-to-end scenarios against a real `node` binary.
//!
//! These drive the full tool surface: launch a fixture script under
//! `--inspect-brk`, then step, break, evaluate and inspect through the
//! dispatcher exactly as an RPC controller would. Every test self-skips
//! when node is not installed.

use std::path::PathBuf;

use debug_bridge::config::BridgeConfig;
use debug_bridge::debugger::{SessionSlot, new_session_slot};
use debug_bridge::tools::{self, ToolResponse};
use serde_json::{Value, json};

fn node_available() -> bool {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .is_ok()
}

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    path.canonicalize()
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn payload(response: &ToolResponse) -> Value {
    serde_json::from_str(&response.content[0].text).expect("payload is not JSON")
}

async fn call(slot: &SessionSlot, tool: &str, params: Value) -> Value {
    let response = tools::dispatch(slot, &BridgeConfig::default(), tool, params)
        .await
        .expect("unknown tool");
    let body = payload(&response);
    assert!(
        !response.is_error,
        "{tool} failed unexpectedly: {body}"
    );
    body
}

async fn call_expecting_error(slot: &SessionSlot, tool: &str, params: Value) -> Value {
    let response = tools::dispatch(slot, &BridgeConfig::default(), tool, params)
        .await
        .expect("unknown tool");
    assert!(response.is_error, "{tool} should have failed");
    payload(&response)
}

/// Evaluate an expression and return its primitive value.
async fn eval_value(slot: &SessionSlot, expression: &str) -> Value {
    let body = call(slot, "evaluate_expression", json!({"expression": expression})).await;
    body["value"].clone()
}

// =============================================================================
// S1/S2: breakpoint, evaluate, stepping
// =============================================================================

#[tokio::test]
async fn breakpoint_step_and_completion() {
    if !node_available() {
        eprintln!("skipping: node not found on PATH");
        return;
    }
    let slot = new_session_slot();
    let script = fixture("sample.js");

    let started = call(&slot, "start", json!({"script_path": script})).await;
    assert_eq!(started["pause_id"], "p1");
    assert!(
        started["frame"]["url"]
            .as_str()
            .unwrap()
            .ends_with("sample.js")
    );
    assert_eq!(started["frame"]["line"], 1);

    let bp = call(&slot, "set_breakpoint", json!({"file_path": script, "line": 3})).await;
    assert!(!bp["breakpoint_id"].as_str().unwrap().is_empty());

    let paused = call(&slot, "resume_execution", Value::Null).await;
    assert_eq!(paused["frame"]["line"], 3);
    assert_eq!(paused["frame"]["function_name"], "add");

    assert_eq!(eval_value(&slot, "a").await, json!(2));
    assert_eq!(eval_value(&slot, "b").await, json!(3));
    assert_eq!(eval_value(&slot, "sum").await, json!(5));

    let stepped = call(&slot, "step_over", Value::Null).await;
    assert!(stepped["status"].as_str().unwrap().starts_with("Paused"));

    let out = call(&slot, "step_out", Value::Null).await;
    assert!(out["status"].as_str().unwrap().starts_with("Paused"));

    let done = call(&slot, "resume_execution", json!({"include_console": true})).await;
    assert_eq!(done["exit_code"], 0);
    let console = done["console"].as_array().unwrap();
    assert!(
        console.iter().any(|m| m.as_str().unwrap() == "[log] result: 5"),
        "expected result log, got {console:?}"
    );

    // The session died with the target.
    let err = call_expecting_error(&slot, "get_pause_info", Value::Null).await;
    assert_eq!(err["error"]["kind"], "no-session");
}

#[tokio::test]
async fn step_into_enters_the_callee() {
    if !node_available() {
        eprintln!("skipping: node not found on PATH");
        return;
    }
    let slot = new_session_slot();
    let script = fixture("sample.js");

    call(&slot, "start", json!({"script_path": script})).await;
    call(&slot, "set_breakpoint", json!({"file_path": script, "line": 5})).await;

    let paused = call(&slot, "resume_execution", Value::Null).await;
    assert_eq!(paused["frame"]["line"], 5);

    let inside = call(&slot, "step_into", json!({"include_stack": true})).await;
    assert_eq!(inside["frame"]["function_name"], "add");
    assert_eq!(inside["frame"]["line"], 2);
    let stack = inside["stack"].as_array().unwrap();
    assert!(stack.len() >= 2, "expected add plus a caller frame");

    assert_eq!(eval_value(&slot, "a").await, json!(2));

    call(&slot, "stop", Value::Null).await;
}

// =============================================================================
// S3: closure and object drill-down
// =============================================================================

#[tokio::test]
async fn closure_variables_and_object_drill_down() {
    if !node_available() {
        eprintln!("skipping: node not found on PATH");
        return;
    }
    let slot = new_session_slot();
    let script = fixture("advanced.js");

    call(&slot, "start", json!({"script_path": script})).await;

    // Run past the entry break into the debugger statement inside inc.
    let paused = call(&slot, "resume_execution", Value::Null).await;
    assert_eq!(paused["frame"]["function_name"], "inc");

    let scopes = call(&slot, "inspect_scopes", json!({"max_props": 20})).await;
    let meta_object_id = scopes["scopes"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|scope| scope["type"] == "closure")
        .flat_map(|scope| scope["properties"].as_array().unwrap())
        .find(|prop| prop["name"] == "meta")
        .and_then(|prop| prop["object_id"].as_str())
        .expect("closure scope should expose meta with an object id")
        .to_owned();

    let meta = call(
        &slot,
        "get_object_properties",
        json!({"object_id": meta_object_id}),
    )
    .await;
    let props = meta["properties"].as_array().unwrap();
    let tag = props.iter().find(|p| p["name"] == "tag").unwrap();
    assert_eq!(tag["value"], "C");
    let nested_object_id = props
        .iter()
        .find(|p| p["name"] == "nested")
        .and_then(|p| p["object_id"].as_str())
        .expect("nested should carry an object id")
        .to_owned();

    let nested = call(
        &slot,
        "get_object_properties",
        json!({"object_id": nested_object_id}),
    )
    .await;
    let a = nested["properties"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "a")
        .unwrap();
    assert_eq!(a["value"], "1");
    assert_eq!(a["type"], "number");

    call(&slot, "stop", Value::Null).await;
}

// =============================================================================
// S5: pause on exceptions
// =============================================================================

#[tokio::test]
async fn exception_pause_and_nonzero_exit() {
    if !node_available() {
        eprintln!("skipping: node not found on PATH");
        return;
    }
    let slot = new_session_slot();
    let script = fixture("throws.js");

    call(&slot, "start", json!({"script_path": script})).await;
    call(&slot, "set_exception_breakpoints", json!({"state": "all"})).await;

    let paused = call(&slot, "resume_execution", Value::Null).await;
    assert!(
        paused["status"].as_str().unwrap().contains("exception"),
        "expected an exception pause, got {paused}"
    );

    let info = call(&slot, "get_pause_info", Value::Null).await;
    assert_eq!(info["reason"], "exception");
    assert_eq!(info["function_name"], "boom");

    // The same exception may pause again when it becomes uncaught; keep
    // resuming until the target exits.
    let mut exit_code = None;
    for _ in 0..4 {
        let outcome = call(&slot, "resume_execution", Value::Null).await;
        if let Some(code) = outcome["exit_code"].as_i64() {
            exit_code = Some(code);
            break;
        }
    }
    assert_eq!(exit_code, Some(1), "uncaught exception should exit 1");
}

// =============================================================================
// S6: logpoints
// =============================================================================

#[tokio::test]
async fn logpoint_emits_without_pausing() {
    if !node_available() {
        eprintln!("skipping: node not found on PATH");
        return;
    }
    let slot = new_session_slot();
    let script = fixture("logpoint.js");

    call(&slot, "start", json!({"script_path": script})).await;
    call(
        &slot,
        "add_logpoint",
        json!({"file_path": script, "line": 2, "message": "x={x}"}),
    )
    .await;

    // The logpoint never pauses, so the first resume runs to completion.
    let done = call(&slot, "resume_execution", json!({"include_console": true})).await;
    assert_eq!(done["exit_code"], 0);

    let console: Vec<&str> = done["console"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    for expected in ["[log] x=0", "[log] x=2", "[log] tick 0", "[log] tick 2"] {
        assert!(
            console.contains(&expected),
            "missing {expected} in {console:?}"
        );
    }
    // Interleaving: the logpoint fires before the statement it annotates.
    let x0 = console.iter().position(|m| *m == "[log] x=0").unwrap();
    let tick0 = console.iter().position(|m| *m == "[log] tick 0").unwrap();
    assert!(x0 < tick0, "logpoint should precede the annotated statement");
}
