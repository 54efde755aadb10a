use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::debugger::{
    DebugSession, FrameSummary, RunOutcome, ScopeView, ensure_file_url, summarize_frame,
};
use crate::error::ToolError;

use super::inspect::scope_views;
use super::{parse_params, require_session};

// =============================================================================
// Parameters and output types
// =============================================================================

/// Context-bundle flags shared by every execution-control tool.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct ContextFlags {
    #[serde(default)]
    pub include_stack: bool,
    #[serde(default)]
    pub include_scopes: bool,
    #[serde(default)]
    pub include_console: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ControlParams {
    #[serde(flatten)]
    flags: ContextFlags,
}

#[derive(Debug, Deserialize)]
struct ContinueToLocationParams {
    file_path: String,
    line: u32,
    #[serde(default)]
    column: Option<u32>,
    #[serde(flatten)]
    flags: ContextFlags,
}

#[derive(Debug, Deserialize)]
struct RestartFrameParams {
    frame_index: usize,
    #[serde(default)]
    pause_id: Option<String>,
    #[serde(flatten)]
    flags: ContextFlags,
}

/// Successful pause result of an execution-control tool.
#[derive(Debug, Serialize)]
struct PauseResult {
    status: String,
    pause_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame: Option<FrameSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<Vec<FrameSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scopes: Option<Vec<ScopeView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    console: Option<Vec<String>>,
}

/// Completion result when the target exits instead of pausing.
#[derive(Debug, Serialize)]
struct CompletionResult {
    status: String,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    console: Option<Vec<String>>,
}

// =============================================================================
// Shared race-and-report driver
// =============================================================================

/// Scope property cap for the context bundle (top frame).
const BUNDLE_SCOPE_PROPS: usize = 15;

/// Run a continue-command through the resume-race and shape the winning
/// side into a tool payload. On target exit the session is torn down.
async fn run_and_report(
    slot: &mut Option<DebugSession>,
    method: &str,
    params: Option<Value>,
    flags: ContextFlags,
) -> Result<Value, ToolError> {
    let session = require_session(slot)?;
    let outcome = session.run_until_pause_or_exit(method, params).await?;

    match outcome {
        RunOutcome::Paused(pause_id) => {
            let payload = build_pause_result(session, &pause_id, flags).await?;
            serde_json::to_value(payload)
                .map_err(|e| ToolError::TargetCommandFailed(format!("serialization error: {e}")))
        }
        RunOutcome::Exited { exit_code } => {
            let console = if flags.include_console {
                Some(drain_console_strings(session))
            } else {
                None
            };
            // The target is gone: the session terminates with it.
            if let Some(session) = slot.take() {
                session.shutdown().await;
            }
            let payload = CompletionResult {
                status: format!("Target exited with code {exit_code}"),
                exit_code,
                console,
            };
            serde_json::to_value(payload)
                .map_err(|e| ToolError::TargetCommandFailed(format!("serialization error: {e}")))
        }
    }
}

/// Shape a winning pause into a `PauseResult` with the requested bundle.
async fn build_pause_result(
    session: &DebugSession,
    pause_id: &str,
    flags: ContextFlags,
) -> Result<PauseResult, ToolError> {
    let snapshot = session.resolve_pause(Some(pause_id))?;
    let scripts = session.scripts();

    let stack = if flags.include_stack {
        Some(
            snapshot
                .frames
                .iter()
                .map(|f| summarize_frame(f, &scripts))
                .collect(),
        )
    } else {
        None
    };

    let scopes = match (flags.include_scopes, snapshot.top_frame()) {
        (true, Some(top)) => Some(scope_views(session, top, BUNDLE_SCOPE_PROPS).await?),
        _ => None,
    };

    let console = if flags.include_console {
        Some(drain_console_strings(session))
    } else {
        None
    };

    Ok(PauseResult {
        status: snapshot.status_line(&scripts),
        pause_id: snapshot.id.clone(),
        frame: snapshot.top_frame().map(|f| summarize_frame(f, &scripts)),
        stack,
        scopes,
        console,
    })
}

/// Drain the console buffer into `[level] text` strings.
pub(super) fn drain_console_strings(session: &DebugSession) -> Vec<String> {
    session
        .drain_console()
        .iter()
        .map(ToString::to_string)
        .collect()
}

// =============================================================================
// Tools
// =============================================================================

/// `resume_execution`: run until the next pause or target exit.
pub async fn resume_execution(
    slot: &mut Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ControlParams = parse_params(params)?;
    run_and_report(slot, "Debugger.resume", None, params.flags).await
}

/// `step_over`: step to the next statement in the current frame.
pub async fn step_over(
    slot: &mut Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ControlParams = parse_params(params)?;
    run_and_report(slot, "Debugger.stepOver", None, params.flags).await
}

/// `step_into`: step into the next call.
pub async fn step_into(
    slot: &mut Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ControlParams = parse_params(params)?;
    run_and_report(slot, "Debugger.stepInto", None, params.flags).await
}

/// `step_out`: run until the current frame returns.
pub async fn step_out(slot: &mut Option<DebugSession>, params: Value) -> Result<Value, ToolError> {
    let params: ControlParams = parse_params(params)?;
    run_and_report(slot, "Debugger.stepOut", None, params.flags).await
}

/// `continue_to_location`: run until a specific source position.
///
/// The 1-based tool coordinates convert to the target's 0-based ones at
/// this boundary, and the file path must map to a script already in the
/// catalog.
pub async fn continue_to_location(
    slot: &mut Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ContinueToLocationParams = parse_params(params)?;

    let url = ensure_file_url(&params.file_path);
    let script_id = {
        let session = require_session(slot)?;
        session
            .find_script_by_url(&url)
            .ok_or_else(|| ToolError::UnknownScript(params.file_path.clone()))?
    };

    let mut location = json!({
        "scriptId": script_id,
        "lineNumber": params.line.saturating_sub(1),
    });
    if let Some(column) = params.column {
        location["columnNumber"] = json!(column.saturating_sub(1));
    }

    run_and_report(
        slot,
        "Debugger.continueToLocation",
        Some(json!({"location": location, "targetCallFrames": "any"})),
        params.flags,
    )
    .await
}

/// `restart_frame`: re-enter a frame of a recorded pause.
pub async fn restart_frame(
    slot: &mut Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: RestartFrameParams = parse_params(params)?;

    let call_frame_id = {
        let session = require_session(slot)?;
        let snapshot = session.resolve_pause(params.pause_id.as_deref())?;
        snapshot
            .frames
            .get(params.frame_index)
            .map(|f| f.call_frame_id.clone())
            .ok_or(ToolError::InvalidFrame {
                index: params.frame_index,
                available: snapshot.frames.len(),
            })?
    };

    run_and_report(
        slot,
        "Debugger.restartFrame",
        Some(json!({"callFrameId": call_frame_id, "mode": "StepInto"})),
        params.flags,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_flags_default_to_off() {
        let params: ControlParams = parse_params(Value::Null).unwrap();
        assert!(!params.flags.include_stack);
        assert!(!params.flags.include_scopes);
        assert!(!params.flags.include_console);
    }

    #[test]
    fn context_flags_parse_from_object() {
        let params: ControlParams =
            parse_params(json!({"include_stack": true, "include_console": true})).unwrap();
        assert!(params.flags.include_stack);
        assert!(!params.flags.include_scopes);
        assert!(params.flags.include_console);
    }

    #[test]
    fn continue_params_require_file_path_and_line() {
        let err = parse_params::<ContinueToLocationParams>(json!({"line": 3})).unwrap_err();
        assert_eq!(err.kind(), "invalid-params");

        let ok: ContinueToLocationParams =
            parse_params(json!({"file_path": "/tmp/a.js", "line": 3})).unwrap();
        assert_eq!(ok.line, 3);
        assert!(ok.column.is_none());
    }

    #[test]
    fn restart_params_default_pause_id_to_current() {
        let params: RestartFrameParams = parse_params(json!({"frame_index": 1})).unwrap();
        assert_eq!(params.frame_index, 1);
        assert!(params.pause_id.is_none());
    }

    #[tokio::test]
    async fn execution_tools_require_a_session() {
        let mut slot = None;
        let err = resume_execution(&mut slot, Value::Null).await.unwrap_err();
        assert_eq!(err.kind(), "no-session");
        let err = step_over(&mut slot, Value::Null).await.unwrap_err();
        assert_eq!(err.kind(), "no-session");
        let err = continue_to_location(
            &mut slot,
            json!({"file_path": "/tmp/a.js", "line": 1}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "no-session");
    }

    #[test]
    fn pause_result_omits_empty_bundle_fields() {
        let result = PauseResult {
            status: "Paused at file:///a.js:3 (reason: breakpoint)".into(),
            pause_id: "p2".into(),
            frame: None,
            stack: None,
            scopes: None,
            console: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("stack").is_none());
        assert!(json.get("scopes").is_none());
        assert!(json.get("console").is_none());
    }

    #[test]
    fn completion_result_carries_exit_code() {
        let result = CompletionResult {
            status: "Target exited with code 0".into(),
            exit_code: 0,
            console: Some(vec!["[log] done".into()]),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["console"][0], "[log] done");
    }
}
