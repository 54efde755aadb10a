pub mod breakpoints;
pub mod execution;
pub mod inspect;
pub mod lifecycle;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::BridgeConfig;
use crate::debugger::{DebugSession, SessionSlot};
use crate::error::ToolError;

// =============================================================================
// Response envelope
// =============================================================================

/// The envelope every tool returns: one text content block whose payload
/// is a JSON object, plus an error flag.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

/// A single content block.
#[derive(Debug, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl ToolResponse {
    /// Wrap a successful payload.
    #[must_use]
    pub fn success(payload: &impl Serialize) -> Self {
        let text = serde_json::to_string(payload)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization error: {e}"}}"#));
        Self {
            content: vec![ContentBlock { kind: "text", text }],
            is_error: false,
        }
    }

    /// Wrap a tool error.
    #[must_use]
    pub fn error(err: &ToolError) -> Self {
        let text = err.to_payload().to_string();
        Self {
            content: vec![ContentBlock { kind: "text", text }],
            is_error: true,
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Deserialize a tool's parameter object. A missing/null `params` is
/// treated as an empty object so tools with all-optional parameters can
/// be called bare.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

/// Borrow the active session or fail with *no-session*.
fn require_session(slot: &Option<DebugSession>) -> Result<&DebugSession, ToolError> {
    slot.as_ref().ok_or(ToolError::NoSession)
}

/// Execute a named tool against the session slot.
///
/// Returns `None` for an unknown tool name so the RPC layer can answer
/// with a method-not-found error. Exactly one tool call runs at a time:
/// the slot lock is held for the duration of the call.
pub async fn dispatch(
    slot: &SessionSlot,
    config: &BridgeConfig,
    tool: &str,
    params: Value,
) -> Option<ToolResponse> {
    let mut guard = slot.lock().await;

    let result = match tool {
        "start" => lifecycle::start(&mut guard, config, params).await,
        "stop" => lifecycle::stop(&mut guard).await,
        "resume_execution" => execution::resume_execution(&mut guard, params).await,
        "step_over" => execution::step_over(&mut guard, params).await,
        "step_into" => execution::step_into(&mut guard, params).await,
        "step_out" => execution::step_out(&mut guard, params).await,
        "continue_to_location" => execution::continue_to_location(&mut guard, params).await,
        "restart_frame" => execution::restart_frame(&mut guard, params).await,
        "set_breakpoint" => breakpoints::set_breakpoint(&guard, params).await,
        "set_breakpoint_condition" => breakpoints::set_breakpoint_condition(&guard, params).await,
        "add_logpoint" => breakpoints::add_logpoint(&guard, params).await,
        "set_exception_breakpoints" => {
            breakpoints::set_exception_breakpoints(&guard, params).await
        }
        "blackbox_scripts" => breakpoints::blackbox_scripts(&guard, params).await,
        "get_pause_info" => inspect::get_pause_info(&guard, params),
        "list_call_stack" => inspect::list_call_stack(&guard, params),
        "inspect_scopes" => inspect::inspect_scopes(&guard, params).await,
        "evaluate_expression" => inspect::evaluate_expression(&guard, params).await,
        "get_object_properties" => inspect::get_object_properties(&guard, params).await,
        "list_scripts" => inspect::list_scripts(&guard),
        "get_script_source" => inspect::get_script_source(&guard, params).await,
        "read_console" => inspect::read_console(&guard),
        _ => return None,
    };

    // Transport loss is the one tool-level error that terminates the
    // session: the socket is gone, so every catalog handle is dead too.
    if matches!(result, Err(ToolError::TransportClosed)) {
        if let Some(session) = guard.take() {
            session.shutdown().await;
        }
    }

    Some(match result {
        Ok(payload) => ToolResponse::success(&payload),
        Err(err) => ToolResponse::error(&err),
    })
}
