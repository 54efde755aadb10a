use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::debugger::{
    CallFrame, DebugSession, PropertyDescriptor, PropertyView, RemoteObject, ScopeView,
    ensure_file_url, format_remote_value, resolve_frame_url, summarize_frame, summarize_property,
};
use crate::error::ToolError;

use super::execution::drain_console_strings;
use super::{parse_params, require_session};

/// Default number of frames returned by `list_call_stack`.
const DEFAULT_STACK_DEPTH: usize = 10;
/// Default per-scope property cap.
const DEFAULT_SCOPE_PROPS: usize = 15;
/// The global scope is huge; it is always truncated to this many entries.
const GLOBAL_SCOPE_PROPS: usize = 5;
/// Default property cap for `get_object_properties`.
const DEFAULT_OBJECT_PROPS: usize = 50;
/// Properties shown in a receiver (`this`) preview.
const RECEIVER_PREVIEW_PROPS: usize = 5;

// =============================================================================
// Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct PauseInfoParams {
    #[serde(default)]
    pause_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallStackParams {
    #[serde(default = "default_stack_depth")]
    depth: usize,
    #[serde(default)]
    pause_id: Option<String>,
    #[serde(default)]
    include_this: bool,
}

fn default_stack_depth() -> usize {
    DEFAULT_STACK_DEPTH
}

#[derive(Debug, Deserialize)]
struct InspectScopesParams {
    #[serde(default)]
    pause_id: Option<String>,
    #[serde(default)]
    frame_index: usize,
    #[serde(default = "default_scope_props")]
    max_props: usize,
    #[serde(default = "default_true")]
    include_this_preview: bool,
}

fn default_scope_props() -> usize {
    DEFAULT_SCOPE_PROPS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct EvaluateParams {
    expression: String,
    #[serde(default)]
    pause_id: Option<String>,
    #[serde(default)]
    frame_index: usize,
    #[serde(default = "default_true")]
    return_by_value: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectPropertiesParams {
    object_id: String,
    #[serde(default = "default_object_props")]
    max_props: usize,
}

fn default_object_props() -> usize {
    DEFAULT_OBJECT_PROPS
}

#[derive(Debug, Default, Deserialize)]
struct ScriptSourceParams {
    #[serde(default)]
    script_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

// =============================================================================
// Output types
// =============================================================================

#[derive(Debug, Serialize)]
struct StackEntry {
    index: usize,
    function_name: Option<String>,
    url: String,
    line: u32,
    column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    this: Option<String>,
}

/// Summary of the receiver (`this`) object of a frame.
#[derive(Debug, Serialize)]
struct ReceiverView {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<Vec<PropertyView>>,
}

#[derive(Debug, Serialize)]
struct EvaluationResult {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    object_id: Option<String>,
    console: Vec<String>,
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Fetch the own properties of a remote object.
async fn fetch_own_properties(
    session: &DebugSession,
    object_id: &str,
) -> Result<Vec<PropertyDescriptor>, ToolError> {
    let result = session
        .command(
            "Runtime.getProperties",
            Some(json!({"objectId": object_id, "ownProperties": true})),
        )
        .await?;
    let props = result["result"].as_array().cloned().unwrap_or_default();
    Ok(props
        .into_iter()
        .filter_map(|p| serde_json::from_value(p).ok())
        .collect())
}

/// List the scopes of a frame with their own properties. Scopes without
/// a resolvable object handle are skipped; the global scope is truncated
/// to [`GLOBAL_SCOPE_PROPS`] entries.
pub(super) async fn scope_views(
    session: &DebugSession,
    frame: &CallFrame,
    max_props: usize,
) -> Result<Vec<ScopeView>, ToolError> {
    let mut views = Vec::with_capacity(frame.scope_chain.len());
    for scope in &frame.scope_chain {
        let Some(object_id) = &scope.object.object_id else {
            continue;
        };
        let cap = if scope.kind == "global" {
            GLOBAL_SCOPE_PROPS.min(max_props)
        } else {
            max_props
        };
        let props = fetch_own_properties(session, object_id).await?;
        let truncated = props.len() > cap;
        views.push(ScopeView {
            kind: scope.kind.clone(),
            properties: props.iter().take(cap).map(summarize_property).collect(),
            truncated,
        });
    }
    Ok(views)
}

/// Pick a frame out of a snapshot by index.
fn frame_at(frames: &[CallFrame], index: usize) -> Result<&CallFrame, ToolError> {
    frames.get(index).ok_or(ToolError::InvalidFrame {
        index,
        available: frames.len(),
    })
}

/// Summarize the receiver object, optionally with a shallow preview.
async fn receiver_view(
    session: &DebugSession,
    this: &RemoteObject,
    include_preview: bool,
) -> Result<ReceiverView, ToolError> {
    let preview = match (&this.object_id, include_preview) {
        (Some(object_id), true) => {
            let props = fetch_own_properties(session, object_id).await?;
            Some(
                props
                    .iter()
                    .take(RECEIVER_PREVIEW_PROPS)
                    .map(summarize_property)
                    .collect(),
            )
        }
        _ => None,
    };
    Ok(ReceiverView {
        kind: this.kind.clone(),
        class_name: this.class_name.clone(),
        description: format_remote_value(this),
        object_id: this.object_id.clone(),
        preview,
    })
}

// =============================================================================
// Tools
// =============================================================================

/// `get_pause_info`: reason, location and scope kinds of a pause.
pub fn get_pause_info(slot: &Option<DebugSession>, params: Value) -> Result<Value, ToolError> {
    let params: PauseInfoParams = parse_params(params)?;
    let session = require_session(slot)?;
    let snapshot = session.resolve_pause(params.pause_id.as_deref())?;
    let scripts = session.scripts();

    let top = snapshot.top_frame();
    Ok(json!({
        "reason": snapshot.reason,
        "pause_id": snapshot.id,
        "location": top.map(|f| json!({
            "url": resolve_frame_url(f, &scripts),
            "line": f.location.line_number + 1,
            "column": f.location.column_number + 1,
        })),
        "function_name": top.and_then(|f| {
            if f.function_name.is_empty() {
                None
            } else {
                Some(f.function_name.clone())
            }
        }),
        "scope_types": top.map(|f| {
            f.scope_chain.iter().map(|s| s.kind.clone()).collect::<Vec<_>>()
        }).unwrap_or_default(),
    }))
}

/// `list_call_stack`: the top frames of a pause, summarized.
pub fn list_call_stack(slot: &Option<DebugSession>, params: Value) -> Result<Value, ToolError> {
    let params: CallStackParams = parse_params(params)?;
    let session = require_session(slot)?;
    let snapshot = session.resolve_pause(params.pause_id.as_deref())?;
    let scripts = session.scripts();

    let frames: Vec<StackEntry> = snapshot
        .frames
        .iter()
        .take(params.depth)
        .enumerate()
        .map(|(index, frame)| {
            let summary = summarize_frame(frame, &scripts);
            StackEntry {
                index,
                function_name: summary.function_name,
                url: summary.url,
                line: summary.line,
                column: summary.column,
                this: if params.include_this {
                    frame.this.as_ref().map(format_remote_value)
                } else {
                    None
                },
            }
        })
        .collect();

    Ok(json!({
        "pause_id": snapshot.id,
        "total_frames": snapshot.frames.len(),
        "frames": frames,
    }))
}

/// `inspect_scopes`: scope properties and receiver preview of a frame.
pub async fn inspect_scopes(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: InspectScopesParams = parse_params(params)?;
    let session = require_session(slot)?;
    let snapshot = session.resolve_pause(params.pause_id.as_deref())?;
    let scripts = session.scripts();
    let frame = frame_at(&snapshot.frames, params.frame_index)?;

    let scopes = scope_views(session, frame, params.max_props).await?;

    let receiver = match &frame.this {
        Some(this) if this.kind != "undefined" => {
            Some(receiver_view(session, this, params.include_this_preview).await?)
        }
        _ => None,
    };

    Ok(json!({
        "pause_id": snapshot.id,
        "frame_index": params.frame_index,
        "frame": summarize_frame(frame, &scripts),
        "scopes": scopes,
        "this": receiver,
    }))
}

/// `evaluate_expression`: evaluate on a call frame with the command-line
/// API available, draining the console into the response.
pub async fn evaluate_expression(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: EvaluateParams = parse_params(params)?;
    let session = require_session(slot)?;
    let snapshot = session.resolve_pause(params.pause_id.as_deref())?;
    let frame = frame_at(&snapshot.frames, params.frame_index)?;

    let result = session
        .command(
            "Debugger.evaluateOnCallFrame",
            Some(json!({
                "callFrameId": frame.call_frame_id,
                "expression": params.expression,
                "includeCommandLineAPI": true,
                "returnByValue": params.return_by_value,
                "generatePreview": true,
            })),
        )
        .await?;

    if let Some(details) = result.get("exceptionDetails") {
        let description = details["exception"]["description"]
            .as_str()
            .or_else(|| details["text"].as_str())
            .unwrap_or("unknown exception")
            .to_owned();
        return Err(ToolError::EvaluationException(description));
    }

    let object: RemoteObject = serde_json::from_value(result["result"].clone()).unwrap_or_default();
    let payload = EvaluationResult {
        kind: object.kind.clone(),
        value: object.value.clone(),
        description: if object.value.is_some() {
            None
        } else {
            Some(format_remote_value(&object))
        },
        object_id: object.object_id.clone(),
        console: drain_console_strings(session),
    };
    serde_json::to_value(payload)
        .map_err(|e| ToolError::TargetCommandFailed(format!("serialization error: {e}")))
}

/// `get_object_properties`: enumerate the own properties of a remote
/// object handle.
pub async fn get_object_properties(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ObjectPropertiesParams = parse_params(params)?;
    let session = require_session(slot)?;

    let props = fetch_own_properties(session, &params.object_id).await?;
    let truncated = props.len() > params.max_props;
    let properties: Vec<PropertyView> = props
        .iter()
        .take(params.max_props)
        .map(summarize_property)
        .collect();

    Ok(json!({
        "object_id": params.object_id,
        "properties": properties,
        "truncated": truncated,
    }))
}

/// `list_scripts`: the script catalog, ordered by script id.
pub fn list_scripts(slot: &Option<DebugSession>) -> Result<Value, ToolError> {
    let session = require_session(slot)?;
    let mut scripts: Vec<(String, String)> = session.scripts().into_iter().collect();
    scripts.sort_by(|(a, _), (b, _)| {
        match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => a.cmp(b),
        }
    });
    let scripts: Vec<Value> = scripts
        .into_iter()
        .map(|(script_id, url)| json!({"script_id": script_id, "url": url}))
        .collect();
    Ok(json!({"scripts": scripts}))
}

/// `get_script_source`: fetch a script's source by id or URL.
pub async fn get_script_source(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ScriptSourceParams = parse_params(params)?;
    let session = require_session(slot)?;

    let script_id = match (params.script_id, params.url) {
        (Some(id), _) => id,
        (None, Some(url)) => {
            let wanted = ensure_file_url(&url);
            session
                .find_script_by_url(&wanted)
                .or_else(|| session.find_script_by_url(&url))
                .ok_or(ToolError::UnknownScript(url))?
        }
        (None, None) => {
            return Err(ToolError::InvalidParams(
                "script_id or url is required".into(),
            ));
        }
    };

    let result = session
        .command(
            "Debugger.getScriptSource",
            Some(json!({"scriptId": script_id})),
        )
        .await?;
    let source = result["scriptSource"].as_str().unwrap_or("").to_owned();
    Ok(json!({"script_id": script_id, "source": source}))
}

/// `read_console`: take and clear the console buffer.
pub fn read_console(slot: &Option<DebugSession>) -> Result<Value, ToolError> {
    let session = require_session(slot)?;
    Ok(json!({"messages": drain_console_strings(session)}))
}
