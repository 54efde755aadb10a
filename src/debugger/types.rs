use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Wire types (deserialized from CDP events and command results)
// =============================================================================

/// Payload of a `Debugger.paused` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedParams {
    /// Why the target halted (`other`, `breakpoint`, `exception`,
    /// `debuggerStatement`, `step`, ...).
    pub reason: String,
    /// The call stack at the pause, top frame first.
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
}

/// One frame of a pause's call stack.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// Opaque frame token assigned by the target. Valid only until the
    /// target resumes.
    pub call_frame_id: String,
    /// Name of the function; empty for top-level/anonymous code.
    #[serde(default)]
    pub function_name: String,
    /// Source URL of the frame, when the target reports one.
    #[serde(default)]
    pub url: String,
    /// Source location (0-based, target coordinates).
    pub location: SourceLocation,
    /// Scopes visible from this frame, innermost first.
    #[serde(default)]
    pub scope_chain: Vec<ScopeDescriptor>,
    /// The receiver (`this`) object, when present.
    #[serde(default)]
    pub this: Option<RemoteObject>,
}

/// A 0-based source location in target coordinates.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// Opaque script id assigned by the target.
    pub script_id: String,
    /// 0-based line number.
    pub line_number: u32,
    /// 0-based column number.
    #[serde(default)]
    pub column_number: u32,
}

/// One entry of a frame's scope chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeDescriptor {
    /// Scope kind: `global`, `local`, `closure`, `with`, `catch`,
    /// `block`, `script`, `module` or `eval`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The object holding the scope's bindings.
    pub object: RemoteObject,
}

/// A value handle minted by the target.
///
/// Primitives carry `value`; everything else carries an `object_id` that
/// stays valid only while the target holds the corresponding execution
/// context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// Type tag (`object`, `function`, `string`, `number`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Class name for objects (e.g. `Object`, `Array`, `Calc`).
    #[serde(default)]
    pub class_name: Option<String>,
    /// Primitive value, when the value is serializable.
    #[serde(default)]
    pub value: Option<Value>,
    /// Human-readable description (e.g. `Object`, `ƒ add(a, b)`).
    #[serde(default)]
    pub description: Option<String>,
    /// Opaque handle for enumerating a non-primitive's properties.
    #[serde(default)]
    pub object_id: Option<String>,
}

/// One property from a `Runtime.getProperties` result.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// The property's value, absent for accessor-only properties.
    #[serde(default)]
    pub value: Option<RemoteObject>,
}

// =============================================================================
// Session-side records
// =============================================================================

/// A pause snapshot kept in the session catalog.
///
/// Snapshots live for the session lifetime so earlier pauses stay
/// inspectable by id, but the frame tokens and object handles inside are
/// owned by the target and go stale once it resumes.
#[derive(Debug, Clone)]
pub struct PauseSnapshot {
    /// Locally minted pause id (`p1`, `p2`, ...).
    pub id: String,
    /// Reason tag from the `Debugger.paused` event.
    pub reason: String,
    /// Ordered call frames, top first.
    pub frames: Vec<CallFrame>,
}

impl PauseSnapshot {
    /// The topmost frame, if the pause carried any frames.
    #[must_use]
    pub fn top_frame(&self) -> Option<&CallFrame> {
        self.frames.first()
    }

    /// Status line for tool responses:
    /// `Paused at <url>:<line> (reason: <tag>)` with a 1-based line.
    #[must_use]
    pub fn status_line(&self, scripts: &HashMap<String, String>) -> String {
        match self.top_frame() {
            Some(frame) => {
                let url = resolve_frame_url(frame, scripts);
                format!(
                    "Paused at {url}:{} (reason: {})",
                    frame.location.line_number + 1,
                    self.reason
                )
            }
            None => format!("Paused (reason: {})", self.reason),
        }
    }
}

/// A breakpoint the session has registered with the target.
#[derive(Debug, Clone, Serialize)]
pub struct BreakpointRecord {
    /// Target-assigned breakpoint id.
    pub breakpoint_id: String,
    /// Locations the target resolved the breakpoint to (1-based).
    pub locations: Vec<ResolvedLocation>,
}

/// A resolved breakpoint location in tool coordinates (1-based).
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLocation {
    pub script_id: String,
    pub line: u32,
    pub column: u32,
}

/// One buffered console message.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleEntry {
    /// Level tag (`log`, `warn`, `error`, `info`, `debug`, ...).
    pub level: String,
    /// Formatted message text.
    pub text: String,
}

impl fmt::Display for ConsoleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

// =============================================================================
// Tool-facing summaries (serialized into responses)
// =============================================================================

/// A summarized call frame with 1-based coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub function_name: Option<String>,
    pub url: String,
    pub line: u32,
    pub column: u32,
}

/// A summarized property of a scope or remote object.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyView {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

/// A scope with its listed properties.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeView {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Vec<PropertyView>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

// =============================================================================
// Formatting helpers
// =============================================================================

/// Resolve a frame's source URL, falling back to the script catalog and
/// then to `<anonymous>`.
#[must_use]
pub fn resolve_frame_url(frame: &CallFrame, scripts: &HashMap<String, String>) -> String {
    if !frame.url.is_empty() {
        return frame.url.clone();
    }
    scripts
        .get(&frame.location.script_id)
        .cloned()
        .unwrap_or_else(|| "<anonymous>".to_string())
}

/// Summarize a frame for a tool response (1-based coordinates).
#[must_use]
pub fn summarize_frame(frame: &CallFrame, scripts: &HashMap<String, String>) -> FrameSummary {
    FrameSummary {
        function_name: if frame.function_name.is_empty() {
            None
        } else {
            Some(frame.function_name.clone())
        },
        url: resolve_frame_url(frame, scripts),
        line: frame.location.line_number + 1,
        column: frame.location.column_number + 1,
    }
}

/// Render a remote object as display text: the primitive `value` when
/// present, else the `description`, else the type tag.
#[must_use]
pub fn format_remote_value(obj: &RemoteObject) -> String {
    if let Some(value) = &obj.value {
        return match value.as_str() {
            Some(s) => s.to_owned(),
            None => value.to_string(),
        };
    }
    if let Some(desc) = &obj.description {
        return desc.clone();
    }
    obj.kind.clone()
}

/// Join console call arguments into one message string.
pub fn format_console_args(args: &[RemoteObject]) -> String {
    args.iter()
        .map(format_remote_value)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Summarize one property descriptor for a listing.
#[must_use]
pub fn summarize_property(prop: &PropertyDescriptor) -> PropertyView {
    match &prop.value {
        Some(value) => PropertyView {
            name: prop.name.clone(),
            kind: value.kind.clone(),
            value: format_remote_value(value),
            object_id: value.object_id.clone(),
        },
        None => PropertyView {
            name: prop.name.clone(),
            kind: "accessor".to_string(),
            value: String::new(),
            object_id: None,
        },
    }
}

/// Ensure a script locator is a `file://` URL, prefixing plain paths.
#[must_use]
pub fn ensure_file_url(path: &str) -> String {
    if path.contains("://") {
        path.to_owned()
    } else {
        format!("file://{path}")
    }
}
