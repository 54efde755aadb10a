use serde::Deserialize;
use serde_json::{Value, json};

use crate::debugger::{
    BreakpointRecord, DebugSession, ResolvedLocation, ensure_file_url,
};
use crate::error::ToolError;

use super::{parse_params, require_session};

// =============================================================================
// Parameters
// =============================================================================

#[derive(Debug, Deserialize)]
struct SetBreakpointParams {
    file_path: String,
    line: u32,
}

#[derive(Debug, Deserialize)]
struct ConditionalBreakpointParams {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    url_regex: Option<String>,
    line: u32,
    #[serde(default)]
    column: Option<u32>,
    condition: String,
}

#[derive(Debug, Deserialize)]
struct LogpointParams {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    url_regex: Option<String>,
    line: u32,
    #[serde(default)]
    column: Option<u32>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExceptionBreakpointsParams {
    state: String,
}

#[derive(Debug, Deserialize)]
struct BlackboxParams {
    patterns: Vec<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// A script locator: either a concrete URL or a URL regex.
#[derive(Debug)]
enum Locator {
    Url(String),
    UrlRegex(String),
}

/// Resolve the `file_path`/`url_regex` pair into exactly one locator.
fn resolve_locator(
    file_path: Option<String>,
    url_regex: Option<String>,
) -> Result<Locator, ToolError> {
    match (file_path, url_regex) {
        (Some(path), None) => Ok(Locator::Url(ensure_file_url(&path))),
        (None, Some(regex)) => Ok(Locator::UrlRegex(regex)),
        _ => Err(ToolError::MissingLocator),
    }
}

/// Build the `Debugger.setBreakpointByUrl` parameter object.
fn breakpoint_params(
    locator: &Locator,
    line: u32,
    column: Option<u32>,
    condition: Option<&str>,
) -> Value {
    let mut params = json!({
        "lineNumber": line.saturating_sub(1),
        "columnNumber": column.map_or(0, |c| c.saturating_sub(1)),
    });
    match locator {
        Locator::Url(url) => params["url"] = json!(url),
        Locator::UrlRegex(regex) => params["urlRegex"] = json!(regex),
    }
    if let Some(condition) = condition {
        params["condition"] = json!(condition);
    }
    params
}

/// Read a 0-based coordinate field and convert it to 1-based.
fn one_based(location: &Value, field: &str) -> u32 {
    let raw = location[field].as_u64().unwrap_or(0);
    u32::try_from(raw).unwrap_or(u32::MAX - 1) + 1
}

/// Parse a `Debugger.setBreakpointByUrl` result into a record with
/// 1-based resolved locations.
fn parse_breakpoint_result(result: &Value) -> BreakpointRecord {
    let breakpoint_id = result["breakpointId"].as_str().unwrap_or("").to_owned();
    let locations = result["locations"]
        .as_array()
        .map(|locations| {
            locations
                .iter()
                .map(|loc| ResolvedLocation {
                    script_id: loc["scriptId"].as_str().unwrap_or("").to_owned(),
                    line: one_based(loc, "lineNumber"),
                    column: one_based(loc, "columnNumber"),
                })
                .collect()
        })
        .unwrap_or_default();
    BreakpointRecord {
        breakpoint_id,
        locations,
    }
}

/// Build the always-false breakpoint condition that implements a
/// logpoint: print the interpolated message, never pause.
///
/// `{expr}` segments become `${expr}` template interpolations; literal
/// backticks and backslashes are escaped so the message can be embedded
/// in a template literal.
#[must_use]
pub fn logpoint_condition(message: &str) -> String {
    let mut template = String::with_capacity(message.len() + 8);
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut expr = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    expr.push(inner);
                }
                if closed {
                    template.push_str("${");
                    template.push_str(&expr);
                    template.push('}');
                } else {
                    // Unterminated brace: treat it as literal text.
                    template.push('{');
                    template.push_str(&escape_template_literal(&expr));
                }
            }
            _ => template.push_str(&escape_template_char(c)),
        }
    }
    format!("console.log(`{template}`), false")
}

fn escape_template_char(c: char) -> String {
    match c {
        '`' => "\\`".to_string(),
        '\\' => "\\\\".to_string(),
        other => other.to_string(),
    }
}

fn escape_template_literal(text: &str) -> String {
    text.chars().map(escape_template_char).collect()
}

/// Register a breakpoint with the target and record it in the session.
async fn register_breakpoint(
    session: &DebugSession,
    params: Value,
) -> Result<Value, ToolError> {
    let result = session
        .command("Debugger.setBreakpointByUrl", Some(params))
        .await?;
    let record = parse_breakpoint_result(&result);
    session.record_breakpoint(record.clone());
    serde_json::to_value(record)
        .map_err(|e| ToolError::TargetCommandFailed(format!("serialization error: {e}")))
}

// =============================================================================
// Tools
// =============================================================================

/// `set_breakpoint`: unconditional breakpoint at a 1-based file/line.
/// The column is always sent as 0.
pub async fn set_breakpoint(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: SetBreakpointParams = parse_params(params)?;
    let session = require_session(slot)?;
    let locator = Locator::Url(ensure_file_url(&params.file_path));
    let cdp_params = breakpoint_params(&locator, params.line, None, None);
    register_breakpoint(session, cdp_params).await
}

/// `set_breakpoint_condition`: conditional breakpoint at a locator.
pub async fn set_breakpoint_condition(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ConditionalBreakpointParams = parse_params(params)?;
    let session = require_session(slot)?;
    let locator = resolve_locator(params.file_path, params.url_regex)?;
    let cdp_params = breakpoint_params(
        &locator,
        params.line,
        params.column,
        Some(&params.condition),
    );
    register_breakpoint(session, cdp_params).await
}

/// `add_logpoint`: a conditional breakpoint that prints an interpolated
/// message and never pauses.
pub async fn add_logpoint(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: LogpointParams = parse_params(params)?;
    let session = require_session(slot)?;
    let locator = resolve_locator(params.file_path, params.url_regex)?;
    let condition = logpoint_condition(&params.message);
    let cdp_params = breakpoint_params(&locator, params.line, params.column, Some(&condition));
    register_breakpoint(session, cdp_params).await
}

/// `set_exception_breakpoints`: forward the pause-on-exceptions state.
pub async fn set_exception_breakpoints(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: ExceptionBreakpointsParams = parse_params(params)?;
    if !matches!(params.state.as_str(), "none" | "uncaught" | "all") {
        return Err(ToolError::InvalidParams(format!(
            "state must be one of none, uncaught, all (got {})",
            params.state
        )));
    }
    let session = require_session(slot)?;
    session
        .command(
            "Debugger.setPauseOnExceptions",
            Some(json!({"state": params.state})),
        )
        .await?;
    Ok(json!({"state": params.state}))
}

/// `blackbox_scripts`: forward blackbox URL patterns to the target.
pub async fn blackbox_scripts(
    slot: &Option<DebugSession>,
    params: Value,
) -> Result<Value, ToolError> {
    let params: BlackboxParams = parse_params(params)?;
    let session = require_session(slot)?;
    session
        .command(
            "Debugger.setBlackboxPatterns",
            Some(json!({"patterns": params.patterns})),
        )
        .await?;
    Ok(json!({"patterns": params.patterns}))
}
