use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error};

use crate::config::BridgeConfig;
use crate::debugger::{SessionSlot, new_session_slot};
use crate::tools;

/// JSON-RPC error code: parse error.
const PARSE_ERROR: i64 = -32700;
/// JSON-RPC error code: invalid request.
const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code: method not found.
const METHOD_NOT_FOUND: i64 = -32601;

/// Run the stdio RPC server until stdin closes or an interrupt arrives.
///
/// Requests are newline-delimited JSON-RPC 2.0 objects whose `method` is
/// a tool name and whose `params` is the tool's parameter object. One
/// request is served at a time; the response is a single line on stdout.
/// On shutdown any active session is torn down before returning.
///
/// # Errors
///
/// Returns an error only for stdin/stdout I/O failures.
pub async fn serve(config: BridgeConfig) -> std::io::Result<()> {
    let slot = new_session_slot();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(response) = handle_line(&slot, &config, &line).await {
                        stdout.write_all(response.as_bytes()).await?;
                        stdout.write_all(b"\n").await?;
                        stdout.flush().await?;
                    }
                }
                None => {
                    debug!("stdin closed, shutting down");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupt received, shutting down");
                break;
            }
        }
    }

    if let Some(session) = slot.lock().await.take() {
        session.shutdown().await;
    }
    Ok(())
}

/// Process one request line and produce the response line, if any.
///
/// Requests without an `id` are notifications: they are executed but get
/// no response. Malformed JSON and unknown methods are answered with the
/// standard JSON-RPC error codes; tool-level failures travel inside the
/// result envelope with `isError` set.
pub async fn handle_line(slot: &SessionSlot, config: &BridgeConfig, line: &str) -> Option<String> {
    let request: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            error!("unparseable request: {e}");
            return Some(rpc_error(&Value::Null, PARSE_ERROR, "parse error"));
        }
    };

    let id = request.get("id").cloned();
    let Some(method) = request["method"].as_str() else {
        return Some(rpc_error(
            id.as_ref().unwrap_or(&Value::Null),
            INVALID_REQUEST,
            "method must be a string",
        ));
    };
    let method = method.to_owned();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    debug!(%method, "dispatching tool call");
    let response = tools::dispatch(slot, config, &method, params).await;

    let id = id?;
    Some(match response {
        Some(result) => {
            let result = serde_json::to_value(&result)
                .unwrap_or_else(|e| json!({"error": format!("serialization error: {e}")}));
            json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
        }
        None => rpc_error(&id, METHOD_NOT_FOUND, &format!("unknown tool: {method}")),
    })
}

/// Build a JSON-RPC error response line.
fn rpc_error(id: &Value, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
    .to_string()
}
