use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::BridgeConfig;
use crate::debugger::{AttachOptions, DebugSession, summarize_frame};
use crate::error::ToolError;
use crate::node::LaunchConfig;

use super::parse_params;

#[derive(Debug, Deserialize)]
struct StartParams {
    script_path: String,
}

/// `start`: launch the target script, attach to its inspector and wait
/// for the break-on-entry pause.
pub async fn start(
    slot: &mut Option<DebugSession>,
    config: &BridgeConfig,
    params: Value,
) -> Result<Value, ToolError> {
    if slot.is_some() {
        return Err(ToolError::SessionAlreadyActive);
    }
    let params: StartParams = parse_params(params)?;

    let launch = LaunchConfig {
        executable: config.node_executable.clone(),
        script: params.script_path.clone().into(),
        extra_args: config.node_args.clone(),
        timeout: config.launch_timeout,
    };
    let options = AttachOptions {
        cdp: config.cdp_config(),
        attach_timeout: config.launch_timeout,
    };

    let (mut session, pause_id) = DebugSession::attach(launch, options).await?;
    session.set_script_path(&params.script_path);
    info!(script = %params.script_path, %pause_id, "debug session started");

    let snapshot = session.resolve_pause(Some(&pause_id))?;
    let scripts = session.scripts();
    let payload = serde_json::json!({
        "status": snapshot.status_line(&scripts),
        "pause_id": snapshot.id,
        "frame": snapshot.top_frame().map(|f| summarize_frame(f, &scripts)),
    });

    *slot = Some(session);
    Ok(payload)
}

/// `stop`: tear down the active session. Calling `stop` with no session
/// is a stable null-op.
pub async fn stop(slot: &mut Option<DebugSession>) -> Result<Value, ToolError> {
    match slot.take() {
        Some(session) => {
            let script = session.script_path().to_owned();
            let exit_code = session.exit_code();
            session.shutdown().await;
            info!(script = %script, "debug session stopped");
            Ok(serde_json::json!({
                "stopped": true,
                "script_path": script,
                "exit_code": exit_code,
            }))
        }
        None => Ok(serde_json::json!({
            "stopped": false,
            "status": "no active session",
        })),
    }
}
