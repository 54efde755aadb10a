use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};

use super::LaunchError;

/// Configuration for launching a target script under the inspector.
pub struct LaunchConfig {
    /// Path to the node executable.
    pub executable: String,
    /// Path to the script to debug.
    pub script: PathBuf,
    /// Additional command-line arguments placed before the script path.
    pub extra_args: Vec<String>,
    /// How long to wait for the inspector endpoint to appear.
    pub timeout: Duration,
}

/// A handle to a launched target process with a discovered inspector
/// endpoint.
///
/// The child was started with an "inspect and break on entry" flag on an
/// ephemeral port, so it is halted before the first user statement and
/// stays halted until `Runtime.runIfWaitingForDebugger` is sent over the
/// endpoint.
#[derive(Debug)]
pub struct NodeProcess {
    /// The child process handle.
    pub child: Child,
    /// The child's PID at spawn time.
    pub pid: u32,
    /// The discovered inspector WebSocket URL.
    pub endpoint: String,
    /// The remainder of the child's stderr stream. The caller must keep
    /// draining this for the life of the process or the child may stall
    /// on pipe backpressure.
    pub stderr: Option<Lines<BufReader<ChildStderr>>>,
}

impl NodeProcess {
    /// Assemble a `NodeProcess` from an already-running child and a known
    /// endpoint. Used by tests that stand in a mock inspector for node.
    #[must_use]
    pub fn from_parts(child: Child, endpoint: String) -> Self {
        let pid = child.id().unwrap_or(0);
        Self {
            child,
            pid,
            endpoint,
            stderr: None,
        }
    }
}

/// Extract an inspector WebSocket URL from a stderr line.
///
/// Node prints `Debugger listening on ws://127.0.0.1:<port>/<token>` when
/// the inspector starts. The URL is accepted only if it parses as a `ws`
/// URL with an explicit port.
#[must_use]
pub fn extract_inspector_url(line: &str) -> Option<String> {
    let start = line.find("ws://")?;
    let candidate = line[start..].split_whitespace().next()?;
    let parsed = url::Url::parse(candidate).ok()?;
    if parsed.scheme() == "ws" && parsed.port().is_some() {
        Some(candidate.to_owned())
    } else {
        None
    }
}

/// Launch the target script with the inspector enabled on an ephemeral
/// port, halted before the first user statement.
///
/// Scans the child's stderr line by line until the inspector WebSocket
/// URL appears. The returned [`NodeProcess`] carries the rest of the
/// stderr stream so the caller can keep draining it.
///
/// # Errors
///
/// Returns `LaunchError::SpawnFailed` if the process cannot be spawned,
/// `LaunchError::ExitedEarly` if the child exits before any URL appears,
/// or `LaunchError::StartupTimeout` if the timeout expires first.
pub async fn launch_node(config: LaunchConfig) -> Result<NodeProcess, LaunchError> {
    let mut cmd = Command::new(&config.executable);
    cmd.arg("--inspect-brk=127.0.0.1:0");
    for arg in &config.extra_args {
        cmd.arg(arg);
    }
    cmd.arg(&config.script)
        // An inherited NODE_OPTIONS could carry its own --inspect flag and
        // fight over the port, so it must not reach the child.
        .env_remove("NODE_OPTIONS")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| LaunchError::SpawnFailed(format!("{}: {e}", config.executable)))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LaunchError::SpawnFailed("child stderr was not piped".into()))?;
    let mut lines = BufReader::new(stderr).lines();
    let pid = child.id().unwrap_or(0);

    let mut captured = String::new();
    let deadline = tokio::time::Instant::now() + config.timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            let _ = child.start_kill();
            return Err(LaunchError::StartupTimeout);
        }

        let next = tokio::time::timeout(remaining, lines.next_line()).await;
        match next {
            Ok(Ok(Some(line))) => {
                if let Some(endpoint) = extract_inspector_url(&line) {
                    return Ok(NodeProcess {
                        child,
                        pid,
                        endpoint,
                        stderr: Some(lines),
                    });
                }
                captured.push_str(&line);
                captured.push('\n');
            }
            Ok(Ok(None)) => {
                // Stderr closed: the child is exiting without an endpoint.
                let status = child.wait().await?;
                return Err(LaunchError::ExitedEarly {
                    exit_code: status.code(),
                    stderr: captured,
                });
            }
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(LaunchError::Io(e));
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(LaunchError::StartupTimeout);
            }
        }
    }
}
