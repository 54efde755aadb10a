use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cdp::{CdpClient, CdpConfig, CdpEvent};
use crate::error::ToolError;
use crate::node::{self, NodeProcess};

use super::types::{
    BreakpointRecord, ConsoleEntry, PauseSnapshot, PausedParams, RemoteObject, format_console_args,
};

/// The process-wide session slot. `start` fills it, `stop` and target
/// exit empty it; every tool goes through this one lock, which also
/// serializes tool execution against session state.
pub type SessionSlot = Arc<tokio::sync::Mutex<Option<DebugSession>>>;

/// Create an empty session slot.
#[must_use]
pub fn new_session_slot() -> SessionSlot {
    Arc::new(tokio::sync::Mutex::new(None))
}

/// Notification sent to resume-race waiters when a pause lands.
#[derive(Debug, Clone)]
pub struct PauseNotice {
    /// The freshly minted pause id.
    pub pause_id: String,
}

/// Outcome of the resume-until-next-pause-or-exit race.
#[derive(Debug)]
pub enum RunOutcome {
    /// The target paused again; the id names the new catalog entry.
    Paused(String),
    /// The target exited. The session must be torn down by the caller.
    Exited {
        /// The target's exit code (-1 when killed by a signal).
        exit_code: i32,
    },
}

/// Mutable session catalogs. Mutated by the event-intake task and read
/// by tool handlers; every access holds the one state mutex briefly and
/// never across an await.
#[derive(Debug, Default)]
pub struct SessionState {
    scripts: HashMap<String, String>,
    console: Vec<ConsoleEntry>,
    pauses: HashMap<String, PauseSnapshot>,
    current_pause: Option<String>,
    pause_seq: u64,
    breakpoints: Vec<BreakpointRecord>,
}

/// Settings for attaching a new session.
pub struct AttachOptions {
    /// CDP client configuration.
    pub cdp: CdpConfig,
    /// How long to wait for the initial break-on-entry pause.
    pub attach_timeout: Duration,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            cdp: CdpConfig::default(),
            attach_timeout: Duration::from_secs(30),
        }
    }
}

/// An active debug session: the launched target, the CDP connection and
/// all catalogs. The session is the only owner of these resources; they
/// are created together by [`DebugSession::attach`] and torn down
/// together by [`DebugSession::shutdown`].
#[derive(Debug)]
pub struct DebugSession {
    script_path: String,
    pid: u32,
    client: CdpClient,
    state: Arc<Mutex<SessionState>>,
    pause_tx: broadcast::Sender<PauseNotice>,
    exit_rx: watch::Receiver<Option<i32>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DebugSession {
    /// Launch a target script and run the attach sequence: connect to the
    /// discovered inspector endpoint, pre-register the pause waiter,
    /// enable the `Debugger` and `Runtime` domains, release the target
    /// from its pre-execution halt, and wait for the break-on-entry
    /// pause.
    ///
    /// Returns the session together with the id of the initial pause.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::LauncherExitedEarly` if the target dies before
    /// an endpoint appears, and `ToolError::StartFailed` for every other
    /// attach failure. On failure the partial session is torn down: the
    /// child is killed, the socket closed and the catalogs dropped.
    pub async fn attach(
        launch: node::LaunchConfig,
        options: AttachOptions,
    ) -> Result<(Self, String), ToolError> {
        let process = node::launch_node(launch).await?;
        Self::attach_process(process, options).await
    }

    /// Attach to an already-launched process. Split out from
    /// [`attach`](Self::attach) so tests can substitute a mock inspector
    /// for a real node child.
    ///
    /// # Errors
    ///
    /// Same as [`attach`](Self::attach).
    pub async fn attach_process(
        mut process: NodeProcess,
        options: AttachOptions,
    ) -> Result<(Self, String), ToolError> {
        let pid = process.pid;
        let endpoint = process.endpoint.clone();

        let client = match CdpClient::connect(&endpoint, options.cdp).await {
            Ok(client) => client,
            Err(e) => {
                let _ = process.child.start_kill();
                let _ = process.child.wait().await;
                return Err(ToolError::StartFailed(format!(
                    "could not open inspector socket {endpoint}: {e}"
                )));
            }
        };

        // Pre-register all subscriptions before enabling anything, so the
        // break-on-entry pause cannot slip past. Events buffer in the
        // channels until the intake task starts.
        let subscriptions = async {
            let script_rx = client.subscribe("Debugger.scriptParsed").await?;
            let console_rx = client.subscribe("Runtime.consoleAPICalled").await?;
            let paused_rx = client.subscribe("Debugger.paused").await?;
            let destroyed_rx = client.subscribe("Runtime.executionContextDestroyed").await?;
            Ok::<_, crate::cdp::CdpError>((script_rx, console_rx, paused_rx, destroyed_rx))
        }
        .await;
        let (script_rx, console_rx, paused_rx, mut destroyed_rx) = match subscriptions {
            Ok(rx) => rx,
            Err(e) => {
                let _ = process.child.start_kill();
                let _ = process.child.wait().await;
                let _ = client.close().await;
                return Err(ToolError::StartFailed(format!("event subscription: {e}")));
            }
        };

        let (pause_tx, _) = broadcast::channel(16);
        let mut first_pause_rx = pause_tx.subscribe();
        let (exit_tx, exit_rx) = watch::channel(None);

        let mut tasks = Vec::new();

        // Keep draining the child's stderr so it never stalls on pipe
        // backpressure; each line goes to the diagnostic stream.
        if let Some(mut lines) = process.stderr.take() {
            tasks.push(tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "debug_bridge::target", "{line}");
                }
            }));
        }

        // The exit watcher owns the child from here on.
        let mut child = process.child;
        tasks.push(tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!("failed to reap target process: {e}");
                    -1
                }
            };
            let _ = exit_tx.send(Some(code));
        }));

        // Node keeps the process alive while a debugger is attached
        // ("Waiting for the debugger to disconnect..."). Once its main
        // execution context is destroyed, release the socket so the
        // child can actually exit and the exit waiter can fire.
        let close_handle = client.close_handle();
        tasks.push(tokio::spawn(async move {
            if destroyed_rx.recv().await.is_some() {
                debug!("execution context destroyed, releasing the inspector socket");
                close_handle.close().await;
            }
        }));

        let state = Arc::new(Mutex::new(SessionState::default()));

        let mut session = Self {
            script_path: String::new(),
            pid,
            client,
            state: Arc::clone(&state),
            pause_tx: pause_tx.clone(),
            exit_rx,
            tasks,
        };

        // Enable the domains, then release the target from its halt.
        // Without runIfWaitingForDebugger no pause is ever delivered.
        for method in [
            "Debugger.enable",
            "Runtime.enable",
            "Runtime.runIfWaitingForDebugger",
        ] {
            if let Err(e) = session.client.send_command(method, None).await {
                session.shutdown().await;
                return Err(ToolError::StartFailed(format!("{method}: {e}")));
            }
        }

        // Permanent listeners: script catalog, console buffer, pause
        // bookkeeping. The paused handler both records the snapshot and
        // signals every registered resume-race waiter.
        let intake = tokio::spawn(intake_loop(
            script_rx,
            console_rx,
            paused_rx,
            state,
            pause_tx,
        ));
        session.tasks.push(intake);

        // Await the break-on-entry pause (or early target death).
        let mut exit_rx = session.exit_rx.clone();
        let first_pause = tokio::select! {
            notice = first_pause_rx.recv() => match notice {
                Ok(notice) => notice.pause_id,
                Err(_) => {
                    session.shutdown().await;
                    return Err(ToolError::StartFailed(
                        "inspector connection closed before the initial pause".into(),
                    ));
                }
            },
            changed = exit_rx.wait_for(Option::is_some) => {
                let code = changed.map_or(-1, |v| v.unwrap_or(-1));
                session.shutdown().await;
                return Err(ToolError::StartFailed(format!(
                    "target exited with code {code} before the initial pause"
                )));
            }
            () = tokio::time::sleep(options.attach_timeout) => {
                session.shutdown().await;
                return Err(ToolError::StartFailed(
                    "timed out waiting for the initial pause".into(),
                ));
            }
        };

        Ok((session, first_pause))
    }

    /// Record which script this session was started for.
    pub fn set_script_path(&mut self, path: &str) {
        self.script_path = path.to_owned();
    }

    /// The script path given to `start`.
    #[must_use]
    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    /// Send a CDP command, mapping transport failures into the tool
    /// error taxonomy.
    ///
    /// # Errors
    ///
    /// `ToolError::TransportClosed` if the socket is gone, otherwise
    /// `ToolError::TargetCommandFailed` wrapping the target's message.
    pub async fn command(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        self.client
            .send_command(method, params)
            .await
            .map_err(ToolError::from)
    }

    /// The resume-race primitive: register pause and exit waiters, issue
    /// a continue-command, and report whichever fires first.
    ///
    /// The pause waiter is registered strictly before the command is
    /// sent, so the pause that results can never be lost. If the command
    /// itself fails, both waiters are dropped and the error surfaces.
    ///
    /// # Errors
    ///
    /// Propagates command failures; returns `ToolError::TransportClosed`
    /// if the inspector socket vanishes without a target exit following.
    pub async fn run_until_pause_or_exit(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RunOutcome, ToolError> {
        let mut pause_rx = self.pause_tx.subscribe();
        let mut exit_rx = self.exit_rx.clone();

        if let Some(code) = *exit_rx.borrow() {
            return Ok(RunOutcome::Exited { exit_code: code });
        }

        self.client
            .send_command(method, params)
            .await
            .map_err(ToolError::from)?;

        loop {
            let intake_closed = tokio::select! {
                notice = pause_rx.recv() => match notice {
                    Ok(notice) => return Ok(RunOutcome::Paused(notice.pause_id)),
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Missed intermediate pauses; the next recv returns
                        // the most recent one still buffered.
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => true,
                },
                changed = exit_rx.wait_for(Option::is_some) => {
                    return match changed {
                        Ok(code) => Ok(RunOutcome::Exited {
                            exit_code: code.unwrap_or(-1),
                        }),
                        Err(_) => Err(ToolError::TransportClosed),
                    };
                }
            };

            if intake_closed {
                // Intake ended: the socket closed. The process exit
                // usually follows within moments; give it a grace
                // window before declaring the transport lost.
                let waited = tokio::time::timeout(
                    Duration::from_secs(2),
                    exit_rx.wait_for(Option::is_some),
                )
                .await;
                return match waited {
                    Ok(Ok(code)) => Ok(RunOutcome::Exited {
                        exit_code: code.unwrap_or(-1),
                    }),
                    _ => Err(ToolError::TransportClosed),
                };
            }
        }
    }

    /// The target's exit code, if it has already exited.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    // =========================================================================
    // Catalog access
    // =========================================================================

    /// Resolve a pause snapshot: a named id must exist in the catalog,
    /// no id means the current pause.
    ///
    /// # Errors
    ///
    /// `ToolError::NoPause` when no pause exists, `ToolError::InvalidPause`
    /// when a named id is not in the catalog.
    pub fn resolve_pause(&self, pause_id: Option<&str>) -> Result<PauseSnapshot, ToolError> {
        let state = self.state.lock().expect("session state poisoned");
        match pause_id {
            Some(id) => state
                .pauses
                .get(id)
                .cloned()
                .ok_or_else(|| ToolError::InvalidPause(id.to_owned())),
            None => {
                let current = state.current_pause.as_ref().ok_or(ToolError::NoPause)?;
                state
                    .pauses
                    .get(current)
                    .cloned()
                    .ok_or(ToolError::NoPause)
            }
        }
    }

    /// Clone the script catalog (`script_id` → URL).
    #[must_use]
    pub fn scripts(&self) -> HashMap<String, String> {
        self.state
            .lock()
            .expect("session state poisoned")
            .scripts
            .clone()
    }

    /// Find the script id whose URL matches the given URL exactly.
    #[must_use]
    pub fn find_script_by_url(&self, wanted: &str) -> Option<String> {
        let state = self.state.lock().expect("session state poisoned");
        state
            .scripts
            .iter()
            .find(|(_, url)| url.as_str() == wanted)
            .map(|(id, _)| id.clone())
    }

    /// Take and clear the console buffer.
    #[must_use]
    pub fn drain_console(&self) -> Vec<ConsoleEntry> {
        let mut state = self.state.lock().expect("session state poisoned");
        std::mem::take(&mut state.console)
    }

    /// Record a breakpoint registered with the target.
    pub fn record_breakpoint(&self, record: BreakpointRecord) {
        self.state
            .lock()
            .expect("session state poisoned")
            .breakpoints
            .push(record);
    }

    /// Kill the target (best effort), close the CDP client and drop the
    /// catalogs. Idempotent with respect to an already-dead target.
    pub async fn shutdown(self) {
        let (pauses, breakpoints) = {
            let state = self.state.lock().expect("session state poisoned");
            (state.pauses.len(), state.breakpoints.len())
        };
        debug!(
            pauses,
            breakpoints, "tearing down debug session for {}", self.script_path
        );

        if self.exit_code().is_none() {
            terminate_process(self.pid);
            let mut exit_rx = self.exit_rx.clone();
            let waited =
                tokio::time::timeout(Duration::from_secs(2), exit_rx.wait_for(Option::is_some))
                    .await;
            if waited.is_err() {
                force_kill_process(self.pid);
            }
        }

        let _ = self.client.close().await;
        for task in self.tasks {
            task.abort();
        }
    }
}

// =============================================================================
// Event intake
// =============================================================================

/// The three permanent listeners, running until the socket closes or the
/// session is torn down. Handler panics cannot occur here: malformed
/// events are logged and skipped.
async fn intake_loop(
    mut script_rx: mpsc::Receiver<CdpEvent>,
    mut console_rx: mpsc::Receiver<CdpEvent>,
    mut paused_rx: mpsc::Receiver<CdpEvent>,
    state: Arc<Mutex<SessionState>>,
    pause_tx: broadcast::Sender<PauseNotice>,
) {
    loop {
        // Biased polling order: script and console events recorded before
        // a pause that followed them on the wire, so waiters woken by the
        // pause see a complete catalog and console batch.
        tokio::select! {
            biased;
            event = script_rx.recv() => match event {
                Some(event) => {
                    let mut state = state.lock().expect("session state poisoned");
                    record_script_parsed(&mut state, &event.params);
                }
                None => break,
            },
            event = console_rx.recv() => match event {
                Some(event) => {
                    let mut state = state.lock().expect("session state poisoned");
                    record_console_event(&mut state, &event.params);
                }
                None => break,
            },
            event = paused_rx.recv() => match event {
                Some(event) => {
                    let notice = {
                        let mut state = state.lock().expect("session state poisoned");
                        record_paused_event(&mut state, &event.params)
                    };
                    match notice {
                        Some(notice) => {
                            // Waiter channels may be gone (no resume in
                            // flight); the catalog update above is what
                            // makes the pause discoverable regardless.
                            let _ = pause_tx.send(notice);
                        }
                        None => warn!("discarding malformed Debugger.paused event"),
                    }
                }
                None => break,
            },
        }
    }
    debug!("event intake ended");
}

/// Record a `Debugger.scriptParsed` event in the script catalog.
fn record_script_parsed(state: &mut SessionState, params: &Value) {
    let Some(script_id) = params["scriptId"].as_str() else {
        return;
    };
    let url = params["url"].as_str().unwrap_or("");
    if !url.is_empty() {
        state
            .scripts
            .insert(script_id.to_owned(), url.to_owned());
    }
}

/// Map CDP console type names onto the bridge's level tags.
fn map_console_level(cdp_type: &str) -> &str {
    match cdp_type {
        "warning" => "warn",
        other => other,
    }
}

/// Record a `Runtime.consoleAPICalled` event in the console buffer.
fn record_console_event(state: &mut SessionState, params: &Value) {
    let level = map_console_level(params["type"].as_str().unwrap_or("log")).to_owned();
    let args: Vec<RemoteObject> = params["args"]
        .as_array()
        .map(|args| {
            args.iter()
                .filter_map(|arg| serde_json::from_value(arg.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    let text = format_console_args(&args);
    state.console.push(ConsoleEntry { level, text });
}

/// Record a `Debugger.paused` event: mint a fresh pause id, store the
/// snapshot, mark it current and return the waiter notice.
fn record_paused_event(state: &mut SessionState, params: &Value) -> Option<PauseNotice> {
    let paused: PausedParams = serde_json::from_value(params.clone()).ok()?;
    state.pause_seq += 1;
    let pause_id = format!("p{}", state.pause_seq);
    state.pauses.insert(
        pause_id.clone(),
        PauseSnapshot {
            id: pause_id.clone(),
            reason: paused.reason,
            frames: paused.call_frames,
        },
    );
    state.current_pause = Some(pause_id.clone());
    Some(PauseNotice { pause_id })
}

// =============================================================================
// Process termination
// =============================================================================

/// Ask the target to terminate (SIGTERM on unix).
fn terminate_process(pid: u32) {
    #[cfg(unix)]
    {
        // PID values are always within i32 range on supported platforms.
        #[allow(clippy::cast_possible_wrap)]
        let pid_i32 = pid as i32;
        // SAFETY: plain kill(2) with a valid pid and SIGTERM.
        unsafe { libc::kill(pid_i32, libc::SIGTERM) };
    }
    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/T", "/PID", &pid.to_string()])
            .output();
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
    }
}

/// Forcibly kill the target (SIGKILL on unix).
fn force_kill_process(pid: u32) {
    #[cfg(unix)]
    {
        #[allow(clippy::cast_possible_wrap)]
        let pid_i32 = pid as i32;
        // SAFETY: plain kill(2) with a valid pid and SIGKILL.
        unsafe { libc::kill(pid_i32, libc::SIGKILL) };
    }
    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .output();
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
    }
}
