use std::fmt;

use serde::Serialize;

use crate::cdp::CdpError;
use crate::node::LaunchError;

/// Tool-level errors, surfaced to the RPC caller as a stable set of kind
/// tags. These are recoverable by design: a tool error never tears the
/// session down (transport loss is the one exception, handled by the
/// dispatcher) and never crashes the host.
#[derive(Debug)]
pub enum ToolError {
    /// `start` was called while a session exists.
    SessionAlreadyActive,
    /// A tool requiring a session was called when none exists.
    NoSession,
    /// An inspection tool needs a pause snapshot but none exists.
    NoPause,
    /// A named pause id is not in the catalog.
    InvalidPause(String),
    /// A frame index is out of range in the named pause.
    InvalidFrame {
        index: usize,
        available: usize,
    },
    /// A breakpoint locator needs exactly one of `file_path`/`url_regex`.
    MissingLocator,
    /// A file path could not be mapped to a known script id.
    UnknownScript(String),
    /// The target exited before the inspector endpoint appeared.
    LauncherExitedEarly(String),
    /// The attach sequence failed; the partial session was torn down.
    StartFailed(String),
    /// The CDP socket closed with pending work.
    TransportClosed,
    /// The target reported exception details for an evaluation.
    EvaluationException(String),
    /// Any other CDP command rejection, wrapping the target's message.
    TargetCommandFailed(String),
    /// The request parameters did not deserialize.
    InvalidParams(String),
}

impl ToolError {
    /// The stable kind tag for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionAlreadyActive => "session-already-active",
            Self::NoSession => "no-session",
            Self::NoPause => "no-pause",
            Self::InvalidPause(_) => "invalid-pause",
            Self::InvalidFrame { .. } => "invalid-frame",
            Self::MissingLocator => "missing-locator",
            Self::UnknownScript(_) => "unknown-script",
            Self::LauncherExitedEarly(_) => "launcher-exited-early",
            Self::StartFailed(_) => "start-failed",
            Self::TransportClosed => "transport-closed",
            Self::EvaluationException(_) => "evaluation-exception",
            Self::TargetCommandFailed(_) => "target-command-failed",
            Self::InvalidParams(_) => "invalid-params",
        }
    }

    /// Serialize this error as the payload of an error envelope.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        };
        serde_json::json!({ "error": body })
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionAlreadyActive => {
                write!(f, "a debug session is already active; stop it first")
            }
            Self::NoSession => write!(f, "no active debug session"),
            Self::NoPause => write!(f, "the target is not paused and no pause has been recorded"),
            Self::InvalidPause(id) => write!(f, "unknown pause id: {id}"),
            Self::InvalidFrame { index, available } => {
                write!(f, "frame index {index} out of range ({available} frames)")
            }
            Self::MissingLocator => {
                write!(f, "exactly one of file_path or url_regex is required")
            }
            Self::UnknownScript(path) => {
                write!(f, "no loaded script matches {path}")
            }
            Self::LauncherExitedEarly(detail) => write!(f, "{detail}"),
            Self::StartFailed(detail) => write!(f, "failed to start debug session: {detail}"),
            Self::TransportClosed => write!(f, "inspector connection closed"),
            Self::EvaluationException(desc) => write!(f, "expression threw: {desc}"),
            Self::TargetCommandFailed(msg) => write!(f, "target rejected command: {msg}"),
            Self::InvalidParams(msg) => write!(f, "invalid parameters: {msg}"),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<CdpError> for ToolError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::ConnectionClosed | CdpError::Connection(_) => Self::TransportClosed,
            other => Self::TargetCommandFailed(other.to_string()),
        }
    }
}

impl From<LaunchError> for ToolError {
    fn from(e: LaunchError) -> Self {
        match &e {
            LaunchError::ExitedEarly { .. } => Self::LauncherExitedEarly(e.to_string()),
            _ => Self::StartFailed(e.to_string()),
        }
    }
}
