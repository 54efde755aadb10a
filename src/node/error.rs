use std::fmt;

/// Errors that can occur while launching the target runtime.
#[derive(Debug)]
pub enum LaunchError {
    /// The node executable could not be spawned.
    SpawnFailed(String),

    /// The target exited before printing an inspector endpoint.
    ExitedEarly {
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// The stderr output captured before exit.
        stderr: String,
    },

    /// No inspector endpoint appeared within the launch timeout.
    StartupTimeout,

    /// An I/O error occurred while reading the child's stderr.
    Io(std::io::Error),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(msg) => write!(f, "failed to spawn target: {msg}"),
            Self::ExitedEarly { exit_code, stderr } => {
                let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                let tail = stderr.trim();
                if tail.is_empty() {
                    write!(f, "target exited ({code}) before the inspector endpoint appeared")
                } else {
                    write!(
                        f,
                        "target exited ({code}) before the inspector endpoint appeared: {tail}"
                    )
                }
            }
            Self::StartupTimeout => {
                write!(f, "timed out waiting for the target's inspector endpoint")
            }
            Self::Io(e) => write!(f, "target stderr read error: {e}"),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LaunchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
