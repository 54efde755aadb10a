use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::cdp::CdpConfig;

/// Default node executable, resolved through `PATH`.
const DEFAULT_NODE_EXECUTABLE: &str = "node";
/// Default CDP command timeout in milliseconds.
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
/// Default launch/attach timeout in milliseconds.
const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Config file (parsed from TOML)
// ---------------------------------------------------------------------------

/// Represents the parsed TOML config file. All fields optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub node: NodeSection,
    pub timeouts: TimeoutsSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Path to the node executable.
    pub executable: Option<String>,
    /// Extra arguments placed before the script path.
    pub extra_args: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Timeout for individual CDP commands, in milliseconds.
    pub command_ms: Option<u64>,
    /// Timeout for launch and attach, in milliseconds.
    pub launch_ms: Option<u64>,
}

/// Locate and parse the config file.
///
/// With an explicit path, a missing or malformed file is reported on the
/// diagnostic stream and defaults are used; without one, the standard
/// location `<config_dir>/debug-bridge/config.toml` is tried and silence
/// means defaults.
#[must_use]
pub fn load_config(explicit: Option<&Path>) -> (Option<PathBuf>, ConfigFile) {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => dirs::config_dir().map(|dir| dir.join("debug-bridge").join("config.toml")),
    };
    let Some(path) = path else {
        return (None, ConfigFile::default());
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => (Some(path), config),
            Err(e) => {
                warn!("ignoring malformed config file {}: {e}", path.display());
                (Some(path), ConfigFile::default())
            }
        },
        Err(e) => {
            if explicit.is_some() {
                warn!("could not read config file {}: {e}", path.display());
            }
            (None, ConfigFile::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved bridge configuration with all defaults filled in.
/// Precedence: CLI flags > env vars (via clap) > config file > defaults.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The node executable used to launch targets.
    pub node_executable: String,
    /// Extra node arguments placed before the script path.
    pub node_args: Vec<String>,
    /// Timeout for individual CDP commands.
    pub command_timeout: Duration,
    /// Timeout for launching the target and attaching to it.
    pub launch_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_executable: DEFAULT_NODE_EXECUTABLE.to_string(),
            node_args: Vec::new(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            launch_timeout: Duration::from_millis(DEFAULT_LAUNCH_TIMEOUT_MS),
        }
    }
}

impl BridgeConfig {
    /// Merge the config file with CLI/env overrides.
    #[must_use]
    pub fn resolve(
        file: &ConfigFile,
        node_path: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            node_executable: node_path
                .or_else(|| file.node.executable.clone())
                .unwrap_or(defaults.node_executable),
            node_args: file.node.extra_args.clone().unwrap_or_default(),
            command_timeout: Duration::from_millis(
                timeout_ms
                    .or(file.timeouts.command_ms)
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS),
            ),
            launch_timeout: Duration::from_millis(
                file.timeouts.launch_ms.unwrap_or(DEFAULT_LAUNCH_TIMEOUT_MS),
            ),
        }
    }

    /// The CDP client configuration for this bridge configuration.
    #[must_use]
    pub fn cdp_config(&self) -> CdpConfig {
        CdpConfig {
            command_timeout: self.command_timeout,
            ..CdpConfig::default()
        }
    }
}
