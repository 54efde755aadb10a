mod error;
mod launcher;

pub use error::LaunchError;
pub use launcher::{LaunchConfig, NodeProcess, extract_inspector_url, launch_node};
