// Library target exists to expose internal modules for integration tests.
// The binary entry point is in main.rs.

mod cli;

pub mod cdp;
pub mod config;
pub mod debugger;
pub mod error;
pub mod node;
pub mod server;
pub mod tools;

/// Returns the clap `Command` definition for completion generation.
#[must_use]
pub fn command() -> clap::Command {
    <cli::Cli as clap::CommandFactory>::command()
}
