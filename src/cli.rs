use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "debug-bridge",
    version,
    about = "Debug Node.js scripts over a stdio RPC surface",
    long_about = "debug-bridge exposes a tool-call RPC surface over stdin/stdout for debugging \
        Node.js scripts. Each tool call is translated into Chrome DevTools Protocol exchanges \
        with a child node process launched under --inspect-brk: starting and stopping sessions, \
        setting breakpoints and logpoints, stepping, inspecting scopes and objects, evaluating \
        expressions and reading console output.\n\n\
        Designed for AI agents and editor integrations: requests are newline-delimited JSON-RPC \
        on stdin, responses are structured JSON on stdout, and diagnostics go to stderr.",
    term_width = 100
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args)]
pub struct GlobalOpts {
    /// Path to the node executable used to launch targets
    #[arg(long, env = "DEBUG_BRIDGE_NODE", global = true)]
    pub node_path: Option<String>,

    /// CDP command timeout in milliseconds
    #[arg(long, env = "DEBUG_BRIDGE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Path to a config file (default: <config_dir>/debug-bridge/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the stdio RPC server (the default when no subcommand is given)
    #[command(
        long_about = "Serve the tool-call RPC surface: read newline-delimited JSON-RPC requests \
            from stdin, dispatch each to the named debugging tool, and write one response line \
            per request to stdout. The server exits on EOF or an interrupt signal, tearing down \
            any active debug session first."
    )]
    Serve,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
