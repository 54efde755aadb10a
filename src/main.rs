mod cli;

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing::error;
use tracing_subscriber::EnvFilter;

use debug_bridge::config::{self, BridgeConfig};
use debug_bridge::server;

use cli::{Cli, Command, CompletionsArgs};

#[tokio::main]
async fn main() {
    // Stdout belongs to the RPC channel; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are informational, not errors
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.print().expect("failed to write to stdout");
                std::process::exit(0);
            }
            e.print().expect("failed to write to stderr");
            std::process::exit(2);
        }
    };

    match cli.command {
        None | Some(Command::Serve) => {
            let (config_path, config_file) = config::load_config(cli.global.config.as_deref());
            if let Some(path) = &config_path {
                tracing::debug!("using config file {}", path.display());
            }
            let config =
                BridgeConfig::resolve(&config_file, cli.global.node_path, cli.global.timeout);

            if let Err(e) = server::serve(config).await {
                error!("server I/O error: {e}");
                std::process::exit(1);
            }
        }
        Some(Command::Completions(CompletionsArgs { shell })) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "debug-bridge", &mut std::io::stdout());
        }
    }
}
