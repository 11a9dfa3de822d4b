//! Warden CLI entry point.

use clap::Parser;

use warden::cli::{Cli, Commands};
use warden::infrastructure::config::ConfigLoader;
use warden::infrastructure::logging::{prune_logs, LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // A broken config must not hide the command's own error report.
    let log_config = ConfigLoader::load()
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };
    if let Err(err) = prune_logs(&log_config).await {
        tracing::warn!("Log retention cleanup failed: {err:#}");
    }

    let result = match cli.command {
        Commands::Init(args) => warden::cli::commands::init::execute(args, cli.json).await,
        Commands::Task(args) => warden::cli::commands::task::execute(args, cli.json).await,
        Commands::Step(args) => warden::cli::commands::step::execute(args, cli.json).await,
        Commands::Intervention(args) => {
            warden::cli::commands::intervention::execute(args, cli.json).await
        }
        Commands::Snapshot(args) => warden::cli::commands::snapshot::execute(args, cli.json).await,
        Commands::History(args) => warden::cli::commands::history::execute(args, cli.json).await,
        Commands::Escalation(args) => {
            warden::cli::commands::escalation::execute(args, cli.json).await
        }
        Commands::Idea(args) => warden::cli::commands::idea::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        warden::cli::handle_error(err, cli.json);
    }
}
