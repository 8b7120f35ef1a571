//! outpost CLI entry point

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod args;
mod commands;
mod config;
mod wiring;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_deref();

    let log_level = resolve_log_level(cli.log_level.as_deref(), config_path);
    init_logging(&log_level)?;

    match cli.command {
        Commands::Publish(args) => commands::publish::publish(args, config_path).await,
        Commands::Approve(args) => commands::publish::approve(args, config_path).await,
        Commands::Retry(args) => commands::publish::retry(args, config_path).await,
        Commands::History(args) => commands::records::history(args, config_path).await,
        Commands::Skip(args) => commands::records::skip(args, config_path).await,
        Commands::Preview(args) => commands::records::preview(args, config_path).await,
        Commands::Post(args) => commands::post::execute(args, config_path).await,
        Commands::Verify(args) => commands::verify::execute(args, config_path).await,
        Commands::Config(args) => commands::config::execute(args, config_path).await,
        Commands::Doctor(args) => commands::doctor::execute(args, config_path).await,
    }
}

/// `--log-level` wins, then `general.log_level` from config, then info.
/// A config that fails to load is reported later by the command itself.
fn resolve_log_level(cli_level: Option<&str>, config_path: Option<&Path>) -> String {
    if let Some(level) = cli_level {
        return level.to_string();
    }
    config::AppConfig::load(config_path)
        .map(|c| c.general.log_level)
        .unwrap_or_else(|_| "info".to_string())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
