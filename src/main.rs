//! covergen CLI entry point.

use anyhow::Context;
use clap::Parser;

use covergen::cli::{commands, handle_error, Cli, Commands};
use covergen::domain::errors::DomainError;
use covergen::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let json = cli.json;

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => handle_error(err, json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging))
        .context("Failed to initialize logging")
    {
        Ok(logger) => logger,
        Err(err) => handle_error(err, json),
    };

    let command = async move {
        match cli.command {
            Commands::Run(args) => commands::run::execute(args, config, json).await,
            Commands::Check(args) => commands::check::execute(args, config, json).await,
            Commands::Diff(args) => commands::diff::execute(args, config, json).await,
            Commands::Coverage(args) => commands::coverage::execute(args, config, json).await,
        }
    };

    // Dropping the command future kills any child process it is waiting on
    let result = tokio::select! {
        result = command => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, stopping");
            Err(DomainError::Interrupted.into())
        }
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}
