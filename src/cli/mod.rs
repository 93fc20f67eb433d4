//! Command-line interface for covergen.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

pub use output::progress::{create_iteration_bar, create_spinner, ProgressBarExt};

#[derive(Parser, Debug)]
#[command(name = "covergen")]
#[command(author, version, about = "Generate unit tests until the changed code is covered", long_about = None)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file replacing .covergen/config.yaml and .covergen/local.yaml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate tests for a source file until the coverage target is met
    Run(commands::run::RunArgs),
    /// Report whether the toolchain and project are ready
    Check(commands::check::CheckArgs),
    /// Show the lines changed against the base revision
    Diff(commands::diff::DiffArgs),
    /// Run one coverage pass over every test project
    Coverage(commands::coverage::CoverageArgs),
}

impl Cli {
    /// Configuration for this invocation
    pub fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => ConfigLoader::load_from_file(path),
            None => ConfigLoader::load(),
        }
    }
}

/// Exit code for an error, distinguishing the fatal domain kinds
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<DomainError>() {
        Some(DomainError::Interrupted) => 130,
        Some(DomainError::EnvironmentMissing(_)) => 2,
        _ => 1,
    }
}

/// Print an error and exit
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": causes,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {}", style("error:").red().bold(), err);
        for cause in err.chain().skip(1) {
            eprintln!("  {} {}", style("caused by:").dim(), cause);
        }
    }
    std::process::exit(exit_code(&err))
}
