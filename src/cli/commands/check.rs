//! Implementation of the `covergen check` command.

use anyhow::Result;
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;

use crate::application::Pipeline;
use crate::cli::output::progress::create_spinner;
use crate::cli::output::table::{format_readiness_table, format_test_projects_table};
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{Config, EnvironmentReadiness};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Project root to inspect
    #[arg(default_value = ".")]
    pub project_path: PathBuf,

    /// Install the report renderer and missing coverage collectors
    #[arg(long)]
    pub install_tools: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub ready: bool,
    pub problems: Vec<String>,
    #[serde(flatten)]
    pub readiness: EnvironmentReadiness,
}

impl CheckOutput {
    pub fn new(readiness: EnvironmentReadiness) -> Self {
        let mut problems = readiness.blocking_problems();
        if readiness.test_projects.is_empty() {
            problems.push("no test projects found".to_string());
        }
        Self {
            ready: problems.is_empty(),
            problems,
            readiness,
        }
    }
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format_readiness_table(&self.readiness)];

        if !self.readiness.test_projects.is_empty() {
            lines.push(String::new());
            lines.push(format_test_projects_table(&self.readiness));
        }

        if !self.readiness.warnings.is_empty() {
            lines.push(format!("\n{}", style("Warnings:").yellow()));
            for warning in &self.readiness.warnings {
                lines.push(format!("  - {warning}"));
            }
        }

        if self.ready {
            lines.push(format!("\n{} ready", style("✓").green()));
        } else {
            lines.push(format!("\n{} not ready:", style("✗").red()));
            for problem in &self.problems {
                lines.push(format!("  - {problem}"));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CheckArgs, config: Config, json_mode: bool) -> Result<()> {
    let spinner = create_spinner("probing environment", json_mode);
    let readiness = Pipeline::with_system_processes(config)
        .check(&args.project_path, args.install_tools)
        .await;
    spinner.finish_and_clear();

    let result = CheckOutput::new(readiness);
    output(&result, json_mode);

    if result.ready {
        Ok(())
    } else {
        Err(DomainError::EnvironmentMissing(result.problems.join("; ")).into())
    }
}
