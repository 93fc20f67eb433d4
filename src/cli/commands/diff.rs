//! Implementation of the `covergen diff` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::application::{DiffReport, Pipeline};
use crate::cli::output::table::format_change_set_table;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Project root inside a git repository
    #[arg(default_value = ".")]
    pub project_path: PathBuf,

    /// Base revision (detected when omitted)
    #[arg(long)]
    pub base: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiffOutput {
    pub changed_files: usize,
    pub changed_lines: usize,
    #[serde(flatten)]
    pub report: DiffReport,
}

impl From<DiffReport> for DiffOutput {
    fn from(report: DiffReport) -> Self {
        Self {
            changed_files: report.change_set.file_count(),
            changed_lines: report.change_set.total_lines(),
            report,
        }
    }
}

impl CommandOutput for DiffOutput {
    fn to_human(&self) -> String {
        let base = self.report.base_ref.as_deref().unwrap_or("no base revision");
        if self.report.change_set.is_empty() {
            return format!("No changed lines against {base}");
        }
        let sources = match self.report.changed_sources.len() {
            0 => "no C# files changed".to_string(),
            n => format!("{n} C# files: {}", self.report.changed_sources.join(", ")),
        };
        format!(
            "{} changed lines in {} files against {base}\n{sources}\n\n{}",
            self.changed_lines,
            self.changed_files,
            format_change_set_table(&self.report.change_set)
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: DiffArgs, config: Config, json_mode: bool) -> Result<()> {
    let report = Pipeline::with_system_processes(config)
        .diff(&args.project_path, args.base)
        .await
        .with_context(|| format!("Failed to compute changes in {}", args.project_path.display()))?;

    output(&DiffOutput::from(report), json_mode);
    Ok(())
}
