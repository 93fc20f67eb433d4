//! Implementation of the `covergen coverage` command.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;

use crate::application::{CoverageReport, Pipeline};
use crate::cli::output::progress::{create_spinner, ProgressBarExt};
use crate::cli::output::table::format_coverage_table;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, CoverageSummary};

#[derive(Args, Debug)]
pub struct CoverageArgs {
    /// Project root containing the test projects
    #[arg(default_value = ".")]
    pub project_path: PathBuf,

    /// Base revision for the change set (detected when omitted)
    #[arg(long)]
    pub base: Option<String>,

    /// Skip HTML report rendering
    #[arg(long)]
    pub no_html: bool,
}

#[derive(Debug, Serialize)]
pub struct CoverageOutput {
    /// Value the convergence loop would judge
    pub effective: Option<CoverageSummary>,
    #[serde(flatten)]
    pub report: CoverageReport,
}

impl From<CoverageReport> for CoverageOutput {
    fn from(report: CoverageReport) -> Self {
        Self {
            effective: report.artifacts.effective_summary(),
            report,
        }
    }
}

impl CommandOutput for CoverageOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let artifacts = &report.artifacts;
        let mut lines = Vec::new();

        match &self.effective {
            Some(summary) => lines.push(
                style(format!("Line coverage: {:.2}%", summary.line_coverage))
                    .bold()
                    .to_string(),
            ),
            None => lines.push(style("No coverage measured").red().bold().to_string()),
        }
        lines.push(format!(
            "Base: {} ({} changed lines in {} files)",
            report.base_ref.as_deref().unwrap_or("none"),
            report.changed_lines,
            report.changed_files
        ));

        if artifacts.merged_summary.is_some() {
            lines.push(String::new());
            lines.push(format_coverage_table(artifacts, None));
        }

        let reports = [
            ("Merged report", &artifacts.merged_report),
            ("Diff report", &artifacts.filtered_report),
            ("HTML report", &artifacts.html_report),
            ("Diff HTML report", &artifacts.diff_html_report),
        ];
        for (label, path) in reports {
            if let Some(path) = path {
                lines.push(format!("{label}: {}", path.display()));
            }
        }

        if !artifacts.warnings.is_empty() {
            lines.push(format!("\n{}", style("Warnings:").yellow()));
            for warning in &artifacts.warnings {
                lines.push(format!("  - {warning}"));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CoverageArgs, config: Config, json_mode: bool) -> Result<()> {
    let spinner = create_spinner("running tests with coverage", json_mode);
    let report = Pipeline::with_system_processes(config)
        .coverage(&args.project_path, args.base, !args.no_html)
        .await;

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            spinner.finish_error("coverage pass aborted");
            return Err(e).with_context(|| {
                format!("Coverage pass failed in {}", args.project_path.display())
            });
        }
    };

    if report.artifacts.merged_summary.is_some() {
        spinner.finish_success("coverage measured");
    } else {
        spinner.finish_warning("no coverage produced");
    }

    output(&CoverageOutput::from(report), json_mode);
    Ok(())
}
