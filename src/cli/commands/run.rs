//! Implementation of the `covergen run` command.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::application::{Pipeline, RunOptions, RunReport};
use crate::cli::output::progress::{create_iteration_bar, ProgressBarExt};
use crate::cli::output::table::{format_coverage_table, format_iterations_table};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, LoopState, TerminationReason};
use crate::domain::ports::TextGenerator;
use crate::infrastructure::llm::LlmClient;
use crate::services::LoopObserver;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// C# source file to generate tests for
    pub source_file: PathBuf,

    /// Project root (defaults to the source file's directory)
    pub project_path: Option<PathBuf>,

    /// Line coverage percentage that ends the loop
    #[arg(long, value_parser = parse_percentage)]
    pub target: Option<f64>,

    /// Maximum number of generate/measure cycles
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Base revision for the change set (detected when omitted)
    #[arg(long)]
    pub base: Option<String>,

    /// Install the report renderer and missing coverage collectors
    #[arg(long)]
    pub install_tools: bool,
}

/// Accepts a percentage in (0, 100]
pub fn parse_percentage(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if parsed > 0.0 && parsed <= 100.0 {
        Ok(parsed)
    } else {
        Err(format!("{parsed} is outside (0, 100]"))
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub target_met: bool,
    #[serde(flatten)]
    pub report: RunReport,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let state = &report.state;
        let mut lines = Vec::new();

        let headline = match report.termination {
            Some(TerminationReason::TargetMet) => style(format!(
                "Target met: {:.2}% line coverage (target {:.2}%)",
                state.coverage, state.target
            ))
            .green()
            .bold(),
            _ => style(format!(
                "Iterations exhausted: {:.2}% line coverage after {} of {} iterations (target {:.2}%)",
                state.coverage, state.iteration, state.max_iterations, state.target
            ))
            .yellow()
            .bold(),
        };
        lines.push(headline.to_string());
        lines.push(format!("Source:    {}", report.source_file.display()));
        lines.push(format!("Project:   {}", report.project_root.display()));
        lines.push(format!("Generator: {}", report.generator));
        lines.push(format!(
            "Base:      {} ({} changed lines, {} C# files)",
            report.base_ref.as_deref().unwrap_or("none"),
            report.changed_lines,
            report.changed_sources.len()
        ));
        lines.push(format!(
            "Outline:   {} classes, {} public methods",
            report.outline.classes.len(),
            report.outline.method_count()
        ));

        if !state.measurements.is_empty() || !state.errors.is_empty() {
            lines.push(String::new());
            lines.push(format_iterations_table(state));
        }

        if let Some(artifacts) = &report.artifacts {
            if artifacts.merged_summary.is_some() {
                lines.push(String::new());
                lines.push(format_coverage_table(artifacts, Some(state.target)));
            }
            for (label, path) in [
                ("HTML report", &artifacts.html_report),
                ("Diff HTML report", &artifacts.diff_html_report),
            ] {
                if let Some(path) = path {
                    lines.push(format!("{label}: {}", path.display()));
                }
            }
        }

        match &report.generated_tests_file {
            Some(path) => lines.push(format!(
                "\n{} {} test file(s) written to {}",
                style("✓").green(),
                state.generated_tests.len(),
                path.display()
            )),
            None => lines.push(format!("\n{} no tests were generated", style("!").yellow())),
        }

        if !report.warnings.is_empty() {
            lines.push(format!("\n{}", style("Warnings:").yellow()));
            for warning in &report.warnings {
                lines.push(format!("  - {warning}"));
            }
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunArgs, config: Config, json_mode: bool) -> Result<()> {
    let generator: Arc<dyn TextGenerator> = Arc::new(
        LlmClient::from_config(&config.llm, &config.retry)
            .context("Failed to set up the text-generation provider")?,
    );

    let budget = args.max_iterations.unwrap_or(config.coverage.max_iterations);
    let bar = create_iteration_bar(budget, json_mode);
    let tracked = bar.clone();
    let observer: LoopObserver = Arc::new(move |state: &LoopState| tracked.track(state));

    let pipeline = Pipeline::with_system_processes(config)
        .with_generator(generator)
        .with_observer(observer);

    let options = RunOptions {
        base_ref: args.base,
        target: args.target,
        max_iterations: args.max_iterations,
        install_tools: args.install_tools,
    };

    let report = match pipeline
        .run(&args.source_file, args.project_path.as_deref(), options)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            bar.finish_error("run aborted");
            return Err(e).context(format!("Run failed for {}", args.source_file.display()));
        }
    };

    match report.termination {
        Some(TerminationReason::TargetMet) => bar.finish_success("target met"),
        _ => bar.finish_warning("iteration budget used up"),
    }

    let result = RunOutput {
        target_met: report.target_met(),
        report,
    };
    output(&result, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percentage_bounds() {
        assert_eq!(parse_percentage("80"), Ok(80.0));
        assert_eq!(parse_percentage("100"), Ok(100.0));
        assert!(parse_percentage("0").is_err());
        assert!(parse_percentage("100.5").is_err());
        assert!(parse_percentage("eighty").is_err());
    }
}
