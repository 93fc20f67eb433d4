//! Table formatting using comfy-table
//!
//! Tables for readiness snapshots, change sets, coverage summaries and the
//! per-iteration history of a run.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::collections::BTreeSet;
use std::env;

use crate::domain::models::{
    ChangeSet, CoverageArtifacts, CoverageSummary, EnvironmentReadiness, LoopState,
};

use super::truncate;

/// Create a base table with common settings
fn create_base_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    if !supports_color() {
        table.force_no_tty();
    }
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn check_cell(ok: bool) -> Cell {
    if ok {
        Cell::new("✓").fg(Color::Green)
    } else {
        Cell::new("✗").fg(Color::Red)
    }
}

fn coverage_color(percent: f64, target: f64) -> Color {
    if percent >= target {
        Color::Green
    } else if percent >= target / 2.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn join_majors(majors: impl IntoIterator<Item = u32>) -> String {
    let joined: Vec<String> = majors.into_iter().map(|m| m.to_string()).collect();
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined.join(", ")
    }
}

/// Readiness checklist
pub fn format_readiness_table(readiness: &EnvironmentReadiness) -> String {
    let mut table = create_base_table(&["Check", "Status", "Details"]);

    let branch = match (&readiness.current_branch, &readiness.base_branch) {
        (Some(current), Some(base)) => format!("{current} (base {base})"),
        (Some(current), None) => format!("{current} (no base branch)"),
        (None, Some(base)) => format!("base {base}"),
        (None, None) => "-".to_string(),
    };
    table.add_row(vec![Cell::new("git repository"), check_cell(readiness.is_git_repo), Cell::new(branch)]);
    table.add_row(vec![
        Cell::new("project files"),
        check_cell(!readiness.build_descriptors.is_empty()),
        Cell::new(format!("{} .csproj", readiness.build_descriptors.len())),
    ]);
    table.add_row(vec![
        Cell::new("test projects"),
        check_cell(!readiness.test_projects.is_empty()),
        Cell::new(readiness.test_projects.len()),
    ]);
    table.add_row(vec![
        Cell::new("dotnet SDK"),
        check_cell(readiness.dotnet_installed),
        Cell::new(format!("installed: {}", join_majors(readiness.installed_sdks.iter().copied()))),
    ]);

    let sdk_details = if readiness.missing_frameworks.is_empty() {
        format!("required: {}", join_majors(readiness.required_frameworks.iter().copied()))
    } else {
        format!("missing: {}", join_majors(readiness.missing_frameworks.iter().copied()))
    };
    table.add_row(vec![
        Cell::new("target frameworks"),
        check_cell(readiness.all_sdks_present),
        Cell::new(sdk_details),
    ]);
    table.add_row(vec![
        Cell::new("report renderer"),
        check_cell(readiness.report_renderer_installed),
        Cell::new("reportgenerator"),
    ]);

    table.to_string()
}

/// One row per test project
pub fn format_test_projects_table(readiness: &EnvironmentReadiness) -> String {
    let mut table = create_base_table(&["Project", "Framework", "Target", "Collector"]);
    for project in &readiness.test_projects {
        let collector = match project.collector {
            Some(kind) => Cell::new(kind.as_str()),
            None => Cell::new("none").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(truncate(&project.path.display().to_string(), 60)),
            Cell::new(project.framework.as_str()),
            Cell::new(project.target_framework.as_deref().unwrap_or("-")),
            collector,
        ]);
    }
    table.to_string()
}

/// Changed files with their line counts and ranges
pub fn format_change_set_table(change_set: &ChangeSet) -> String {
    let mut table = create_base_table(&["File", "Lines", "Ranges"]);
    for (file, lines) in change_set.iter() {
        table.add_row(vec![
            Cell::new(truncate(file, 60)),
            Cell::new(lines.len()),
            Cell::new(truncate(&compress_ranges(lines.iter().copied()), 50)),
        ]);
    }
    table.to_string()
}

/// `1,2,3,7,9,10` -> `1-3, 7, 9-10`
pub fn compress_ranges(lines: impl IntoIterator<Item = u32>) -> String {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for line in lines {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == line => *end = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
        .iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn summary_row(label: &str, summary: &CoverageSummary, target: Option<f64>) -> Vec<Cell> {
    let line = Cell::new(format!("{:.2}%", summary.line_coverage));
    let line = match target {
        Some(target) => line.fg(coverage_color(summary.line_coverage, target)),
        None => line,
    };
    vec![
        Cell::new(label),
        line,
        Cell::new(format!("{:.2}%", summary.branch_coverage)),
        Cell::new(format!("{}/{}", summary.lines_covered, summary.lines_valid)),
        Cell::new(summary.lines_uncovered),
    ]
}

/// Overall and changed-lines coverage of one pass
pub fn format_coverage_table(artifacts: &CoverageArtifacts, target: Option<f64>) -> String {
    let mut table = create_base_table(&["Scope", "Line", "Branch", "Covered", "Uncovered"]);
    if let Some(summary) = &artifacts.merged_summary {
        table.add_row(summary_row("overall", summary, target));
    }
    if let Some(summary) = &artifacts.filtered_summary {
        let label = match artifacts.lines_retained {
            Some(retained) => format!("changed lines ({retained})"),
            None => "changed lines".to_string(),
        };
        table.add_row(summary_row(&label, summary, target));
    }
    table.to_string()
}

/// One row per loop iteration; every attempted iteration was either measured or failed
pub fn format_iterations_table(state: &LoopState) -> String {
    let mut table = create_base_table(&["Iteration", "Coverage", "Lines", "Outcome"]);
    let iterations: BTreeSet<u32> = state
        .measurements
        .iter()
        .map(|m| m.iteration)
        .chain(state.errors.iter().map(|e| e.iteration))
        .collect();

    for iteration in iterations {
        let measurement = state.measurements.iter().find(|m| m.iteration == iteration);
        let (coverage, lines) = match measurement {
            Some(m) => (
                Cell::new(format!("{:.2}%", m.summary.line_coverage))
                    .fg(coverage_color(m.summary.line_coverage, state.target)),
                Cell::new(format!("{}/{}", m.summary.lines_covered, m.summary.lines_valid)),
            ),
            None => (Cell::new("-"), Cell::new("-")),
        };
        let outcome = match state.errors.iter().find(|e| e.iteration == iteration) {
            Some(e) => Cell::new(truncate(&format!("{} failed: {}", e.kind, e.message), 60)).fg(Color::Red),
            None => Cell::new("measured"),
        };
        table.add_row(vec![Cell::new(iteration), coverage, lines, outcome]);
    }

    table.to_string()
}
