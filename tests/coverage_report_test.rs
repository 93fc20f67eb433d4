//! Coverage report transforms: summarize, filter, merge and render.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{arg_after, calc_report, temp_dir, write, ClassLines};
use covergen::domain::models::ChangeSet;
use covergen::domain::ports::CommandOutput;
use covergen::infrastructure::process::ScriptedCommandRunner;
use covergen::infrastructure::xml;
use covergen::services::cobertura;
use covergen::services::{ArtifactLayout, CoverageRunner, DotnetService};

fn calc_changes() -> ChangeSet {
    let mut change_set = ChangeSet::new();
    change_set.add_range("src/App/Calc.cs", 10, 4);
    change_set
}

fn runner_with(runner: &ScriptedCommandRunner, root: &std::path::Path) -> CoverageRunner {
    let shared: Arc<ScriptedCommandRunner> = Arc::new(runner.clone());
    CoverageRunner::new(
        shared.clone(),
        Arc::new(DotnetService::new(shared, "dotnet", "reportgenerator")),
        ArtifactLayout::new(root, "coverage-report"),
    )
}

#[test]
fn test_summary_of_45_out_of_60() {
    let lines: Vec<(u32, u32)> = (1..=60).map(|n| (n, u32::from(n <= 45))).collect();
    let report = common::cobertura_report(&[ClassLines {
        filename: "src/App/Big.cs",
        lines: &lines,
    }]);

    let summary = cobertura::summarize(&xml::parse(&report).unwrap()).unwrap();
    assert!((summary.line_coverage - 75.0).abs() < 1e-9);
    assert_eq!(summary.lines_covered, 45);
    assert_eq!(summary.lines_valid, 60);
    assert_eq!(summary.lines_uncovered, 15);
}

#[test]
fn test_filter_keeps_only_changed_lines() {
    let report = xml::parse(&calc_report(3)).unwrap();
    let (filtered, stats) = cobertura::filter_report(&report, &calc_changes());

    assert_eq!(stats.lines_retained, 4);
    assert_eq!(stats.lines_examined, 4);
    let classes = filtered.descendants("class");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].attr("filename"), Some("src/App/Calc.cs"));

    let summary = cobertura::summarize(&filtered).unwrap();
    assert!((summary.line_coverage - 75.0).abs() < 1e-9);
    assert_eq!(summary.lines_valid, 4);
}

#[test]
fn test_filter_is_idempotent() {
    let dir = temp_dir();
    let source = dir.path().join("merged.xml");
    write(&source, &calc_report(1));

    let once = dir.path().join("once.xml");
    let twice = dir.path().join("twice.xml");
    let first = cobertura::filter_file(&source, &calc_changes(), &once).unwrap();
    let second = cobertura::filter_file(&once, &calc_changes(), &twice).unwrap();

    assert_eq!(first.lines_retained, second.lines_retained);
    assert_eq!(
        std::fs::read_to_string(&once).unwrap(),
        std::fs::read_to_string(&twice).unwrap()
    );
    assert_eq!(
        cobertura::summarize_file(&once),
        cobertura::summarize_file(&twice)
    );
}

#[test]
fn test_filter_with_unrelated_changes_retains_nothing() {
    let mut change_set = ChangeSet::new();
    change_set.add_line("src/App/Unrelated.cs", 1);
    let report = xml::parse(&calc_report(4)).unwrap();

    let (filtered, stats) = cobertura::filter_report(&report, &change_set);
    assert_eq!(stats.lines_retained, 0);
    assert!(filtered.descendants("class").is_empty());
    // Empty packages stay in place
    assert_eq!(filtered.descendants("package").len(), 1);
}

#[test]
fn test_malformed_report_has_no_summary() {
    let dir = temp_dir();
    let path = dir.path().join("broken.xml");
    write(&path, "<coverage line-rate=\"0.5\"><packages>");
    assert!(cobertura::summarize_file(&path).is_none());
    assert!(cobertura::summarize_file(&dir.path().join("missing.xml")).is_none());
}

#[tokio::test]
async fn test_merging_one_report_is_identity() {
    let dir = temp_dir();
    let runner = ScriptedCommandRunner::new();
    let coverage = runner_with(&runner, dir.path());

    let single = dir.path().join("coverage-report/App.Tests_coverage.cobertura.xml");
    write(&single, &calc_report(2));
    let merged = coverage.layout().merged_report();

    assert!(coverage.merge(&[single.clone()], &merged).await);
    assert_eq!(
        std::fs::read_to_string(&single).unwrap(),
        std::fs::read_to_string(&merged).unwrap()
    );
    // No tool involved
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_merging_several_reports_uses_the_report_tool() {
    let dir = temp_dir();
    let runner = ScriptedCommandRunner::new();
    runner.effect("reportgenerator", &[], |command| {
        let target = command
            .args
            .iter()
            .find_map(|a| a.strip_prefix("-targetdir:"))
            .map(PathBuf::from)
            .unwrap();
        write(&target.join("Cobertura.xml"), &calc_report(4));
        CommandOutput::success("")
    });
    let coverage = runner_with(&runner, dir.path());

    let first = dir.path().join("coverage-report/A_coverage.cobertura.xml");
    let second = dir.path().join("coverage-report/B_coverage.cobertura.xml");
    write(&first, &calc_report(1));
    write(&second, &calc_report(3));
    let merged = coverage.layout().merged_report();

    assert!(coverage.merge(&[first.clone(), second.clone()], &merged).await);
    let summary = cobertura::summarize_file(&merged).unwrap();
    assert_eq!(summary.lines_covered, 6);

    let call = &runner.calls()[0];
    assert_eq!(
        call.args[0],
        format!("-reports:{};{}", first.display(), second.display())
    );
    assert!(call.args.contains(&"-reporttypes:Cobertura".to_string()));
    // Staging is cleaned up
    assert!(!dir.path().join("coverage-report/.merge").exists());
}

#[tokio::test]
async fn test_render_requires_entry_point() {
    let dir = temp_dir();
    let report = dir.path().join("coverage-report/coverage.merged.cobertura.xml");
    write(&report, &calc_report(2));

    let silent = ScriptedCommandRunner::new();
    silent.ok("reportgenerator", &[], "");
    let coverage = runner_with(&silent, dir.path());
    let html = coverage.layout().html_dir();
    assert!(!coverage.render_html(&report, &html, "Coverage").await);

    let rendering = ScriptedCommandRunner::new();
    rendering.effect("reportgenerator", &[], |command| {
        let target = command
            .args
            .iter()
            .find_map(|a| a.strip_prefix("-targetdir:"))
            .map(PathBuf::from)
            .unwrap();
        write(&target.join("index.html"), "<html></html>");
        CommandOutput::success("")
    });
    let coverage = runner_with(&rendering, dir.path());
    assert!(coverage.render_html(&report, &html, "Coverage").await);
    let call = &rendering.calls()[0];
    assert!(call.args.contains(&"-title:Coverage".to_string()));
    assert_eq!(arg_after(&call.args, "-reporttypes:Html"), Some(PathBuf::from("-title:Coverage")));
}
