//! Project coverage probe
//!
//! The measuring stage of the convergence loop against a real project: drop
//! the candidate tests into the first test project, run a coverage pass and
//! report the diff-scoped (or overall) line coverage.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChangeSet, CoverageArtifacts, CoverageSummary, TestProject};
use crate::domain::ports::CoverageProbe;
use crate::services::coverage_runner::{CoverageRunner, PassOptions};

const GENERATED_DIR: &str = "Generated";

/// Where the loop's current candidate lives inside the test project
pub fn generated_test_path(project: &TestProject, source_stem: &str) -> PathBuf {
    project
        .path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(GENERATED_DIR)
        .join(format!("{source_stem}GeneratedTests.cs"))
}

pub struct ProjectCoverageProbe {
    coverage: Arc<CoverageRunner>,
    projects: Vec<TestProject>,
    change_set: ChangeSet,
    source_stem: String,
    last_artifacts: Mutex<Option<CoverageArtifacts>>,
}

impl ProjectCoverageProbe {
    pub fn new(
        coverage: Arc<CoverageRunner>,
        projects: Vec<TestProject>,
        change_set: ChangeSet,
        source_stem: impl Into<String>,
    ) -> Self {
        Self {
            coverage,
            projects,
            change_set,
            source_stem: source_stem.into(),
            last_artifacts: Mutex::new(None),
        }
    }

    /// Artifacts of the most recent pass
    pub fn last_artifacts(&self) -> Option<CoverageArtifacts> {
        self.last_artifacts.lock().ok().and_then(|guard| guard.clone())
    }

    fn write_candidate(&self, test_code: &str) -> DomainResult<PathBuf> {
        let project = self.projects.first().ok_or_else(|| {
            DomainError::MeasurementFailed("no test project to place generated tests in".to_string())
        })?;
        let path = generated_test_path(project, &self.source_stem);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, test_code)?;
        Ok(path)
    }
}

#[async_trait]
impl CoverageProbe for ProjectCoverageProbe {
    #[instrument(skip(self, test_code))]
    async fn measure(&self, test_code: &str, iteration: u32) -> DomainResult<CoverageSummary> {
        let candidate = self
            .write_candidate(test_code)
            .map_err(|e| DomainError::MeasurementFailed(format!("cannot write generated tests: {e}")))?;
        info!(iteration, path = %candidate.display(), "placed generated tests");

        let options = PassOptions {
            render_html: false,
            title: String::new(),
        };
        let artifacts = self
            .coverage
            .run_pass(&self.projects, &self.change_set, &options)
            .await;
        let summary = artifacts.effective_summary();
        let warnings = artifacts.warnings.join("; ");
        if let Some(summary) = &summary {
            info!(iteration, line_coverage = summary.line_coverage, "measured coverage");
        }

        if let Ok(mut last) = self.last_artifacts.lock() {
            *last = Some(artifacts);
        }

        summary.ok_or_else(|| {
            DomainError::MeasurementFailed(if warnings.is_empty() {
                "no coverage measured".to_string()
            } else {
                warnings
            })
        })
    }
}

/// Coverage probe that replays a scripted sequence of measurements.
///
/// Once the sequence is used up the last entry repeats. Test bodies it was
/// asked to measure are recorded.
#[derive(Clone, Default)]
pub struct ScriptedCoverageProbe {
    results: Arc<Mutex<VecDeque<Result<f64, String>>>>,
    last: Arc<Mutex<Option<Result<f64, String>>>>,
    measured: Arc<Mutex<Vec<(u32, String)>>>,
}

impl ScriptedCoverageProbe {
    /// Probe answering the given line-coverage percentages in order
    pub fn sequence(percentages: &[f64]) -> Self {
        let probe = Self::default();
        if let Ok(mut results) = probe.results.lock() {
            results.extend(percentages.iter().copied().map(Ok));
        }
        probe
    }

    /// Queue a failed measurement
    #[must_use]
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(Err(message.into()));
        }
        self
    }

    /// Queue a successful measurement
    #[must_use]
    pub fn then(self, percentage: f64) -> Self {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(Ok(percentage));
        }
        self
    }

    /// `(iteration, test body)` pairs measured so far
    pub fn measured(&self) -> Vec<(u32, String)> {
        self.measured.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CoverageProbe for ScriptedCoverageProbe {
    async fn measure(&self, test_code: &str, iteration: u32) -> DomainResult<CoverageSummary> {
        if let Ok(mut measured) = self.measured.lock() {
            measured.push((iteration, test_code.to_string()));
        }

        let next = self.results.lock().ok().and_then(|mut results| results.pop_front());
        let result = match next {
            Some(result) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(result.clone());
                }
                Some(result)
            }
            None => self.last.lock().ok().and_then(|last| last.clone()),
        };

        match result {
            Some(Ok(percentage)) => Ok(CoverageSummary {
                line_coverage: percentage,
                branch_coverage: 0.0,
                lines_covered: 0,
                lines_valid: 0,
                lines_uncovered: 0,
            }),
            Some(Err(message)) => Err(DomainError::MeasurementFailed(message)),
            None => Err(DomainError::MeasurementFailed("no scripted measurement".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TestFrameworkKind;
    use crate::domain::ports::CommandOutput;
    use crate::infrastructure::process::ScriptedCommandRunner;
    use crate::services::coverage_runner::ArtifactLayout;
    use crate::services::dotnet_service::DotnetService;

    fn test_project(root: &Path) -> TestProject {
        TestProject {
            path: root.join("tests/App.Tests/App.Tests.csproj"),
            framework: TestFrameworkKind::XUnit,
            collector: None,
            target_framework: None,
        }
    }

    fn probe(runner: &ScriptedCommandRunner, root: &Path) -> ProjectCoverageProbe {
        let shared: Arc<ScriptedCommandRunner> = Arc::new(runner.clone());
        let coverage = CoverageRunner::new(
            shared.clone(),
            Arc::new(DotnetService::new(shared, "dotnet", "reportgenerator")),
            ArtifactLayout::new(root, "coverage-report"),
        );
        ProjectCoverageProbe::new(Arc::new(coverage), vec![test_project(root)], ChangeSet::new(), "Calc")
    }

    #[test]
    fn test_generated_path() {
        let project = test_project(Path::new("/repo"));
        assert_eq!(
            generated_test_path(&project, "Calc"),
            PathBuf::from("/repo/tests/App.Tests/Generated/CalcGeneratedTests.cs")
        );
    }

    #[tokio::test]
    async fn test_measure_writes_candidate_and_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedCommandRunner::new();
        runner.fail("dotnet", &["build"], 1);
        let probe = probe(&runner, dir.path());

        let result = probe.measure("using Xunit;", 0).await;
        assert!(matches!(result, Err(DomainError::MeasurementFailed(_))));

        let written = generated_test_path(&test_project(dir.path()), "Calc");
        assert_eq!(std::fs::read_to_string(written).unwrap(), "using Xunit;");
        assert!(probe.last_artifacts().is_some());
    }

    #[tokio::test]
    async fn test_measure_returns_overall_coverage_without_change_set() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedCommandRunner::new();
        runner.ok("dotnet", &["build"], "");
        runner.effect("dotnet", &["test"], |command| {
            let index = command.args.iter().position(|a| a == "--results-directory").unwrap();
            let raw = PathBuf::from(&command.args[index + 1]).join("run");
            std::fs::create_dir_all(&raw).unwrap();
            std::fs::write(
                raw.join("coverage.cobertura.xml"),
                r#"<coverage line-rate="0.75" branch-rate="0" lines-covered="45" lines-valid="60" />"#,
            )
            .unwrap();
            CommandOutput::success("")
        });
        let probe = probe(&runner, dir.path());

        let summary = probe.measure("using Xunit;", 1).await.unwrap();
        assert!((summary.line_coverage - 75.0).abs() < 1e-9);
        assert_eq!(summary.lines_uncovered, 15);
    }

    #[tokio::test]
    async fn test_measure_without_test_projects() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedCommandRunner::new();
        let shared: Arc<ScriptedCommandRunner> = Arc::new(runner);
        let coverage = CoverageRunner::new(
            shared.clone(),
            Arc::new(DotnetService::new(shared, "dotnet", "reportgenerator")),
            ArtifactLayout::new(dir.path(), "coverage-report"),
        );
        let probe = ProjectCoverageProbe::new(Arc::new(coverage), Vec::new(), ChangeSet::new(), "Calc");
        assert!(matches!(
            probe.measure("x", 0).await,
            Err(DomainError::MeasurementFailed(_))
        ));
    }
}
