//! Coverage measurement models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a test project collects coverage.
///
/// The two kinds need different `dotnet test` invocations: the results-directory
/// collector writes somewhere under a results folder and must be discovered after
/// the run, the build-integrated one writes exactly where it is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    /// `coverlet.collector` via `--collect "XPlat Code Coverage"`
    ResultsDirectory,
    /// `coverlet.msbuild` via `/p:CollectCoverage=true`
    BuildIntegrated,
}

impl CollectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::ResultsDirectory => "collector",
            CollectorKind::BuildIntegrated => "msbuild",
        }
    }

    /// NuGet package that wires this collector into a project
    pub fn package_name(&self) -> &'static str {
        match self {
            CollectorKind::ResultsDirectory => "coverlet.collector",
            CollectorKind::BuildIntegrated => "coverlet.msbuild",
        }
    }
}

/// Scalar view of a coverage report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Line coverage percentage (0-100)
    pub line_coverage: f64,
    /// Branch coverage percentage (0-100)
    pub branch_coverage: f64,
    pub lines_covered: u64,
    pub lines_valid: u64,
    pub lines_uncovered: u64,
}

impl CoverageSummary {
    /// Build a summary from absolute counts and rates in the 0-1 range.
    ///
    /// Returns `None` when `lines_covered > lines_valid`.
    pub fn from_counts(
        lines_covered: u64,
        lines_valid: u64,
        line_rate: f64,
        branch_rate: f64,
    ) -> Option<Self> {
        if lines_covered > lines_valid {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let line_coverage = if lines_valid > 0 {
            lines_covered as f64 / lines_valid as f64 * 100.0
        } else {
            line_rate * 100.0
        };

        Some(Self {
            line_coverage,
            branch_coverage: branch_rate * 100.0,
            lines_covered,
            lines_valid,
            lines_uncovered: lines_valid - lines_covered,
        })
    }
}

/// Result of filtering a report by a change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOutcome {
    /// Derived report on disk
    pub path: PathBuf,
    /// Line entries kept
    pub lines_retained: u64,
    /// Line entries examined in classes whose file matched the change set
    pub lines_examined: u64,
}

/// Artifacts produced by one coverage pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageArtifacts {
    /// One raw report per test project that produced coverage
    pub project_reports: Vec<PathBuf>,
    pub merged_report: Option<PathBuf>,
    pub filtered_report: Option<PathBuf>,
    pub lines_retained: Option<u64>,
    pub merged_summary: Option<CoverageSummary>,
    pub filtered_summary: Option<CoverageSummary>,
    pub html_report: Option<PathBuf>,
    pub diff_html_report: Option<PathBuf>,
    /// Problems met along the way; none of them stopped the pass
    pub warnings: Vec<String>,
}

impl CoverageArtifacts {
    /// Coverage value used to judge convergence.
    ///
    /// The diff-scoped number when the filtered report kept at least one line,
    /// otherwise the overall number of the merged report.
    pub fn effective_summary(&self) -> Option<CoverageSummary> {
        match (self.filtered_summary, self.lines_retained) {
            (Some(filtered), Some(retained)) if retained > 0 => Some(filtered),
            _ => self.merged_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_arithmetic() {
        let summary = CoverageSummary::from_counts(45, 60, 0.75, 0.5).unwrap();
        assert!((summary.line_coverage - 75.0).abs() < f64::EPSILON);
        assert!((summary.branch_coverage - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.lines_uncovered, 15);
    }

    #[test]
    fn test_summary_uses_rate_without_lines() {
        let summary = CoverageSummary::from_counts(0, 0, 0.4, 0.0).unwrap();
        assert!((summary.line_coverage - 40.0).abs() < 1e-9);
        assert_eq!(summary.lines_uncovered, 0);
    }

    #[test]
    fn test_summary_rejects_inconsistent_counts() {
        assert!(CoverageSummary::from_counts(61, 60, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_effective_summary_prefers_filtered_with_lines() {
        let merged = CoverageSummary::from_counts(50, 100, 0.5, 0.0);
        let filtered = CoverageSummary::from_counts(9, 10, 0.9, 0.0);

        let mut artifacts = CoverageArtifacts {
            merged_summary: merged,
            filtered_summary: filtered,
            lines_retained: Some(10),
            ..Default::default()
        };
        assert_eq!(artifacts.effective_summary(), filtered);

        artifacts.lines_retained = Some(0);
        assert_eq!(artifacts.effective_summary(), merged);

        artifacts.filtered_summary = None;
        artifacts.lines_retained = None;
        assert_eq!(artifacts.effective_summary(), merged);
    }

    #[test]
    fn test_collector_packages() {
        assert_eq!(CollectorKind::ResultsDirectory.package_name(), "coverlet.collector");
        assert_eq!(CollectorKind::BuildIntegrated.package_name(), "coverlet.msbuild");
    }
}
