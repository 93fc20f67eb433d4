//! Environment readiness models and the package lookup table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::coverage::CollectorKind;

/// Unit-test framework a test project depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFrameworkKind {
    XUnit,
    NUnit,
    MSTest,
    /// Test SDK referenced without a recognized framework, or a project that is
    /// a test project by name only
    Unknown,
}

impl TestFrameworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestFrameworkKind::XUnit => "xunit",
            TestFrameworkKind::NUnit => "nunit",
            TestFrameworkKind::MSTest => "mstest",
            TestFrameworkKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TestFrameworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Package-name substrings that mark a test project, checked in order.
const TEST_PACKAGES: &[(&str, TestFrameworkKind)] = &[
    ("xunit", TestFrameworkKind::XUnit),
    ("nunit", TestFrameworkKind::NUnit),
    ("mstest", TestFrameworkKind::MSTest),
    ("microsoft.net.test.sdk", TestFrameworkKind::Unknown),
];

/// Packages that wire a coverage collector in, matched exactly.
const COLLECTOR_PACKAGES: &[(&str, CollectorKind)] = &[
    ("coverlet.msbuild", CollectorKind::BuildIntegrated),
    ("coverlet.collector", CollectorKind::ResultsDirectory),
];

/// Classify a single package reference as a test framework
pub fn framework_for_package(package: &str) -> Option<TestFrameworkKind> {
    let package = package.to_ascii_lowercase();
    TEST_PACKAGES
        .iter()
        .find(|(needle, _)| package.contains(needle))
        .map(|(_, kind)| *kind)
}

/// Classify a single package reference as a coverage collector
pub fn collector_for_package(package: &str) -> Option<CollectorKind> {
    COLLECTOR_PACKAGES
        .iter()
        .find(|(name, _)| package.eq_ignore_ascii_case(name))
        .map(|(_, kind)| *kind)
}

/// Framework for a project given all its package references.
///
/// A recognized framework beats the bare test SDK, whatever the reference order.
pub fn detect_framework<'a>(packages: impl IntoIterator<Item = &'a str>) -> Option<TestFrameworkKind> {
    let mut found = None;
    for package in packages {
        match framework_for_package(package) {
            Some(TestFrameworkKind::Unknown) => {
                found.get_or_insert(TestFrameworkKind::Unknown);
            }
            Some(kind) => return Some(kind),
            None => {}
        }
    }
    found
}

/// Collector for a project given all its package references.
///
/// Build-integrated wins when both are referenced, since its output path is
/// deterministic.
pub fn detect_collector<'a>(packages: impl IntoIterator<Item = &'a str>) -> Option<CollectorKind> {
    let mut found = None;
    for package in packages {
        match collector_for_package(package) {
            Some(CollectorKind::BuildIntegrated) => return Some(CollectorKind::BuildIntegrated),
            Some(kind) => found = Some(kind),
            None => {}
        }
    }
    found
}

/// Major version of a target framework moniker.
///
/// `net8.0` -> 8, `netcoreapp3.1` -> 3, `netstandard2.0` -> 2, `net472` -> 4.
/// Unrecognized monikers give `None`.
pub fn framework_major_version(moniker: &str) -> Option<u32> {
    let moniker = moniker.trim().to_ascii_lowercase();

    let dotted = moniker
        .strip_prefix("netcoreapp")
        .or_else(|| moniker.strip_prefix("netstandard"))
        .or_else(|| moniker.strip_prefix("net").filter(|rest| rest.contains('.')));

    if let Some(version) = dotted {
        let major = version.split('.').next()?;
        // Strip platform suffixes such as `net8.0-windows`
        let major: String = major.chars().take_while(char::is_ascii_digit).collect();
        return major.parse().ok();
    }

    // .NET Framework monikers: net45, net472, net48
    let digits = moniker.strip_prefix("net")?;
    if digits.len() >= 2 && digits.len() <= 3 && digits.chars().all(|c| c.is_ascii_digit()) {
        return digits[..1].parse().ok();
    }

    None
}

/// Whether `required` can run given the installed SDK majors.
///
/// Majors below 5 are legacy frameworks and accept any modern (>= 5) SDK.
pub fn is_framework_satisfied(required: u32, installed: &BTreeSet<u32>) -> bool {
    installed.contains(&required) || (required < 5 && installed.iter().any(|major| *major >= 5))
}

/// Check every required major version against the installed SDKs.
///
/// Returns the overall result plus the unsatisfied majors in ascending order.
pub fn check_sdk_sufficiency(required: &BTreeSet<u32>, installed: &BTreeSet<u32>) -> (bool, Vec<u32>) {
    let missing: Vec<u32> = required
        .iter()
        .copied()
        .filter(|major| !is_framework_satisfied(*major, installed))
        .collect();
    (missing.is_empty(), missing)
}

/// A build descriptor classified as a test project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestProject {
    pub path: PathBuf,
    pub framework: TestFrameworkKind,
    /// Coverage collector already referenced by the project
    pub collector: Option<CollectorKind>,
    /// First declared target framework moniker
    pub target_framework: Option<String>,
}

impl TestProject {
    /// File stem of the descriptor, used to name per-project artifacts
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project")
            .to_string()
    }
}

/// One-time snapshot of what the host toolchain can do
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentReadiness {
    pub is_git_repo: bool,
    pub base_branch: Option<String>,
    pub current_branch: Option<String>,
    pub build_descriptors: Vec<PathBuf>,
    pub test_projects: Vec<TestProject>,
    pub dotnet_installed: bool,
    pub installed_sdks: BTreeSet<u32>,
    pub required_frameworks: BTreeSet<u32>,
    pub all_sdks_present: bool,
    /// Required majors with no acceptable SDK
    pub missing_frameworks: Vec<u32>,
    pub report_renderer_installed: bool,
    /// Non-blocking observations made while probing
    pub warnings: Vec<String>,
}

impl EnvironmentReadiness {
    /// Test projects that have no coverage collector wired in
    pub fn projects_without_collector(&self) -> impl Iterator<Item = &TestProject> {
        self.test_projects.iter().filter(|p| p.collector.is_none())
    }

    /// Problems that prevent the pipeline from running at all
    pub fn blocking_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.is_git_repo {
            problems.push("not inside a git repository".to_string());
        }
        if !self.dotnet_installed {
            problems.push("dotnet SDK is not installed".to_string());
        }
        if self.build_descriptors.is_empty() {
            problems.push("no .csproj files found under the project path".to_string());
        }
        problems
    }

    pub fn is_ready(&self) -> bool {
        self.blocking_problems().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn majors(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_legacy_framework_runs_on_modern_sdk() {
        let (ok, missing) = check_sdk_sufficiency(&majors(&[3]), &majors(&[6, 8]));
        assert!(ok);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_modern_framework_needs_exact_major() {
        let (ok, missing) = check_sdk_sufficiency(&majors(&[8]), &majors(&[6]));
        assert!(!ok);
        assert_eq!(missing, vec![8]);
    }

    #[test]
    fn test_legacy_framework_without_modern_sdk() {
        assert!(!is_framework_satisfied(4, &majors(&[3])));
        assert!(is_framework_satisfied(4, &majors(&[4])));
        assert!(!is_framework_satisfied(2, &BTreeSet::new()));
    }

    #[test]
    fn test_framework_monikers() {
        assert_eq!(framework_major_version("net8.0"), Some(8));
        assert_eq!(framework_major_version("net6.0-windows"), Some(6));
        assert_eq!(framework_major_version("netcoreapp3.1"), Some(3));
        assert_eq!(framework_major_version("netstandard2.0"), Some(2));
        assert_eq!(framework_major_version("net472"), Some(4));
        assert_eq!(framework_major_version("net48"), Some(4));
        assert_eq!(framework_major_version("NET10.0"), Some(10));
        assert_eq!(framework_major_version("uap10.0"), None);
        assert_eq!(framework_major_version(""), None);
    }

    #[test]
    fn test_framework_lookup() {
        assert_eq!(framework_for_package("xunit.runner.visualstudio"), Some(TestFrameworkKind::XUnit));
        assert_eq!(framework_for_package("NUnit3TestAdapter"), Some(TestFrameworkKind::NUnit));
        assert_eq!(framework_for_package("MSTest.TestFramework"), Some(TestFrameworkKind::MSTest));
        assert_eq!(framework_for_package("Microsoft.NET.Test.Sdk"), Some(TestFrameworkKind::Unknown));
        assert_eq!(framework_for_package("Newtonsoft.Json"), None);
    }

    #[test]
    fn test_detect_framework_prefers_specific_over_sdk() {
        let packages = ["Microsoft.NET.Test.Sdk", "xunit"];
        assert_eq!(detect_framework(packages), Some(TestFrameworkKind::XUnit));
        assert_eq!(detect_framework(["Microsoft.NET.Test.Sdk"]), Some(TestFrameworkKind::Unknown));
        assert_eq!(detect_framework(["Serilog"]), None);
    }

    #[test]
    fn test_detect_collector() {
        assert_eq!(detect_collector(["coverlet.collector"]), Some(CollectorKind::ResultsDirectory));
        assert_eq!(
            detect_collector(["coverlet.collector", "Coverlet.MSBuild"]),
            Some(CollectorKind::BuildIntegrated)
        );
        assert_eq!(detect_collector(["coverlet.core"]), None);
    }

    #[test]
    fn test_readiness_blocking_problems() {
        let readiness = EnvironmentReadiness::default();
        assert_eq!(readiness.blocking_problems().len(), 3);
        assert!(!readiness.is_ready());

        let readiness = EnvironmentReadiness {
            is_git_repo: true,
            dotnet_installed: true,
            build_descriptors: vec![PathBuf::from("App.csproj")],
            ..Default::default()
        };
        assert!(readiness.is_ready());
    }

    #[test]
    fn test_project_stem() {
        let project = TestProject {
            path: PathBuf::from("tests/App.Tests/App.Tests.csproj"),
            framework: TestFrameworkKind::XUnit,
            collector: None,
            target_framework: Some("net8.0".to_string()),
        };
        assert_eq!(project.stem(), "App.Tests");
    }
}
