//! Dotnet Service
//!
//! Build-descriptor discovery and parsing, SDK probes and the optional tool
//! installation commands.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::errors::DomainResult;
use crate::domain::models::environment::{detect_collector, detect_framework};
use crate::domain::models::{CollectorKind, TestFrameworkKind, TestProject};
use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec};
use crate::infrastructure::xml::{self, XmlError};

const DESCRIPTOR_EXTENSION: &str = "csproj";
const SKIPPED_DIRS: [&str; 2] = ["bin", "obj"];
const REPORT_RENDERER_TOOL: &str = "dotnet-reportgenerator-globaltool";

/// The parts of a `.csproj` the pipeline cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub path: PathBuf,
    pub packages: Vec<String>,
    /// Declared target frameworks, in order
    pub target_frameworks: Vec<String>,
}

impl ProjectDescriptor {
    /// Parse descriptor XML
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self, XmlError> {
        let root = xml::parse(content)?;

        let packages = root
            .descendants("PackageReference")
            .into_iter()
            .filter_map(|package| {
                package
                    .attr_ignore_case("Include")
                    .or_else(|| package.attr_ignore_case("Update"))
            })
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        let target_frameworks = root
            .descendants("TargetFramework")
            .into_iter()
            .chain(root.descendants("TargetFrameworks"))
            .filter_map(|element| element.text_trimmed())
            .flat_map(|text| text.split(';'))
            .map(str::trim)
            .filter(|moniker| !moniker.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            path: path.into(),
            packages,
            target_frameworks,
        })
    }

    /// First declared target framework
    pub fn target_framework(&self) -> Option<&str> {
        self.target_frameworks.first().map(String::as_str)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    }

    /// A test project by name (`*test*`) or by a test-framework package.
    ///
    /// Returns the framework, `Unknown` for name-only matches.
    pub fn test_framework(&self) -> Option<TestFrameworkKind> {
        let by_package = detect_framework(self.packages.iter().map(String::as_str));
        if by_package.is_some() {
            return by_package;
        }
        self.file_name()
            .to_lowercase()
            .contains("test")
            .then_some(TestFrameworkKind::Unknown)
    }

    pub fn collector(&self) -> Option<CollectorKind> {
        detect_collector(self.packages.iter().map(String::as_str))
    }

    /// Classify as a test project, `None` for production projects
    pub fn as_test_project(&self) -> Option<TestProject> {
        self.test_framework().map(|framework| TestProject {
            path: self.path.clone(),
            framework,
            collector: self.collector(),
            target_framework: self.target_framework().map(str::to_string),
        })
    }
}

/// Find every `.csproj` under `root`, skipping hidden, `bin` and `obj` directories
pub fn discover_descriptors(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(DESCRIPTOR_EXTENSION))
        })
        .collect();
    found.sort();
    found
}

/// Read and parse a descriptor; unreadable or malformed files give `None` and a warning
pub fn read_descriptor(path: &Path) -> Option<ProjectDescriptor> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read project file");
            return None;
        }
    };
    match ProjectDescriptor::parse(path, &content) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed project file");
            None
        }
    }
}

/// Parse `dotnet --list-sdks` output into SDK major versions
pub fn parse_sdk_majors(list_sdks: &str) -> BTreeSet<u32> {
    list_sdks
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|version| version.split('.').next())
        .filter_map(|major| major.parse().ok())
        .collect()
}

pub struct DotnetService {
    runner: Arc<dyn CommandRunner>,
    dotnet: String,
    reportgenerator: String,
}

impl DotnetService {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        dotnet: impl Into<String>,
        reportgenerator: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            dotnet: dotnet.into(),
            reportgenerator: reportgenerator.into(),
        }
    }

    pub fn dotnet(&self) -> &str {
        &self.dotnet
    }

    pub fn reportgenerator(&self) -> &str {
        &self.reportgenerator
    }

    pub async fn is_installed(&self) -> bool {
        self.runner
            .run(&CommandSpec::new(&self.dotnet).arg("--version"))
            .await
            .is_ok_and(|output| output.is_success())
    }

    /// Installed SDK major versions; empty when the probe fails
    pub async fn installed_sdk_majors(&self) -> BTreeSet<u32> {
        match self
            .runner
            .run(&CommandSpec::new(&self.dotnet).arg("--list-sdks"))
            .await
        {
            Ok(output) if output.is_success() => parse_sdk_majors(&output.stdout),
            Ok(output) => {
                warn!(stderr = %output.stderr.trim(), "dotnet --list-sdks failed");
                BTreeSet::new()
            }
            Err(e) => {
                debug!(error = %e, "dotnet unavailable");
                BTreeSet::new()
            }
        }
    }

    /// Whether the report renderer can be started at all
    pub async fn is_report_renderer_installed(&self) -> bool {
        self.runner
            .run(&CommandSpec::new(&self.reportgenerator).arg("-help"))
            .await
            .is_ok()
    }

    /// `dotnet build <project>`
    pub async fn build(&self, project: &Path) -> DomainResult<CommandOutput> {
        let command = CommandSpec::new(&self.dotnet)
            .arg("build")
            .arg(project.to_string_lossy())
            .args(["--nologo", "-v", "q"]);
        self.runner.run(&with_parent_dir(command, project)).await
    }

    /// Install the report renderer as a global tool
    pub async fn install_report_renderer(&self) -> bool {
        info!("installing report renderer");
        let command = CommandSpec::new(&self.dotnet).args([
            "tool",
            "install",
            "--global",
            REPORT_RENDERER_TOOL,
        ]);
        match self.runner.run(&command).await {
            Ok(output) if output.is_success() => true,
            Ok(output) => {
                warn!(stderr = %output.stderr.trim(), "report renderer installation failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "report renderer installation failed");
                false
            }
        }
    }

    /// Add the results-directory collector package to a test project
    pub async fn add_collector(&self, project: &Path) -> bool {
        info!(project = %project.display(), "adding coverage collector package");
        let command = CommandSpec::new(&self.dotnet)
            .arg("add")
            .arg(project.to_string_lossy())
            .args(["package", CollectorKind::ResultsDirectory.package_name()]);
        match self.runner.run(&with_parent_dir(command, project)).await {
            Ok(output) if output.is_success() => true,
            Ok(output) => {
                warn!(project = %project.display(), stderr = %output.stderr.trim(), "adding collector failed");
                false
            }
            Err(e) => {
                warn!(project = %project.display(), error = %e, "adding collector failed");
                false
            }
        }
    }
}

fn with_parent_dir(command: CommandSpec, project: &Path) -> CommandSpec {
    match project.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => command.current_dir(dir),
        None => command,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::process::ScriptedCommandRunner;
    use std::fs;

    const TEST_PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFrameworks>net8.0;net6.0</TargetFrameworks>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="Microsoft.NET.Test.Sdk" Version="17.8.0" />
    <PackageReference Include="NUnit" Version="3.14.0" />
    <PackageReference Include="coverlet.collector" Version="6.0.0" />
  </ItemGroup>
</Project>"#;

    const APP_PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>netcoreapp3.1</TargetFramework>
  </PropertyGroup>
</Project>"#;

    #[test]
    fn test_parse_test_project() {
        let descriptor = ProjectDescriptor::parse("Calc.Specs.csproj", TEST_PROJECT).unwrap();
        assert_eq!(descriptor.target_framework(), Some("net8.0"));
        assert_eq!(descriptor.target_frameworks, vec!["net8.0", "net6.0"]);

        let project = descriptor.as_test_project().unwrap();
        assert_eq!(project.framework, TestFrameworkKind::NUnit);
        assert_eq!(project.collector, Some(CollectorKind::ResultsDirectory));
    }

    #[test]
    fn test_name_only_test_project() {
        let descriptor = ProjectDescriptor::parse("src/Calc.Tests.csproj", APP_PROJECT).unwrap();
        let project = descriptor.as_test_project().unwrap();
        assert_eq!(project.framework, TestFrameworkKind::Unknown);
        assert_eq!(project.collector, None);
        assert_eq!(project.target_framework.as_deref(), Some("netcoreapp3.1"));
    }

    #[test]
    fn test_production_project_is_not_a_test_project() {
        let descriptor = ProjectDescriptor::parse("src/Calc.csproj", APP_PROJECT).unwrap();
        assert!(descriptor.as_test_project().is_none());
    }

    #[test]
    fn test_malformed_descriptor() {
        assert!(ProjectDescriptor::parse("x.csproj", "<Project>").is_err());
    }

    #[test]
    fn test_parse_sdk_majors() {
        let output = "6.0.420 [/usr/share/dotnet/sdk]\n8.0.100 [/usr/share/dotnet/sdk]\n8.0.204 [/usr/share/dotnet/sdk]\n\n";
        let majors = parse_sdk_majors(output);
        assert_eq!(majors.into_iter().collect::<Vec<_>>(), vec![6, 8]);
        assert!(parse_sdk_majors("").is_empty());
    }

    #[test]
    fn test_discover_skips_build_output_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for path in [
            "src/App/App.csproj",
            "tests/App.Tests/App.Tests.csproj",
            "tests/App.Tests/bin/Debug/Copy.csproj",
            "tests/App.Tests/obj/Stale.csproj",
            ".git/Hidden.csproj",
            "README.md",
        ] {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, APP_PROJECT).unwrap();
        }

        let found = discover_descriptors(root);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["App.csproj", "App.Tests.csproj"]);
    }

    #[tokio::test]
    async fn test_sdk_probe_degrades() {
        let runner = ScriptedCommandRunner::new();
        let service = DotnetService::new(Arc::new(runner.clone()), "dotnet", "reportgenerator");
        assert!(!service.is_installed().await);
        assert!(service.installed_sdk_majors().await.is_empty());
        assert!(!service.is_report_renderer_installed().await);

        runner.fail("dotnet", &["--list-sdks"], 1);
        assert!(service.installed_sdk_majors().await.is_empty());
    }

    #[tokio::test]
    async fn test_renderer_installed_when_it_starts() {
        let runner = ScriptedCommandRunner::new();
        runner.fail("reportgenerator", &[], 1);
        let service = DotnetService::new(Arc::new(runner), "dotnet", "reportgenerator");
        assert!(service.is_report_renderer_installed().await);
    }

    #[tokio::test]
    async fn test_add_collector_command() {
        let runner = ScriptedCommandRunner::new();
        runner.ok("dotnet", &["add"], "");
        let service = DotnetService::new(Arc::new(runner.clone()), "dotnet", "reportgenerator");

        assert!(service.add_collector(Path::new("tests/T/T.csproj")).await);
        let call = &runner.calls()[0];
        assert_eq!(call.args, vec!["add", "tests/T/T.csproj", "package", "coverlet.collector"]);
        assert_eq!(call.working_dir.as_deref(), Some(Path::new("tests/T")));
    }
}
