//! Environment Prober
//!
//! Builds the one-time [`EnvironmentReadiness`] snapshot. Nothing is mutated
//! unless tool installation is explicitly requested.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::models::environment::{check_sdk_sufficiency, framework_major_version};
use crate::domain::models::{CollectorKind, EnvironmentReadiness};
use crate::services::dotnet_service::{discover_descriptors, read_descriptor, DotnetService};
use crate::services::git_service::GitService;

pub struct EnvironmentProber {
    git: Arc<GitService>,
    dotnet: Arc<DotnetService>,
    install_tools: bool,
}

impl EnvironmentProber {
    pub fn new(git: Arc<GitService>, dotnet: Arc<DotnetService>) -> Self {
        Self {
            git,
            dotnet,
            install_tools: false,
        }
    }

    /// Install the report renderer and missing collectors while probing
    #[must_use]
    pub fn with_install_tools(mut self, enabled: bool) -> Self {
        self.install_tools = enabled;
        self
    }

    #[instrument(skip(self), fields(project = %project_root.display()))]
    pub async fn probe(&self, project_root: &Path) -> EnvironmentReadiness {
        let mut readiness = EnvironmentReadiness {
            is_git_repo: self.git.is_git_repo(project_root).await,
            ..Default::default()
        };

        if readiness.is_git_repo {
            readiness.current_branch = self.git.current_branch(project_root).await;
            readiness.base_branch = self.git.detect_base_branch(project_root).await;
            if readiness.base_branch.is_none() {
                readiness
                    .warnings
                    .push("no base branch found (tried origin/main, origin/master, main, master)".to_string());
            }
        }

        readiness.build_descriptors = discover_descriptors(project_root);
        let mut required = BTreeSet::new();
        for path in &readiness.build_descriptors {
            let Some(descriptor) = read_descriptor(path) else {
                readiness
                    .warnings
                    .push(format!("could not parse {}", path.display()));
                continue;
            };

            if let Some(moniker) = descriptor.target_framework() {
                match framework_major_version(moniker) {
                    Some(major) => {
                        required.insert(major);
                    }
                    None => {
                        warn!(path = %path.display(), moniker, "unrecognized target framework");
                        readiness.warnings.push(format!(
                            "unrecognized target framework '{moniker}' in {}",
                            path.display()
                        ));
                    }
                }
            }

            if let Some(project) = descriptor.as_test_project() {
                readiness.test_projects.push(project);
            }
        }
        readiness.required_frameworks = required;

        readiness.dotnet_installed = self.dotnet.is_installed().await;
        if readiness.dotnet_installed {
            readiness.installed_sdks = self.dotnet.installed_sdk_majors().await;
        }
        let (all_present, missing) =
            check_sdk_sufficiency(&readiness.required_frameworks, &readiness.installed_sdks);
        readiness.all_sdks_present = all_present;
        readiness.missing_frameworks = missing;
        if !all_present {
            let majors: Vec<String> = readiness
                .missing_frameworks
                .iter()
                .map(|m| format!("{m}.x"))
                .collect();
            readiness
                .warnings
                .push(format!("missing .NET SDKs: {}", majors.join(", ")));
        }

        readiness.report_renderer_installed = self.dotnet.is_report_renderer_installed().await;

        if self.install_tools {
            self.install_missing(&mut readiness).await;
        }

        if readiness.test_projects.is_empty() {
            readiness
                .warnings
                .push("no test projects found".to_string());
        }
        if !readiness.report_renderer_installed {
            readiness
                .warnings
                .push("reportgenerator is not installed; reports cannot be merged or rendered".to_string());
        }
        let lacking: Vec<String> = readiness
            .projects_without_collector()
            .map(|project| format!("{} has no coverage collector", project.path.display()))
            .collect();
        for warning in &lacking {
            warn!("{warning}");
        }
        readiness.warnings.extend(lacking);

        info!(
            git = readiness.is_git_repo,
            dotnet = readiness.dotnet_installed,
            descriptors = readiness.build_descriptors.len(),
            test_projects = readiness.test_projects.len(),
            ready = readiness.is_ready(),
            "environment probed"
        );
        readiness
    }

    async fn install_missing(&self, readiness: &mut EnvironmentReadiness) {
        if !readiness.dotnet_installed {
            return;
        }

        if !readiness.report_renderer_installed && self.dotnet.install_report_renderer().await {
            readiness.report_renderer_installed = self.dotnet.is_report_renderer_installed().await;
        }

        let mut installed = Vec::new();
        for (index, project) in readiness.test_projects.iter().enumerate() {
            if project.collector.is_none() && self.dotnet.add_collector(&project.path).await {
                installed.push(index);
            }
        }
        for index in installed {
            if let Some(project) = readiness.test_projects.get_mut(index) {
                project.collector = Some(CollectorKind::ResultsDirectory);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TestFrameworkKind;
    use crate::infrastructure::process::ScriptedCommandRunner;
    use std::fs;

    const XUNIT_TESTS: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup><TargetFramework>net8.0</TargetFramework></PropertyGroup>
  <ItemGroup>
    <PackageReference Include="xunit" Version="2.6.1" />
  </ItemGroup>
</Project>"#;

    const LEGACY_APP: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup><TargetFramework>netcoreapp3.1</TargetFramework></PropertyGroup>
</Project>"#;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/App")).unwrap();
        fs::create_dir_all(dir.path().join("tests/App.Tests")).unwrap();
        fs::write(dir.path().join("src/App/App.csproj"), LEGACY_APP).unwrap();
        fs::write(dir.path().join("tests/App.Tests/App.Tests.csproj"), XUNIT_TESTS).unwrap();
        dir
    }

    fn prober(runner: &ScriptedCommandRunner) -> EnvironmentProber {
        let runner: Arc<ScriptedCommandRunner> = Arc::new(runner.clone());
        EnvironmentProber::new(
            Arc::new(GitService::new(runner.clone(), "git")),
            Arc::new(DotnetService::new(runner, "dotnet", "reportgenerator")),
        )
    }

    fn healthy_toolchain() -> ScriptedCommandRunner {
        let runner = ScriptedCommandRunner::new();
        runner
            .ok("git", &["rev-parse", "--is-inside-work-tree"], "true\n")
            .ok("git", &["rev-parse", "--abbrev-ref", "HEAD"], "feature\n")
            .fail("git", &["rev-parse", "--verify"], 1)
            .ok("git", &["rev-parse", "--verify", "--quiet", "main"], "abc\n")
            .ok("dotnet", &["--version"], "8.0.100\n")
            .ok("dotnet", &["--list-sdks"], "6.0.400 [/sdk]\n8.0.100 [/sdk]\n")
            .ok("reportgenerator", &[], "");
        runner
    }

    #[tokio::test]
    async fn test_ready_environment() {
        let dir = workspace();
        let runner = healthy_toolchain();

        let readiness = prober(&runner).probe(dir.path()).await;
        assert!(readiness.is_ready());
        assert_eq!(readiness.base_branch.as_deref(), Some("main"));
        assert_eq!(readiness.current_branch.as_deref(), Some("feature"));
        assert_eq!(readiness.build_descriptors.len(), 2);
        assert_eq!(readiness.test_projects.len(), 1);
        assert_eq!(readiness.test_projects[0].framework, TestFrameworkKind::XUnit);
        assert_eq!(readiness.required_frameworks.iter().copied().collect::<Vec<_>>(), vec![3, 8]);
        assert!(readiness.all_sdks_present);
        assert!(readiness.report_renderer_installed);
        // No collector and no install requested: nothing is mutated
        assert!(runner.calls_matching("dotnet", &["add"]).is_empty());
        assert_eq!(
            readiness
                .warnings
                .iter()
                .filter(|w| w.ends_with("App.Tests.csproj has no coverage collector"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_toolchain_degrades() {
        let dir = workspace();
        let runner = ScriptedCommandRunner::new();

        let readiness = prober(&runner).probe(dir.path()).await;
        assert!(!readiness.is_git_repo);
        assert!(!readiness.dotnet_installed);
        assert!(!readiness.all_sdks_present);
        assert_eq!(readiness.missing_frameworks, vec![3, 8]);
        assert_eq!(readiness.blocking_problems().len(), 2);
    }

    #[tokio::test]
    async fn test_install_tools_adds_collector() {
        let dir = workspace();
        let runner = healthy_toolchain();
        runner.ok("dotnet", &["add"], "");

        let readiness = prober(&runner)
            .with_install_tools(true)
            .probe(dir.path())
            .await;
        assert_eq!(
            readiness.test_projects[0].collector,
            Some(CollectorKind::ResultsDirectory)
        );
        assert_eq!(runner.calls_matching("dotnet", &["add"]).len(), 1);
        assert!(!readiness.warnings.iter().any(|w| w.contains("no coverage collector")));
        // Renderer already present
        assert!(runner.calls_matching("dotnet", &["tool"]).is_empty());
    }
}
