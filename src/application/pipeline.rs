//! Pipeline - one-shot orchestration of a test-generation run
//!
//! readiness → change set → source outline → convergence loop → reports →
//! generated-tests file. Also exposes the pieces (`check`, `diff`,
//! `coverage`) on their own for the smaller commands.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChangeSet, Config, CoverageArtifacts, EnvironmentReadiness, LoopState, TerminationReason,
};
use crate::domain::ports::{CommandRunner, TextGenerator};
use crate::infrastructure::process::TokioCommandRunner;
use crate::services::{
    source_analyzer, ArtifactLayout, ConvergenceLoop, CoverageRunner, DotnetService,
    EnvironmentProber, GitService, LoopInput, LoopObserver, PassOptions, ProjectCoverageProbe,
    SourceOutline, TestGenerationInvoker,
};

/// Per-run overrides of the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub base_ref: Option<String>,
    pub target: Option<f64>,
    pub max_iterations: Option<u32>,
    pub install_tools: bool,
}

/// Extension of the source files tests are generated for
const SOURCE_EXTENSION: &str = "cs";

/// Changed lines relative to a base revision
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub project_root: PathBuf,
    pub base_ref: Option<String>,
    /// Changed C# files, in path order
    pub changed_sources: Vec<String>,
    pub change_set: ChangeSet,
}

/// One coverage pass without generation
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub project_root: PathBuf,
    pub base_ref: Option<String>,
    pub changed_files: usize,
    pub changed_lines: usize,
    pub artifacts: CoverageArtifacts,
}

/// Everything a run produced, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_file: PathBuf,
    pub project_root: PathBuf,
    pub generator: String,
    pub base_ref: Option<String>,
    pub changed_lines: usize,
    /// Changed C# files, in path order
    pub changed_sources: Vec<String>,
    pub outline: SourceOutline,
    pub readiness: EnvironmentReadiness,
    pub state: LoopState,
    pub termination: Option<TerminationReason>,
    pub artifacts: Option<CoverageArtifacts>,
    pub generated_tests_file: Option<PathBuf>,
    /// Non-fatal problems outside the loop's own error list
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn target_met(&self) -> bool {
        self.termination == Some(TerminationReason::TargetMet)
    }
}

/// Path of the file collecting every generated test body
pub fn generated_tests_file(source_file: &Path) -> PathBuf {
    let stem = source_stem(source_file);
    source_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_GeneratedTests.cs"))
}

/// Generated bodies joined with `// Generated test #n` headers
pub fn render_generated_tests(bodies: &[String]) -> String {
    bodies
        .iter()
        .enumerate()
        .map(|(index, body)| format!("// Generated test #{}\n{}\n", index + 1, body.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Changed C# files of a change set
pub fn changed_sources(change_set: &ChangeSet) -> Vec<String> {
    change_set
        .files_with_extension(SOURCE_EXTENSION)
        .cloned()
        .collect()
}

fn source_stem(source_file: &Path) -> String {
    source_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Source")
        .to_string()
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Project root for a run: explicit when it exists, else the source's directory
pub fn resolve_project_root(source_file: &Path, explicit: Option<&Path>) -> PathBuf {
    let source_dir = source_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    match explicit {
        Some(path) if path.is_dir() => absolute(path),
        Some(path) => {
            warn!(
                path = %path.display(),
                fallback = %source_dir.display(),
                "project path does not exist, using the source file's directory"
            );
            absolute(source_dir)
        }
        None => absolute(source_dir),
    }
}

pub struct Pipeline {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    git: Arc<GitService>,
    dotnet: Arc<DotnetService>,
    generator: Option<Arc<dyn TextGenerator>>,
    observer: Option<LoopObserver>,
}

impl Pipeline {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        let git = GitService::new(runner.clone(), &config.tools.git)
            .with_fetch_before_detect(config.tools.fetch_before_detect);
        let dotnet = DotnetService::new(
            runner.clone(),
            &config.tools.dotnet,
            &config.tools.reportgenerator,
        );
        Self {
            config,
            runner,
            git: Arc::new(git),
            dotnet: Arc::new(dotnet),
            generator: None,
            observer: None,
        }
    }

    /// Pipeline running real processes, with the configured timeout
    pub fn with_system_processes(config: Config) -> Self {
        let timeout = config.tools.command_timeout_secs.map(Duration::from_secs);
        let runner = TokioCommandRunner::new().with_timeout(timeout);
        Self::new(config, Arc::new(runner))
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: LoopObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn prober(&self, install_tools: bool) -> EnvironmentProber {
        EnvironmentProber::new(self.git.clone(), self.dotnet.clone()).with_install_tools(install_tools)
    }

    fn coverage_runner(&self, project_root: &Path) -> CoverageRunner {
        CoverageRunner::new(
            self.runner.clone(),
            self.dotnet.clone(),
            ArtifactLayout::new(project_root, &self.config.coverage.output_dir),
        )
    }

    /// Readiness snapshot for a project
    pub async fn check(&self, project_root: &Path, install_tools: bool) -> EnvironmentReadiness {
        self.prober(install_tools).probe(&absolute(project_root)).await
    }

    async fn change_set_against(&self, project_root: &Path, base: Option<&str>) -> ChangeSet {
        match base {
            Some(base) => self.git.change_set(project_root, base).await,
            None => {
                warn!("no base revision, coverage will not be diff-scoped");
                ChangeSet::new()
            }
        }
    }

    async fn base_or_detect(&self, project_root: &Path, explicit: Option<String>) -> Option<String> {
        match explicit {
            Some(base) => Some(base),
            None => self.git.detect_base_branch(project_root).await,
        }
    }

    /// Changed lines against `base_ref` or the detected base branch
    pub async fn diff(&self, project_root: &Path, base_ref: Option<String>) -> DomainResult<DiffReport> {
        let project_root = absolute(project_root);
        if !self.git.is_git_repo(&project_root).await {
            return Err(DomainError::EnvironmentMissing(format!(
                "{} is not inside a git repository",
                project_root.display()
            )));
        }
        let base_ref = self.base_or_detect(&project_root, base_ref).await;
        let change_set = self.change_set_against(&project_root, base_ref.as_deref()).await;
        Ok(DiffReport {
            project_root,
            base_ref,
            changed_sources: changed_sources(&change_set),
            change_set,
        })
    }

    /// One coverage pass over every test project
    #[instrument(skip(self))]
    pub async fn coverage(
        &self,
        project_root: &Path,
        base_ref: Option<String>,
        render_html: bool,
    ) -> DomainResult<CoverageReport> {
        let project_root = absolute(project_root);
        let readiness = self.prober(false).probe(&project_root).await;
        if !readiness.dotnet_installed {
            return Err(DomainError::EnvironmentMissing(
                "dotnet SDK is not installed".to_string(),
            ));
        }
        if readiness.test_projects.is_empty() {
            return Err(DomainError::EnvironmentMissing(format!(
                "no test projects under {}",
                project_root.display()
            )));
        }

        let base_ref = match base_ref {
            Some(base) => Some(base),
            None => readiness.base_branch.clone(),
        };
        let change_set = self.change_set_against(&project_root, base_ref.as_deref()).await;

        let options = PassOptions {
            render_html: render_html && readiness.report_renderer_installed,
            title: self.config.coverage.report_title.clone(),
        };
        let artifacts = self
            .coverage_runner(&project_root)
            .run_pass(&readiness.test_projects, &change_set, &options)
            .await;

        Ok(CoverageReport {
            project_root,
            base_ref,
            changed_files: change_set.file_count(),
            changed_lines: change_set.total_lines(),
            artifacts,
        })
    }

    /// The full run.
    ///
    /// Fails only when the environment is unusable, the source cannot be read,
    /// or the run is interrupted; everything else is reported in the result.
    #[instrument(skip(self, options), fields(source = %source_file.display()))]
    pub async fn run(
        &self,
        source_file: &Path,
        project_path: Option<&Path>,
        options: RunOptions,
    ) -> DomainResult<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let generator = self.generator.clone().ok_or_else(|| {
            DomainError::Configuration("no text generator configured".to_string())
        })?;

        if !source_file.is_file() {
            return Err(DomainError::FileNotFound(source_file.to_path_buf()));
        }
        let source_file = absolute(source_file);
        let source_code = std::fs::read_to_string(&source_file)?;
        let project_root = resolve_project_root(&source_file, project_path);
        info!(%run_id, project = %project_root.display(), "starting run");

        let readiness = self.prober(options.install_tools).probe(&project_root).await;
        let mut problems = readiness.blocking_problems();
        if readiness.test_projects.is_empty() {
            problems.push("no test projects found".to_string());
        }
        if !problems.is_empty() {
            return Err(DomainError::EnvironmentMissing(problems.join("; ")));
        }
        let mut warnings = readiness.warnings.clone();

        let base_ref = options.base_ref.clone().or_else(|| readiness.base_branch.clone());
        let change_set = self.change_set_against(&project_root, base_ref.as_deref()).await;
        let changed_sources = changed_sources(&change_set);
        if change_set.is_empty() {
            warnings.push("empty change set, coverage is measured over the whole project".to_string());
        } else if changed_sources.is_empty() {
            warnings.push("no C# file changed, the diff-scoped report will be empty".to_string());
        }

        let outline = source_analyzer::analyze(&source_code);
        let outline_text = outline.describe();
        let stem = source_stem(&source_file);

        let coverage = Arc::new(self.coverage_runner(&project_root));
        let probe = Arc::new(ProjectCoverageProbe::new(
            coverage.clone(),
            readiness.test_projects.clone(),
            change_set.clone(),
            stem,
        ));

        let invoker = TestGenerationInvoker::new(generator.clone());
        let mut convergence = ConvergenceLoop::new(invoker, probe.clone());
        if let Some(observer) = &self.observer {
            convergence = convergence.with_observer(observer.clone());
        }

        let input = LoopInput {
            source_code: &source_code,
            outline: &outline_text,
            target: options.target.unwrap_or(self.config.coverage.target_percentage),
            max_iterations: options
                .max_iterations
                .unwrap_or(self.config.coverage.max_iterations),
        };
        let state = convergence.run(&input).await?;

        let mut artifacts = probe.last_artifacts();
        if let Some(artifacts) = artifacts.as_mut() {
            if self.config.coverage.render_html && readiness.report_renderer_installed {
                coverage
                    .render_reports(artifacts, &self.config.coverage.report_title)
                    .await;
            }
            warnings.extend(artifacts.warnings.iter().cloned());
        }

        let generated_tests_file = if state.generated_tests.is_empty() {
            None
        } else {
            let path = generated_tests_file(&source_file);
            match std::fs::write(&path, render_generated_tests(&state.generated_tests)) {
                Ok(()) => {
                    info!(path = %path.display(), tests = state.generated_tests.len(), "wrote generated tests");
                    Some(path)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot write generated tests");
                    warnings.push(format!("cannot write {}: {e}", path.display()));
                    None
                }
            }
        };

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            source_file,
            project_root,
            generator: generator.name(),
            base_ref,
            changed_lines: change_set.total_lines(),
            changed_sources,
            outline,
            readiness,
            termination: state.termination_reason(),
            state,
            artifacts,
            generated_tests_file,
            warnings,
        })
    }
}
