//! Coverage Runner
//!
//! Executes test projects under coverage, merges the per-project reports,
//! filters the merged report by the change set and renders HTML. Every step
//! degrades to `None`/`false` with a warning; none of them aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::domain::models::{ChangeSet, CollectorKind, CoverageArtifacts, TestProject};
use crate::domain::ports::{CommandRunner, CommandSpec};
use crate::services::cobertura;
use crate::services::dotnet_service::DotnetService;

const RAW_REPORT_NAME: &str = "coverage.cobertura.xml";
const MERGED_OUTPUT_NAME: &str = "Cobertura.xml";
const HTML_ENTRY_POINT: &str = "index.html";
const COLLECTOR_DATA_SOURCE: &str = "XPlat Code Coverage";
const COLLECTOR_FORMAT_SETTING: &str =
    "DataCollectionRunSettings.DataCollectors.DataCollector.Configuration.Format=cobertura";

/// File-system layout of the coverage output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(project_root: &Path, output_dir: &str) -> Self {
        Self {
            root: project_root.join(output_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_report(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}_coverage.cobertura.xml"))
    }

    /// Results directory handed to the collector
    pub fn raw_dir(&self, stem: &str) -> PathBuf {
        self.root.join("raw").join(stem)
    }

    pub fn merged_report(&self) -> PathBuf {
        self.root.join("coverage.merged.cobertura.xml")
    }

    pub fn filtered_report(&self) -> PathBuf {
        self.root.join("coverage.diff.cobertura.xml")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }

    pub fn diff_html_dir(&self) -> PathBuf {
        self.root.join("html-diff")
    }

    fn merge_staging_dir(&self) -> PathBuf {
        self.root.join(".merge")
    }
}

/// Options for one full coverage pass
#[derive(Debug, Clone)]
pub struct PassOptions {
    pub render_html: bool,
    pub title: String,
}

/// Rename, falling back to copy + remove across file systems
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

/// Most recently modified file named `name` under `dir`
fn newest_file_named(dir: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .max_by_key(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
        .map(walkdir::DirEntry::into_path)
}

pub struct CoverageRunner {
    runner: Arc<dyn CommandRunner>,
    dotnet: Arc<DotnetService>,
    layout: ArtifactLayout,
}

impl CoverageRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, dotnet: Arc<DotnetService>, layout: ArtifactLayout) -> Self {
        Self {
            runner,
            dotnet,
            layout,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    fn test_command(&self, project: &TestProject, strategy: CollectorKind) -> CommandSpec {
        let stem = project.stem();
        let base = CommandSpec::new(self.dotnet.dotnet())
            .arg("test")
            .arg(project.path.to_string_lossy())
            .arg("--no-build");

        let command = match strategy {
            CollectorKind::ResultsDirectory => base
                .args(["--collect", COLLECTOR_DATA_SOURCE, "--results-directory"])
                .arg(self.layout.raw_dir(&stem).to_string_lossy())
                .args(["--", COLLECTOR_FORMAT_SETTING]),
            CollectorKind::BuildIntegrated => base
                .args(["/p:CollectCoverage=true", "/p:CoverletOutputFormat=cobertura"])
                .arg(format!(
                    "/p:CoverletOutput={}",
                    self.layout.project_report(&stem).display()
                )),
        };

        match project.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => command.current_dir(dir),
            None => command,
        }
    }

    /// Build and test one project under coverage.
    ///
    /// Failing tests still yield a report; a failed build, a test command that
    /// cannot run, or a missing artifact yield `None`.
    #[instrument(skip(self, project), fields(project = %project.path.display()))]
    pub async fn execute(&self, project: &TestProject) -> Option<PathBuf> {
        let stem = project.stem();
        let artifact = self.layout.project_report(&stem);
        if let Err(e) = std::fs::create_dir_all(self.layout.root()) {
            warn!(path = %self.layout.root().display(), error = %e, "cannot create coverage directory");
            return None;
        }

        match self.dotnet.build(&project.path).await {
            Ok(output) if output.is_success() => debug!("build succeeded"),
            Ok(output) => {
                warn!(exit_code = ?output.exit_code, stderr = %truncate(&output.stderr, 500), "build failed");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "build could not run");
                return None;
            }
        }

        // A report left by an earlier run must not pass for this one
        if artifact.exists() {
            if let Err(e) = std::fs::remove_file(&artifact) {
                warn!(path = %artifact.display(), error = %e, "cannot remove previous coverage report");
                return None;
            }
        }

        let strategy = project.collector.unwrap_or(CollectorKind::ResultsDirectory);
        let raw_dir = self.layout.raw_dir(&stem);
        if strategy == CollectorKind::ResultsDirectory && raw_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&raw_dir) {
                debug!(path = %raw_dir.display(), error = %e, "could not clear stale raw results");
            }
        }

        match self.runner.run(&self.test_command(project, strategy)).await {
            Ok(output) if output.is_success() => debug!("tests passed"),
            Ok(output) => warn!(
                exit_code = ?output.exit_code,
                "test run reported failures, collecting coverage anyway"
            ),
            Err(e) => {
                warn!(error = %e, "test run could not start");
                return None;
            }
        }

        match strategy {
            CollectorKind::ResultsDirectory => {
                let Some(produced) = newest_file_named(&raw_dir, RAW_REPORT_NAME) else {
                    warn!(path = %raw_dir.display(), "collector produced no coverage report");
                    return None;
                };
                if let Err(e) = move_file(&produced, &artifact) {
                    warn!(from = %produced.display(), error = %e, "cannot move coverage report");
                    return None;
                }
            }
            CollectorKind::BuildIntegrated => {
                if !artifact.is_file() {
                    warn!(path = %artifact.display(), "coverage report was not written");
                    return None;
                }
            }
        }

        info!(strategy = strategy.as_str(), artifact = %artifact.display(), "collected coverage");
        Some(artifact)
    }

    /// Merge reports into `output`.
    ///
    /// One report is copied as-is; several go through the report tool.
    #[instrument(skip(self, reports), fields(reports = reports.len()))]
    pub async fn merge(&self, reports: &[PathBuf], output: &Path) -> bool {
        match reports {
            [] => {
                warn!("no coverage reports to merge");
                false
            }
            [single] => match std::fs::copy(single, output) {
                Ok(_) => {
                    debug!(from = %single.display(), "single report copied as merged report");
                    true
                }
                Err(e) => {
                    warn!(from = %single.display(), error = %e, "cannot copy coverage report");
                    false
                }
            },
            many => self.merge_with_tool(many, output).await,
        }
    }

    async fn merge_with_tool(&self, reports: &[PathBuf], output: &Path) -> bool {
        let staging = self.layout.merge_staging_dir();
        let joined = reports
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(";");
        let command = CommandSpec::new(self.dotnet.reportgenerator())
            .arg(format!("-reports:{joined}"))
            .arg(format!("-targetdir:{}", staging.display()))
            .arg("-reporttypes:Cobertura");

        let merged = match self.runner.run(&command).await {
            Ok(result) if result.is_success() => {
                let produced = staging.join(MERGED_OUTPUT_NAME);
                if produced.is_file() {
                    match move_file(&produced, output) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(error = %e, "cannot move merged report");
                            false
                        }
                    }
                } else {
                    warn!(path = %produced.display(), "merge tool wrote no report");
                    false
                }
            }
            Ok(result) => {
                warn!(exit_code = ?result.exit_code, stderr = %truncate(&result.stderr, 500), "merge failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "merge tool unavailable");
                false
            }
        };

        if staging.exists() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        if merged {
            info!(path = %output.display(), "merged coverage reports");
        }
        merged
    }

    /// Render an HTML report; true only when the entry point exists afterwards
    #[instrument(skip(self))]
    pub async fn render_html(&self, report: &Path, output_dir: &Path, title: &str) -> bool {
        if !report.is_file() {
            warn!(path = %report.display(), "no report to render");
            return false;
        }
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            warn!(path = %output_dir.display(), error = %e, "cannot create HTML directory");
            return false;
        }

        let command = CommandSpec::new(self.dotnet.reportgenerator())
            .arg(format!("-reports:{}", report.display()))
            .arg(format!("-targetdir:{}", output_dir.display()))
            .arg("-reporttypes:Html")
            .arg(format!("-title:{title}"));

        match self.runner.run(&command).await {
            Ok(result) if result.is_success() => {
                let entry = output_dir.join(HTML_ENTRY_POINT);
                if entry.is_file() {
                    info!(path = %entry.display(), "rendered HTML report");
                    true
                } else {
                    warn!(path = %entry.display(), "renderer wrote no entry point");
                    false
                }
            }
            Ok(result) => {
                warn!(exit_code = ?result.exit_code, stderr = %truncate(&result.stderr, 500), "rendering failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "renderer unavailable");
                false
            }
        }
    }

    /// Execute, merge, filter and summarize; rendering when asked.
    ///
    /// Projects run one after another.
    pub async fn run_pass(
        &self,
        projects: &[TestProject],
        change_set: &ChangeSet,
        options: &PassOptions,
    ) -> CoverageArtifacts {
        let mut artifacts = CoverageArtifacts::default();

        for project in projects {
            match self.execute(project).await {
                Some(report) => artifacts.project_reports.push(report),
                None => artifacts
                    .warnings
                    .push(format!("no coverage from {}", project.path.display())),
            }
        }
        if artifacts.project_reports.is_empty() {
            artifacts
                .warnings
                .push("no test project produced coverage".to_string());
            return artifacts;
        }

        let merged = self.layout.merged_report();
        if !self.merge(&artifacts.project_reports, &merged).await {
            artifacts
                .warnings
                .push("coverage reports could not be merged".to_string());
            return artifacts;
        }
        artifacts.merged_summary = cobertura::summarize_file(&merged);
        if artifacts.merged_summary.is_none() {
            artifacts
                .warnings
                .push(format!("could not summarize {}", merged.display()));
        }
        artifacts.merged_report = Some(merged.clone());

        if change_set.is_empty() {
            artifacts
                .warnings
                .push("empty change set, coverage is not diff-scoped".to_string());
        } else if let Some(outcome) = cobertura::filter_file(&merged, change_set, &self.layout.filtered_report()) {
            artifacts.filtered_summary = cobertura::summarize_file(&outcome.path);
            artifacts.lines_retained = Some(outcome.lines_retained);
            if outcome.lines_retained == 0 {
                artifacts
                    .warnings
                    .push("no changed line is covered by any report".to_string());
            }
            artifacts.filtered_report = Some(outcome.path);
        } else {
            artifacts
                .warnings
                .push("coverage could not be filtered by the change set".to_string());
        }

        if options.render_html {
            self.render_reports(&mut artifacts, &options.title).await;
        }

        artifacts
    }

    /// Render the merged and the diff-scoped report, whichever exist
    pub async fn render_reports(&self, artifacts: &mut CoverageArtifacts, title: &str) {
        if let Some(merged) = artifacts.merged_report.clone() {
            let html = self.layout.html_dir();
            if self.render_html(&merged, &html, title).await {
                artifacts.html_report = Some(html.join(HTML_ENTRY_POINT));
            } else {
                artifacts.warnings.push("HTML report was not rendered".to_string());
            }
        }

        if let Some(filtered) = artifacts.filtered_report.clone() {
            let html = self.layout.diff_html_dir();
            let title = format!("{title} (changed lines)");
            if self.render_html(&filtered, &html, &title).await {
                artifacts.diff_html_report = Some(html.join(HTML_ENTRY_POINT));
            } else {
                artifacts
                    .warnings
                    .push("diff HTML report was not rendered".to_string());
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_string(),
    }
}
