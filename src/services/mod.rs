//! Service layer
//!
//! Probes, transforms and the convergence loop, built on the domain ports.

pub mod cobertura;
pub mod convergence_loop;
pub mod coverage_probe;
pub mod coverage_runner;
pub mod dotnet_service;
pub mod environment_prober;
pub mod git_service;
pub mod source_analyzer;
pub mod test_generation;
pub mod test_validator;

pub use convergence_loop::{ConvergenceLoop, LoopInput, LoopObserver};
pub use coverage_probe::{ProjectCoverageProbe, ScriptedCoverageProbe};
pub use coverage_runner::{ArtifactLayout, CoverageRunner, PassOptions};
pub use dotnet_service::{DotnetService, ProjectDescriptor};
pub use environment_prober::EnvironmentProber;
pub use git_service::GitService;
pub use source_analyzer::SourceOutline;
pub use test_generation::{GenerationRequest, TestGenerationInvoker};
