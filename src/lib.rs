//! covergen - coverage-driven unit-test generation
//!
//! covergen asks a language model for unit tests of a C# source file, measures
//! the coverage those tests reach on the lines changed against a base revision,
//! and feeds the result back until a coverage target is met or the iteration
//! budget runs out.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, the loop state machine and port traits
//! - **Application Layer** (`application`): the end-to-end pipeline
//! - **Service Layer** (`services`): probing, coverage passes, report filtering
//!   and the convergence loop
//! - **Infrastructure Layer** (`infrastructure`): processes, provider clients,
//!   configuration, logging, XML
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use covergen::application::{Pipeline, RunOptions};
//! use covergen::infrastructure::llm::LlmClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = covergen::ConfigLoader::load()?;
//!     let client = LlmClient::from_config(&config.llm, &config.retry)?;
//!     let report = Pipeline::with_system_processes(config)
//!         .with_generator(std::sync::Arc::new(client))
//!         .run("src/Calculator.cs".as_ref(), None, RunOptions::default())
//!         .await?;
//!     println!("{:.2}%", report.state.coverage);
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{CoverageReport, DiffReport, Pipeline, RunOptions, RunReport};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ChangeSet, Config, CoverageSummary, EnvironmentReadiness, LoopState, TerminationReason,
};
pub use domain::ports::{CommandRunner, CoverageProbe, TextGenerator};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConvergenceLoop, TestGenerationInvoker};
