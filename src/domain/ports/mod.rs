//! Port trait definitions (Hexagonal Architecture)
//!
//! - CommandRunner: external processes (git, dotnet, reportgenerator)
//! - TextGenerator: the language model behind test generation
//! - CoverageProbe: one coverage measurement for the convergence loop

pub mod command_runner;
pub mod coverage_probe;
pub mod text_generator;

pub use command_runner::{CommandOutput, CommandRunner, CommandSpec};
pub use coverage_probe::CoverageProbe;
pub use text_generator::{Prompt, TextGenerator};
