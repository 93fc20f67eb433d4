pub mod change_set;
pub mod config;
pub mod coverage;
pub mod environment;
pub mod loop_state;
pub mod validation;

pub use change_set::{ChangeSet, file_name_of};
pub use config::{
    Config, CoverageConfig, LlmConfig, LlmProvider, LoggingConfig, RetryConfig, ToolsConfig,
};
pub use coverage::{CollectorKind, CoverageArtifacts, CoverageSummary, FilterOutcome};
pub use environment::{EnvironmentReadiness, TestFrameworkKind, TestProject};
pub use loop_state::{
    IterationMeasurement, LoopError, LoopErrorKind, LoopStage, LoopState, StageOutcome,
    TerminationReason,
};
pub use validation::TestValidation;
