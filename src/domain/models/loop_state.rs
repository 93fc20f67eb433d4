//! Convergence loop state and its pure transition function.
//!
//! The orchestrator owns a [`LoopState`] snapshot and replaces it after each
//! stage with `state.apply(outcome)`. Nothing else feeds the continuation
//! predicate, so every termination rule can be exercised without running a
//! single external process.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::coverage::CoverageSummary;

/// Stage the loop is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStage {
    Init,
    Generating,
    Validating,
    Measuring,
    Deciding,
    Continue,
    Done,
}

impl LoopStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStage::Init => "init",
            LoopStage::Generating => "generating",
            LoopStage::Validating => "validating",
            LoopStage::Measuring => "measuring",
            LoopStage::Deciding => "deciding",
            LoopStage::Continue => "continue",
            LoopStage::Done => "done",
        }
    }
}

impl fmt::Display for LoopStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a finished loop stopped. Both are successful terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TargetMet,
    IterationsExhausted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::TargetMet => f.write_str("target met"),
            TerminationReason::IterationsExhausted => f.write_str("iterations exhausted"),
        }
    }
}

/// Kind of a recoverable per-iteration failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopErrorKind {
    Generation,
    Validation,
    Measurement,
    MalformedInput,
}

impl fmt::Display for LoopErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopErrorKind::Generation => "generation",
            LoopErrorKind::Validation => "validation",
            LoopErrorKind::Measurement => "measurement",
            LoopErrorKind::MalformedInput => "malformed input",
        };
        f.write_str(name)
    }
}

/// A recorded failure; the loop keeps going after it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopError {
    pub kind: LoopErrorKind,
    pub iteration: u32,
    pub message: String,
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration {}: {} failed: {}",
            self.iteration, self.kind, self.message
        )
    }
}

/// A successful measurement, kept for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMeasurement {
    pub iteration: u32,
    pub summary: CoverageSummary,
}

/// Result of running one stage, fed back into [`LoopState::apply`]
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Enter the next generation (from `Init` or `Continue`)
    Begin,
    /// A candidate test body was produced
    Generated(String),
    /// The candidate has the expected shape
    Validated,
    /// Coverage was measured for this iteration
    Measured(CoverageSummary),
    /// A stage failed; the loop proceeds straight to `Deciding`
    Failed { kind: LoopErrorKind, message: String },
    /// Evaluate the continuation predicate
    Decide,
}

/// State threaded through the convergence loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    pub iteration: u32,
    pub max_iterations: u32,
    /// Line coverage (0-100) from the most recent successful measurement
    pub coverage: f64,
    pub target: f64,
    pub generated_tests: Vec<String>,
    pub errors: Vec<LoopError>,
    pub should_continue: bool,
    pub stage: LoopStage,
    pub measurements: Vec<IterationMeasurement>,
}

impl LoopState {
    pub fn new(target: f64, max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            coverage: 0.0,
            target,
            generated_tests: Vec::new(),
            errors: Vec::new(),
            should_continue: false,
            stage: LoopStage::Init,
            measurements: Vec::new(),
        }
    }

    /// The continuation predicate: below target and budget left
    pub fn continuation(coverage: f64, target: f64, iteration: u32, max_iterations: u32) -> bool {
        coverage < target && iteration < max_iterations
    }

    /// Pure transition `(state, outcome) -> state`
    #[must_use]
    pub fn apply(mut self, outcome: StageOutcome) -> Self {
        match outcome {
            StageOutcome::Begin => {
                self.should_continue = Self::continuation(
                    self.coverage,
                    self.target,
                    self.iteration,
                    self.max_iterations,
                );
                self.stage = if self.should_continue {
                    LoopStage::Generating
                } else {
                    LoopStage::Done
                };
            }
            StageOutcome::Generated(body) => {
                self.generated_tests.push(body);
                self.stage = LoopStage::Validating;
            }
            StageOutcome::Validated => {
                self.stage = LoopStage::Measuring;
            }
            StageOutcome::Measured(summary) => {
                self.coverage = summary.line_coverage;
                self.measurements.push(IterationMeasurement {
                    iteration: self.iteration,
                    summary,
                });
                self.stage = LoopStage::Deciding;
            }
            StageOutcome::Failed { kind, message } => {
                self.errors.push(LoopError {
                    kind,
                    iteration: self.iteration,
                    message,
                });
                self.stage = LoopStage::Deciding;
            }
            StageOutcome::Decide => {
                if self.coverage >= self.target {
                    self.should_continue = false;
                    self.stage = LoopStage::Done;
                } else {
                    self.iteration = (self.iteration + 1).min(self.max_iterations);
                    self.should_continue = Self::continuation(
                        self.coverage,
                        self.target,
                        self.iteration,
                        self.max_iterations,
                    );
                    self.stage = if self.should_continue {
                        LoopStage::Continue
                    } else {
                        LoopStage::Done
                    };
                }
            }
        }
        self
    }

    pub fn is_done(&self) -> bool {
        self.stage == LoopStage::Done
    }

    /// Why the loop stopped, once it has
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        if !self.is_done() {
            return None;
        }
        if self.coverage >= self.target {
            Some(TerminationReason::TargetMet)
        } else {
            Some(TerminationReason::IterationsExhausted)
        }
    }

    /// Test bodies generated so far, joined in order
    pub fn previous_tests(&self) -> String {
        self.generated_tests.join("\n\n")
    }

    /// Most recent successful measurement
    pub fn last_summary(&self) -> Option<&CoverageSummary> {
        self.measurements.last().map(|m| &m.summary)
    }
}
