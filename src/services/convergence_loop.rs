//! Convergence Loop
//!
//! Drives generate → validate → measure → decide until the coverage target is
//! met or the iteration budget runs out. All state changes go through
//! [`LoopState::apply`]; this module only runs the stages and feeds their
//! outcomes back in.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LoopErrorKind, LoopStage, LoopState, StageOutcome};
use crate::domain::ports::CoverageProbe;
use crate::services::test_generation::{GenerationRequest, TestGenerationInvoker};
use crate::services::test_validator;

/// Called after every decision with the current state
pub type LoopObserver = Arc<dyn Fn(&LoopState) + Send + Sync>;

/// What the loop works on
#[derive(Debug, Clone, Copy)]
pub struct LoopInput<'a> {
    pub source_code: &'a str,
    pub outline: &'a str,
    pub target: f64,
    pub max_iterations: u32,
}

pub struct ConvergenceLoop {
    invoker: TestGenerationInvoker,
    probe: Arc<dyn CoverageProbe>,
    observer: Option<LoopObserver>,
}

impl ConvergenceLoop {
    pub fn new(invoker: TestGenerationInvoker, probe: Arc<dyn CoverageProbe>) -> Self {
        Self {
            invoker,
            probe,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: LoopObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run to `Done`.
    ///
    /// Recoverable failures end up in the returned state's error list. Only
    /// fatal errors (missing environment, interruption) are returned as `Err`.
    #[instrument(skip(self, input), fields(target = input.target, max_iterations = input.max_iterations))]
    pub async fn run(&self, input: &LoopInput<'_>) -> DomainResult<LoopState> {
        let mut state = LoopState::new(input.target, input.max_iterations).apply(StageOutcome::Begin);

        while !state.is_done() {
            state = self.iterate(state, input).await?;
            state = state.apply(StageOutcome::Decide);

            info!(
                iteration = state.iteration,
                coverage = state.coverage,
                errors = state.errors.len(),
                stage = state.stage.as_str(),
                "iteration decided"
            );
            if let Some(observer) = &self.observer {
                observer(&state);
            }

            if state.stage == LoopStage::Continue {
                state = state.apply(StageOutcome::Begin);
            }
        }

        match state.termination_reason() {
            Some(reason) => info!(%reason, coverage = state.coverage, iteration = state.iteration, "loop finished"),
            None => warn!("loop ended without a termination reason"),
        }
        Ok(state)
    }

    /// Generating → (Validating → Measuring →) Deciding
    async fn iterate(&self, state: LoopState, input: &LoopInput<'_>) -> DomainResult<LoopState> {
        let previous = state.previous_tests();
        let request = GenerationRequest {
            source_code: input.source_code,
            previous_tests: &previous,
            iteration: state.iteration,
            outline: input.outline,
        };

        let code = match self.invoker.generate(&request).await {
            Ok(code) => code,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(iteration = state.iteration, error = %e, "generation failed");
                return Ok(state.apply(StageOutcome::Failed {
                    kind: LoopErrorKind::Generation,
                    message: e.to_string(),
                }));
            }
        };

        let validation = test_validator::validate(&code);
        let state = state.apply(StageOutcome::Generated(code.clone()));
        if !validation.is_valid {
            warn!(iteration = state.iteration, missing = %validation.describe(), "generated tests have the wrong shape");
            return Ok(state.apply(StageOutcome::Failed {
                kind: LoopErrorKind::Validation,
                message: validation.describe(),
            }));
        }
        let state = state.apply(StageOutcome::Validated);

        match self.probe.measure(&code, state.iteration).await {
            Ok(summary) => Ok(state.apply(StageOutcome::Measured(summary))),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(iteration = state.iteration, error = %e, "measurement failed, coverage unchanged");
                let kind = match e {
                    DomainError::MalformedInput(_) => LoopErrorKind::MalformedInput,
                    _ => LoopErrorKind::Measurement,
                };
                Ok(state.apply(StageOutcome::Failed {
                    kind,
                    message: e.to_string(),
                }))
            }
        }
    }
}
