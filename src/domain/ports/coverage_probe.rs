//! Coverage probe port - the measuring stage of the convergence loop.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::CoverageSummary;

/// Measures coverage after a validated test block has been produced.
///
/// `MalformedInput` and `MeasurementFailed` errors are recorded by the loop and
/// leave the coverage value unchanged; fatal errors abort the run.
#[async_trait]
pub trait CoverageProbe: Send + Sync {
    async fn measure(&self, test_code: &str, iteration: u32) -> DomainResult<CoverageSummary>;
}
