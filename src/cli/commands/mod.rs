//! CLI command implementations.

pub mod check;
pub mod coverage;
pub mod diff;
pub mod run;
