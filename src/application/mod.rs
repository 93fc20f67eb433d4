pub mod pipeline;

pub use pipeline::{CoverageReport, DiffReport, Pipeline, RunOptions, RunReport};
