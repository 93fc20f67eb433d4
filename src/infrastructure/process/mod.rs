//! External process execution
//!
//! - `TokioCommandRunner`: real child processes with kill-on-drop and optional timeout
//! - `ScriptedCommandRunner`: canned results keyed by program and argument prefix

pub mod scripted;
pub mod tokio_runner;

pub use scripted::ScriptedCommandRunner;
pub use tokio_runner::TokioCommandRunner;
