//! Infrastructure layer
//!
//! Adapters for configuration, logging, external processes, text-generation
//! providers and XML documents.

pub mod config;
pub mod llm;
pub mod logging;
pub mod process;
pub mod xml;
