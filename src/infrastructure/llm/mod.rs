//! Text-generation provider clients
//!
//! - OpenAI-compatible chat completions (OpenAI, Ollama, Groq, OpenRouter)
//! - Anthropic Messages API
//! - Error classification and exponential backoff retry

pub mod client;
pub mod errors;
pub mod retry;
pub mod scripted;
pub mod types;

pub use client::LlmClient;
pub use errors::LlmApiError;
pub use retry::RetryPolicy;
pub use scripted::ScriptedTextGenerator;
