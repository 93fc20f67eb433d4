//! Text-generation port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// A two-part prompt for a chat-style model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// External text-generation collaborator.
///
/// Every failure (unreachable provider, provider error, empty answer) surfaces
/// as `DomainError::GenerationFailed`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short provider/model label for logs and reports
    fn name(&self) -> String;

    async fn generate(&self, prompt: &Prompt) -> DomainResult<String>;
}
