//! Scripted text generator for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{Prompt, TextGenerator};

/// Answers prompts from a queue of scripted replies.
///
/// When the queue runs dry the last reply is repeated. Every prompt is recorded.
#[derive(Clone, Default)]
pub struct ScriptedTextGenerator {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    last: Arc<Mutex<Option<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<Prompt>>>,
}

impl ScriptedTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator that always answers `text`
    pub fn always(text: impl Into<String>) -> Self {
        Self::new().reply(text)
    }

    /// Queue a successful reply
    #[must_use]
    pub fn reply(self, text: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(text.into()));
        }
        self
    }

    /// Queue a failing call
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(message.into()));
        }
        self
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn generate(&self, prompt: &Prompt) -> DomainResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }

        let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        let reply = match next {
            Some(reply) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(reply.clone());
                }
                Some(reply)
            }
            None => self.last.lock().ok().and_then(|last| last.clone()),
        };

        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(DomainError::GenerationFailed(message)),
            None => Err(DomainError::GenerationFailed("no scripted reply".to_string())),
        }
    }
}
