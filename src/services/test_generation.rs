//! Test Generation Invoker
//!
//! Builds the prompt for one iteration, calls the text generator and extracts
//! the C# test code from its answer.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{Prompt, TextGenerator};

const CSHARP_FENCE_TAGS: [&str; 3] = ["csharp", "cs", "c#"];

const SYSTEM_PROMPT: &str = "You are an expert in C# (.NET) unit testing. \
Write high-quality unit tests with xUnit ([Fact]/[Theory]) unless the code under \
test clearly uses NUnit or MSTest. Cover success paths, failures and edge cases \
(null, empty, boundaries), name tests Method_Condition_Result and follow \
Arrange-Act-Assert. Answer with a single complete C# file: using directives, a \
namespace and a test class whose name ends in Tests. No explanations.";

/// Inputs for one generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub source_code: &'a str,
    /// Tests accepted in earlier iterations, empty on the first one
    pub previous_tests: &'a str,
    pub iteration: u32,
    /// Public-member outline of the source
    pub outline: &'a str,
}

/// Build the two-part prompt for a request
pub fn build_prompt(request: &GenerationRequest<'_>) -> Prompt {
    let previous = if request.previous_tests.trim().is_empty() {
        "none"
    } else {
        request.previous_tests
    };

    let user = format!(
        "Generate unit tests for the following C# code.\n\n\
         SOURCE CODE:\n{source}\n\n\
         PUBLIC MEMBERS:\n{outline}\n\n\
         EXISTING TESTS:\n{previous}\n\n\
         ITERATION: {iteration}\n\n\
         Add tests for behavior the existing tests do not cover yet. \
         Return only complete, valid C# code.",
        source = request.source_code,
        outline = request.outline,
        iteration = request.iteration,
    );

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// A fenced block: its info-string tag (lowercased) and body
fn fenced_blocks(text: &str) -> Vec<(String, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        let (tag, body_start) = match after_fence.find('\n') {
            Some(newline) => (after_fence[..newline].trim(), newline + 1),
            None => (after_fence.trim(), after_fence.len()),
        };
        let body_and_rest = &after_fence[body_start..];
        let (body, next) = match body_and_rest.find("```") {
            Some(end) => (&body_and_rest[..end], &body_and_rest[end + 3..]),
            None => (body_and_rest, ""),
        };
        blocks.push((tag.to_lowercase(), body));
        rest = next;
    }
    blocks
}

/// Strip code fences and surrounding whitespace.
///
/// Prefers the first block tagged as C#, then the first untagged block. Text
/// without fences is returned trimmed.
pub fn extract_code(response: &str) -> String {
    let blocks = fenced_blocks(response);
    if blocks.is_empty() {
        return response.trim().to_string();
    }

    let chosen = blocks
        .iter()
        .find(|(tag, _)| CSHARP_FENCE_TAGS.contains(&tag.as_str()))
        .or_else(|| blocks.iter().find(|(tag, _)| tag.is_empty()))
        .or_else(|| blocks.first());

    chosen
        .map(|(_, body)| body.trim().to_string())
        .unwrap_or_default()
}

pub struct TestGenerationInvoker {
    generator: Arc<dyn TextGenerator>,
}

impl TestGenerationInvoker {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn generator_name(&self) -> String {
        self.generator.name()
    }

    /// One candidate test block, or `GenerationFailed`
    #[instrument(skip(self, request), fields(iteration = request.iteration, generator = %self.generator.name()))]
    pub async fn generate(&self, request: &GenerationRequest<'_>) -> DomainResult<String> {
        if request.source_code.trim().is_empty() {
            return Err(DomainError::GenerationFailed(
                "source file is empty".to_string(),
            ));
        }

        let prompt = build_prompt(request);
        let response = self.generator.generate(&prompt).await.map_err(|e| match e {
            DomainError::GenerationFailed(_) => e,
            other if other.is_fatal() => other,
            other => DomainError::GenerationFailed(other.to_string()),
        })?;

        let code = extract_code(&response);
        if code.is_empty() {
            warn!("generator answered without code");
            return Err(DomainError::GenerationFailed(
                "response contained no code".to_string(),
            ));
        }
        debug!(chars = code.len(), "extracted test code");
        Ok(code)
    }
}
