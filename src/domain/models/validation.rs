use serde::{Deserialize, Serialize};

/// Outcome of the structural check on a generated test block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestValidation {
    pub is_valid: bool,
    /// One message per missing requirement
    pub missing: Vec<String>,
}

impl TestValidation {
    pub fn from_missing(missing: Vec<String>) -> Self {
        Self {
            is_valid: missing.is_empty(),
            missing,
        }
    }

    /// Missing requirements as a single line
    pub fn describe(&self) -> String {
        self.missing.join("; ")
    }
}
