//! Test Code Validator
//!
//! Substring checks for the minimum shape of a C# test file. False positives
//! and negatives are acceptable; it only keeps obviously unusable output out.

use crate::domain::models::TestValidation;

/// Attributes accepted as test-case markers (xUnit, NUnit, MSTest)
pub const TEST_MARKERS: [&str; 6] = [
    "[Fact",
    "[Theory",
    "[Test]",
    "[TestCase",
    "[TestMethod",
    "[DataTestMethod",
];

const TEST_METHOD_SIGNATURES: [&str; 2] = ["public void ", "public async Task"];

pub fn validate(code: &str) -> TestValidation {
    let mut missing = Vec::new();

    if !code.contains("using ") {
        missing.push("missing using directives".to_string());
    }
    if !TEST_MARKERS.iter().any(|marker| code.contains(marker)) {
        missing.push("missing test attribute ([Fact], [Theory], [Test], [TestCase] or [TestMethod])".to_string());
    }
    if !TEST_METHOD_SIGNATURES.iter().any(|sig| code.contains(sig)) {
        missing.push("missing public test method".to_string());
    }

    TestValidation::from_missing(missing)
}
