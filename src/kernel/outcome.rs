//! Execution result model and outcome classification

use serde::{Deserialize, Serialize};

/// Marker prefix of the semantic-check sentinel
///
/// An execution error whose text carries this marker is a control signal
/// ("the coder needs the inspector's judgment"), not a genuine fault.
pub const SEMANTIC_CHECK_MARKER: &str = "SEMANTIC_CHECK_REQUEST";

/// Coarse classification produced by the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    /// The code ran to completion
    Success,
    /// The code raised or failed at runtime
    Error,
    /// Infra-level failure not attributable to the executed code
    Text,
}

/// Result of one execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub sign: Sign,
    /// Diagnostic text shown to the agents (full traceback on error)
    pub human_message: String,
    /// Whatever the sandbox produced: stdout and raised-error text
    pub raw_output: String,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            sign: Sign::Success,
            human_message: output.clone(),
            raw_output: output,
        }
    }

    pub fn error(message: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self {
            sign: Sign::Error,
            human_message: message.into(),
            raw_output: raw_output.into(),
        }
    }

    pub fn infra(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            sign: Sign::Text,
            human_message: message.clone(),
            raw_output: message,
        }
    }
}

/// Classified outcome of an execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Eligible for the repair loop
    ExecutionError,
    /// Control signal: route to the inspector for semantic judgment
    SemanticCheckRequested,
    /// Surfaced to the user directly, never retried
    InfraFailure,
}

/// Classify an execution result
///
/// The sentinel marker wins over the sign: a semantic-check request is a
/// workflow signal regardless of how the sandbox labeled the run.
pub fn classify(result: &ExecutionResult) -> Outcome {
    if result.human_message.contains(SEMANTIC_CHECK_MARKER)
        || result.raw_output.contains(SEMANTIC_CHECK_MARKER)
    {
        return Outcome::SemanticCheckRequested;
    }
    match result.sign {
        Sign::Success => Outcome::Success,
        Sign::Error => Outcome::ExecutionError,
        Sign::Text => Outcome::InfraFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_classifies_as_success() {
        let result = ExecutionResult::success("42\n");
        assert_eq!(classify(&result), Outcome::Success);
    }

    #[test]
    fn test_error_classifies_as_execution_error() {
        let result = ExecutionResult::error("ZeroDivisionError: division by zero", "");
        assert_eq!(classify(&result), Outcome::ExecutionError);
    }

    #[test]
    fn test_infra_sign_classifies_as_infra_failure() {
        let result = ExecutionResult::infra("kernel process is gone");
        assert_eq!(classify(&result), Outcome::InfraFailure);
    }

    #[test]
    fn test_sentinel_wins_over_sign() {
        let in_error = ExecutionResult::error(
            format!("ValueError: {}\nfield samples follow", SEMANTIC_CHECK_MARKER),
            "",
        );
        assert_eq!(classify(&in_error), Outcome::SemanticCheckRequested);

        // The marker is honored even on a success-signed result.
        let in_output = ExecutionResult::success(format!("{}\nsamples", SEMANTIC_CHECK_MARKER));
        assert_eq!(classify(&in_output), Outcome::SemanticCheckRequested);
    }
}
