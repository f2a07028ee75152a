//! Error types for the load tester
//!
//! Per-attempt failures are never errors at this level: they are folded into
//! the run counters. Errors here are configuration problems and broken
//! internal invariants.

use sipconsole_client_core::ClientError;
use thiserror::Error;

use crate::attempt::AttemptState;

/// Result type alias for load tester operations
pub type LoadTestResult<T> = Result<T, LoadTestError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadTestError {
    #[error("Invalid load test configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Illegal attempt transition {from:?} -> {to:?}")]
    IllegalTransition { from: AttemptState, to: AttemptState },

    #[error("Run task failed: {reason}")]
    RunTaskFailed { reason: String },
}

impl LoadTestError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            LoadTestError::InvalidConfig { .. } => "configuration",
            LoadTestError::Client(e) => e.category(),
            LoadTestError::IllegalTransition { .. } | LoadTestError::RunTaskFailed { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_their_category() {
        let err: LoadTestError = ClientError::invalid_uri("1413", "missing sip: or sips: scheme").into();
        assert_eq!(err.category(), "configuration");
        assert!(err.to_string().contains("1413"));

        let err = LoadTestError::IllegalTransition {
            from: AttemptState::Created,
            to: AttemptState::Established,
        };
        assert_eq!(err.category(), "internal");
    }
}
