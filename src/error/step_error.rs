use thiserror::Error;

use super::{FailureCode, FailureInfo};

/// Step-level (business logic) errors. These never crash the engine: the
/// owning invoker converts them into a terminal `Failed` status with a
/// structured [`FailureInfo`] payload.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step execution error: {0}")]
    Execution(String),
    #[error("Input validation error: {0}")]
    InputValidation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Step timed out: {0}")]
    Timeout(String),
}

impl StepError {
    pub fn to_failure_info(&self) -> FailureInfo {
        let code = match self {
            StepError::Timeout(_) => FailureCode::Timeout,
            _ => FailureCode::ApplicationError,
        };
        FailureInfo::step(code, self.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCategory;

    #[test]
    fn test_step_error_to_failure_info() {
        let info = StepError::Execution("boom".into()).to_failure_info();
        assert_eq!(info.code, FailureCode::ApplicationError);
        assert_eq!(info.category, FailureCategory::Step);
        assert!(info.message.contains("boom"));

        let info = StepError::Timeout("2s".into()).to_failure_info();
        assert_eq!(info.code, FailureCode::Timeout);
    }
}
