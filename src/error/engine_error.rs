use thiserror::Error;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Contract violation: {0}")]
    ContractViolation(String),
    #[error("Node definition not found: {0}")]
    NodeNotFound(String),
    #[error("Node execution record not found: {0}")]
    RecordNotFound(String),
    #[error("Record already exists: {0}")]
    DuplicateRecord(String),
    #[error("Task executor not found for identifier: {0}")]
    ExecutorNotFound(String),
    #[error("Step handler not registered for identifier: {0}")]
    StepNotRegistered(String),
    #[error("Invalid status transition for record {record_id}: {from} -> {to}")]
    InvalidTransition {
        record_id: String,
        from: String,
        to: String,
    },
    #[error("Engine channel closed: {0}")]
    ChannelClosed(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Contract violations are surfaced synchronously to the invocation
    /// caller and must never be retried automatically.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, EngineError::ContractViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        assert_eq!(
            EngineError::ContractViolation("empty callback ids".into()).to_string(),
            "Contract violation: empty callback ids"
        );
        assert_eq!(
            EngineError::NodeNotFound("n1".into()).to_string(),
            "Node definition not found: n1"
        );
        assert_eq!(
            EngineError::ExecutorNotFound("http".into()).to_string(),
            "Task executor not found for identifier: http"
        );
        assert_eq!(
            EngineError::InvalidTransition {
                record_id: "r1".into(),
                from: "Succeeded".into(),
                to: "Running".into(),
            }
            .to_string(),
            "Invalid status transition for record r1: Succeeded -> Running"
        );
    }

    #[test]
    fn test_contract_violation_marker() {
        assert!(EngineError::ContractViolation("x".into()).is_contract_violation());
        assert!(!EngineError::RecordNotFound("x".into()).is_contract_violation());
    }
}
