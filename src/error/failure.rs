use serde::{Deserialize, Serialize};

/// Failure classification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    ApplicationError,
    TaskFailure,
    Timeout,
    ChildFailure,
    Aborted,
    Unknown,
}

/// Which collaborator produced the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Step,
    RemoteTask,
    Child,
    Engine,
}

/// Structured failure payload attached to a node execution record when it
/// reaches the `Failed` status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub code: FailureCode,
    pub message: String,
    pub category: FailureCategory,
}

impl FailureInfo {
    pub fn step(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            category: FailureCategory::Step,
        }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self {
            code: FailureCode::TaskFailure,
            message: message.into(),
            category: FailureCategory::RemoteTask,
        }
    }

    pub fn child(message: impl Into<String>) -> Self {
        Self {
            code: FailureCode::ChildFailure,
            message: message.into(),
            category: FailureCategory::Child,
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            code: FailureCode::Aborted,
            message: message.into(),
            category: FailureCategory::Engine,
        }
    }
}
