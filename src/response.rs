//! Executable responses: the tagged result of invoking a step in its
//! declared mode. One variant per mode; chain modes carry a `chain_end`
//! marker that controls re-entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptor for one child to spawn: which plan node, plus the inputs the
/// parent passes down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    pub child_node_id: String,
    #[serde(default)]
    pub additional_inputs: Value,
}

impl ChildDescriptor {
    pub fn new(child_node_id: impl Into<String>) -> Self {
        Self {
            child_node_id: child_node_id.into(),
            additional_inputs: Value::Null,
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.additional_inputs = inputs;
        self
    }
}

/// Tagged union of per-mode step responses, persisted onto the node
/// execution record that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutableResponse {
    /// Suspend until every callback id has been notified. Must be non-empty.
    Async { callback_ids: Vec<String> },
    /// Spawn exactly one child.
    Child {
        child_node_id: String,
        #[serde(default)]
        additional_inputs: Value,
    },
    /// Spawn one or more independent children. Must be non-empty.
    Children { children: Vec<ChildDescriptor> },
    /// Spawn the next child in a chain; the chain continues while
    /// `chain_end` is false.
    ChildChain {
        child_node_id: String,
        chain_end: bool,
        #[serde(default)]
        additional_inputs: Value,
    },
    /// A remote task was queued under `task_id`.
    Task {
        task_id: String,
        task_identifier: String,
    },
    /// A chain link task was queued; the chain continues while `chain_end`
    /// is false.
    TaskChain {
        task_id: String,
        task_identifier: String,
        chain_end: bool,
    },
}

impl ExecutableResponse {
    /// Whether this response ends a chain. Non-chain responses always do.
    pub fn chain_end(&self) -> bool {
        match self {
            ExecutableResponse::ChildChain { chain_end, .. }
            | ExecutableResponse::TaskChain { chain_end, .. } => *chain_end,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_tagged_serialization() {
        let resp = ExecutableResponse::TaskChain {
            task_id: "t-1".into(),
            task_identifier: "http".into(),
            chain_end: false,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["kind"], "task_chain");
        assert_eq!(json["chain_end"], false);
    }

    #[test]
    fn test_chain_end_marker() {
        assert!(ExecutableResponse::Async {
            callback_ids: vec!["cb".into()]
        }
        .chain_end());
        assert!(!ExecutableResponse::ChildChain {
            child_node_id: "c".into(),
            chain_end: false,
            additional_inputs: Value::Null,
        }
        .chain_end());
    }
}
