use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FailureInfo;
use crate::execution::NodeExecutionStatus;
use crate::response::ExecutableResponse;
use crate::trace::Trace;

/// Mutable, persisted runtime instance of one node definition.
///
/// Exactly one record exists per trace position: chain modes re-enter and
/// append to the same record rather than creating a new one. A record is
/// mutated only by its own invoker during start/resume and by the engine's
/// finalize path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    /// Per-instance runtime id; matches the runtime id of the trace's last
    /// level and is the correlation id a waiting parent is notified on.
    pub uuid: String,
    /// Plan-node id of the definition this record instantiates.
    pub node_id: String,
    /// Spawning node's record uuid. `None` only for the run root.
    pub parent_id: Option<String>,
    pub status: NodeExecutionStatus,
    /// Owner id of the wait registration this record is suspended on, if any.
    pub notify_id: Option<String>,
    /// Trace cloned-and-extended for this instance at spawn time.
    pub trace: Trace,
    /// Ordered, append-only list of responses this node produced. Chain
    /// modes push one entry per invocation cycle.
    pub stored_responses: Vec<ExecutableResponse>,
    /// Inputs passed down by the spawning node.
    pub additional_inputs: Value,
    /// Opaque data the step handed back at its latest suspension, restored
    /// into the resume context. Overwritten on each chain cycle.
    pub pass_through: Option<Value>,
    /// Final outputs, set on success.
    pub outputs: Option<Value>,
    /// Structured failure payload, set on failure.
    pub failure: Option<FailureInfo>,
    pub created_at_millis: i64,
    pub last_updated_millis: i64,
}

impl NodeExecutionRecord {
    pub fn new(
        uuid: impl Into<String>,
        node_id: impl Into<String>,
        parent_id: Option<String>,
        trace: Trace,
        additional_inputs: Value,
        now_millis: i64,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            node_id: node_id.into(),
            parent_id,
            status: NodeExecutionStatus::Queued,
            notify_id: None,
            trace,
            stored_responses: Vec::new(),
            additional_inputs,
            pass_through: None,
            outputs: None,
            failure: None,
            created_at_millis: now_millis,
            last_updated_millis: now_millis,
        }
    }

    /// The most recent response, used by chain invokers to decide between
    /// continuation and finalization.
    pub fn latest_response(&self) -> Option<&ExecutableResponse> {
        self.stored_responses.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{NodeDefinition, StepCategory};
    use crate::trace::TraceLevel;

    #[test]
    fn test_new_record_is_queued_and_empty() {
        let node = NodeDefinition::new("n1", "shell", StepCategory::Sync);
        let trace = Trace::root("run-1", TraceLevel::new(&node, "r-1"));
        let rec = NodeExecutionRecord::new("r-1", "n1", None, trace, Value::Null, 42);

        assert_eq!(rec.status, NodeExecutionStatus::Queued);
        assert!(rec.parent_id.is_none());
        assert!(rec.stored_responses.is_empty());
        assert!(rec.latest_response().is_none());
        assert_eq!(rec.created_at_millis, 42);
    }
}
