use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{EngineError, EngineResult, FailureInfo};
use crate::execution::{
    NodeExecutionRecord, NodeExecutionStatus, RealTimeProvider, TimeProvider,
};
use crate::response::ExecutableResponse;

/// Persistence contract for node execution records.
///
/// All updates are partial-field (status transition, append-to-list) rather
/// than whole-document replacement. Records are indexed by uuid and by
/// `parent_id`; a parent never stores a back-pointer to its children.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create(&self, record: NodeExecutionRecord) -> EngineResult<()>;

    async fn get(&self, id: &str) -> EngineResult<NodeExecutionRecord>;

    /// Transition the record's status. Rejects transitions the status
    /// machine forbids; a terminal status is never overwritten.
    async fn update_status(&self, id: &str, status: NodeExecutionStatus) -> EngineResult<()>;

    async fn set_notify_id(&self, id: &str, notify_id: &str) -> EngineResult<()>;

    /// Replace the record's pass-through data. Chain cycles overwrite it,
    /// `None` included.
    async fn set_pass_through(&self, id: &str, data: Option<Value>) -> EngineResult<()>;

    /// Append one response to the record's ordered response list. Earlier
    /// responses are never overwritten.
    async fn append_response(&self, id: &str, response: ExecutableResponse) -> EngineResult<()>;

    async fn set_outputs(&self, id: &str, outputs: Value) -> EngineResult<()>;

    async fn set_failure(&self, id: &str, failure: FailureInfo) -> EngineResult<()>;

    /// All records whose `parent_id` equals `parent_id`, in creation order.
    async fn children_of(&self, parent_id: &str) -> EngineResult<Vec<NodeExecutionRecord>>;
}

#[derive(Default)]
struct StoreState {
    records: HashMap<String, NodeExecutionRecord>,
    /// parent uuid -> child uuids, in creation order.
    by_parent: HashMap<String, Vec<String>>,
}

/// In-memory [`ExecutionStore`] used by the engine's default wiring and by
/// tests. A production deployment substitutes a database-backed store.
pub struct InMemoryExecutionStore {
    state: RwLock<StoreState>,
    time: Arc<dyn TimeProvider>,
}

impl InMemoryExecutionStore {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            time,
        }
    }

    fn with_record<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut NodeExecutionRecord) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut state = self.state.write();
        let now = self.time.now_millis();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| EngineError::RecordNotFound(id.to_string()))?;
        let result = f(record)?;
        record.last_updated_millis = now;
        Ok(result)
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new(Arc::new(RealTimeProvider))
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, record: NodeExecutionRecord) -> EngineResult<()> {
        let mut state = self.state.write();
        if state.records.contains_key(&record.uuid) {
            return Err(EngineError::DuplicateRecord(record.uuid.clone()));
        }
        if let Some(parent) = &record.parent_id {
            state
                .by_parent
                .entry(parent.clone())
                .or_default()
                .push(record.uuid.clone());
        }
        state.records.insert(record.uuid.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> EngineResult<NodeExecutionRecord> {
        self.state
            .read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound(id.to_string()))
    }

    async fn update_status(&self, id: &str, status: NodeExecutionStatus) -> EngineResult<()> {
        self.with_record(id, |record| {
            if !record.status.can_transition_to(status) {
                return Err(EngineError::InvalidTransition {
                    record_id: record.uuid.clone(),
                    from: record.status.to_string(),
                    to: status.to_string(),
                });
            }
            record.status = status;
            Ok(())
        })
    }

    async fn set_notify_id(&self, id: &str, notify_id: &str) -> EngineResult<()> {
        self.with_record(id, |record| {
            record.notify_id = Some(notify_id.to_string());
            Ok(())
        })
    }

    async fn set_pass_through(&self, id: &str, data: Option<Value>) -> EngineResult<()> {
        self.with_record(id, |record| {
            record.pass_through = data;
            Ok(())
        })
    }

    async fn append_response(&self, id: &str, response: ExecutableResponse) -> EngineResult<()> {
        self.with_record(id, |record| {
            record.stored_responses.push(response);
            Ok(())
        })
    }

    async fn set_outputs(&self, id: &str, outputs: Value) -> EngineResult<()> {
        self.with_record(id, |record| {
            record.outputs = Some(outputs);
            Ok(())
        })
    }

    async fn set_failure(&self, id: &str, failure: FailureInfo) -> EngineResult<()> {
        self.with_record(id, |record| {
            record.failure = Some(failure);
            Ok(())
        })
    }

    async fn children_of(&self, parent_id: &str) -> EngineResult<Vec<NodeExecutionRecord>> {
        let state = self.state.read();
        let ids = match state.by_parent.get(parent_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }
}
