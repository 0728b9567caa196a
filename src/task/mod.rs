//! Remote task dispatch: the ephemeral task unit, the executor contract and
//! the identifier-keyed registry.
//!
//! Tasks are owned by the remote-dispatch collaborator, not persisted here;
//! only the `wait_id` matters to the engine, as the correlation id the
//! producing node suspends on. Task timeouts are enforced remotely and
//! surface as ordinary failure-payload notifications.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::trace::Trace;

/// Ephemeral unit of remote work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task-type identifier; selects the executor in the registry.
    pub identifier: String,
    /// Correlation id the completion notification will arrive on.
    pub wait_id: String,
    /// Opaque payload handed to the remote worker.
    pub payload: Value,
}

impl Task {
    pub fn new(identifier: impl Into<String>, wait_id: impl Into<String>, payload: Value) -> Self {
        Self {
            identifier: identifier.into(),
            wait_id: wait_id.into(),
            payload,
        }
    }
}

/// One link of a task chain: the task to queue plus whether the chain ends
/// after it.
#[derive(Debug, Clone)]
pub struct TaskChainLink {
    pub task: Task,
    pub chain_end: bool,
    /// Opaque data restored into the context of the next cycle.
    pub pass_through: Option<Value>,
}

impl TaskChainLink {
    pub fn new(task: Task, chain_end: bool) -> Self {
        Self {
            task,
            chain_end,
            pass_through: None,
        }
    }
}

/// Concrete remote-dispatch implementation for one task type. Queues a unit
/// of remote work and returns its task id; completion is delivered later via
/// the callback engine's notify path, keyed by the task's `wait_id`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn queue_task(&self, trace: &Trace, task: &Task) -> EngineResult<String>;
}

/// Maps a task-type identifier to its [`TaskExecutor`]. A plain value owned
/// by the engine; no ambient or global state.
#[derive(Default)]
pub struct TaskExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl TaskExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, identifier: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(identifier.into(), executor);
    }

    /// Registry lookup miss is an infrastructure error, re-thrown to the
    /// invocation caller.
    pub fn get(&self, identifier: &str) -> EngineResult<Arc<dyn TaskExecutor>> {
        self.executors
            .get(identifier)
            .cloned()
            .ok_or_else(|| EngineError::ExecutorNotFound(identifier.to_string()))
    }
}
