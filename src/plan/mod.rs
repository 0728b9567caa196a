//! Static plan model: compiled node definitions and the capability set.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Closed set of execution modes a step can declare. Invoker selection is a
/// single switch over this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    /// Run to completion on the invoking worker.
    Sync,
    /// Suspend on externally delivered callback ids.
    Async,
    /// Suspend on a queued remote task's wait id.
    AsyncTask,
    /// Spawn exactly one child and wait for it.
    Child,
    /// Spawn one or more independent children and join on all of them.
    Children,
    /// Spawn a chain of children, one per invocation cycle.
    ChildChain,
    /// Queue one remote task and wait for it.
    Task,
    /// Queue a chain of remote tasks, one per invocation cycle.
    TaskChain,
}

impl StepCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepCategory::Sync => "sync",
            StepCategory::Async => "async",
            StepCategory::AsyncTask => "async_task",
            StepCategory::Child => "child",
            StepCategory::Children => "children",
            StepCategory::ChildChain => "child_chain",
            StepCategory::Task => "task",
            StepCategory::TaskChain => "task_chain",
        }
    }
}

/// Immutable, statically compiled description of one plan step. Owned by the
/// [`Plan`], referenced (never owned) by node execution records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Plan-node id, unique within one plan version.
    pub id: String,
    /// Step-type identifier used to look up the registered handler.
    pub identifier: String,
    /// Human-readable name. Defaults to the id.
    pub name: String,
    /// Declared execution-mode capability.
    pub capability: StepCategory,
    /// Static parameters compiled into the plan for this step.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, identifier: impl Into<String>, capability: StepCategory) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            identifier: identifier.into(),
            capability,
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A compiled plan: the DAG of node definitions, indexed by id, plus the
/// entry node. Node-to-node structure (which child a step spawns) lives in
/// the steps themselves; the plan only resolves ids to definitions.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    nodes: HashMap<String, Arc<NodeDefinition>>,
    start_node_id: Option<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node definition. The first node added becomes the start node
    /// unless [`Plan::with_start`] overrides it.
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        if self.start_node_id.is_none() {
            self.start_node_id = Some(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), Arc::new(node));
        self
    }

    pub fn with_start(mut self, node_id: impl Into<String>) -> Self {
        self.start_node_id = Some(node_id.into());
        self
    }

    pub fn get(&self, node_id: &str) -> EngineResult<Arc<NodeDefinition>> {
        self.nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))
    }

    pub fn start_node(&self) -> EngineResult<Arc<NodeDefinition>> {
        let id = self
            .start_node_id
            .as_deref()
            .ok_or_else(|| EngineError::InternalError("plan has no start node".to_string()))?;
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
