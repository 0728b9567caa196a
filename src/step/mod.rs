//! Step contract: one trait per declared capability, a closed handler union
//! keyed by that capability, and the identifier-keyed step registry.
//!
//! A step is polymorphic over the capability set; it implements exactly the
//! trait matching its node definition's declared capability. Invoker
//! selection is a single switch over [`StepHandler`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FailureInfo, StepError};
use crate::plan::StepCategory;
use crate::response::ChildDescriptor;
use crate::task::{Task, TaskChainLink};
use crate::trace::Trace;

/// Payload carried by a completion notification. Remote failures surface as
/// ordinary notifications with a failure payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NotifyData {
    Success { data: Value },
    Failure { failure: FailureInfo },
}

impl NotifyData {
    pub fn success(data: Value) -> Self {
        NotifyData::Success { data }
    }

    pub fn failure(failure: FailureInfo) -> Self {
        NotifyData::Failure { failure }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, NotifyData::Failure { .. })
    }
}

/// Final result of a step, handed to the engine's finalize path.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success { outputs: Value },
    Failure(FailureInfo),
}

impl StepOutcome {
    pub fn success(outputs: Value) -> Self {
        StepOutcome::Success { outputs }
    }
}

/// Transient bundle of everything one invocation call needs. Never
/// persisted; rebuilt from the record and node definition on each start or
/// resume.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub trace: Trace,
    /// Static parameters from the node definition.
    pub parameters: Value,
    /// Inputs passed down by the spawning node.
    pub inputs: Value,
    /// True for the first invocation of a chain-mode node.
    pub is_start: bool,
    /// Opaque data the step handed back when it suspended, restored from
    /// the record on resume. `None` on start calls and for modes whose
    /// responses carry no pass-through.
    pub pass_through: Option<Value>,
    /// Aggregated notification payloads, keyed by correlation id. Empty on
    /// start calls.
    pub responses: HashMap<String, NotifyData>,
}

impl StepContext {
    pub fn start(trace: Trace, parameters: Value, inputs: Value) -> Self {
        Self {
            trace,
            parameters,
            inputs,
            is_start: true,
            pass_through: None,
            responses: HashMap::new(),
        }
    }

    pub fn resume(
        trace: Trace,
        parameters: Value,
        inputs: Value,
        pass_through: Option<Value>,
        responses: HashMap<String, NotifyData>,
    ) -> Self {
        Self {
            trace,
            parameters,
            inputs,
            is_start: false,
            pass_through,
            responses,
        }
    }

    /// Whether any awaited signal reported a failure.
    pub fn any_failed(&self) -> bool {
        self.responses.values().any(NotifyData::is_failure)
    }

    /// First failure among the aggregated responses, if any.
    pub fn first_failure(&self) -> Option<&FailureInfo> {
        self.responses.values().find_map(|r| match r {
            NotifyData::Failure { failure } => Some(failure),
            NotifyData::Success { .. } => None,
        })
    }
}

/// Direct callback ids returned by an async-mode step, plus optional opaque
/// data to restore into the resume context.
#[derive(Debug, Clone)]
pub struct AsyncActivation {
    pub callback_ids: Vec<String>,
    pub pass_through: Option<Value>,
}

impl AsyncActivation {
    pub fn new(callback_ids: Vec<String>) -> Self {
        Self {
            callback_ids,
            pass_through: None,
        }
    }

    pub fn with_pass_through(mut self, data: Value) -> Self {
        self.pass_through = Some(data);
        self
    }
}

/// One link of a child chain.
#[derive(Debug, Clone)]
pub struct ChildChainLink {
    pub child: ChildDescriptor,
    pub chain_end: bool,
    /// Opaque data restored into the context of the next cycle.
    pub pass_through: Option<Value>,
}

impl ChildChainLink {
    pub fn new(child: ChildDescriptor, chain_end: bool) -> Self {
        Self {
            child,
            chain_end,
            pass_through: None,
        }
    }
}

/// Run-to-completion step.
#[async_trait]
pub trait SyncStep: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step that suspends on externally delivered callback ids.
#[async_trait]
pub trait AsyncStep: Send + Sync {
    async fn start(&self, ctx: &StepContext) -> Result<AsyncActivation, StepError>;
    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step whose asynchronous work is a queued remote task.
#[async_trait]
pub trait AsyncTaskStep: Send + Sync {
    async fn start_task(&self, ctx: &StepContext) -> Result<Task, StepError>;
    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step that spawns exactly one child and resumes when it finishes.
#[async_trait]
pub trait ChildStep: Send + Sync {
    async fn obtain_child(&self, ctx: &StepContext) -> Result<ChildDescriptor, StepError>;
    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step that fans out independent children and joins on all of them.
#[async_trait]
pub trait ChildrenStep: Send + Sync {
    async fn obtain_children(&self, ctx: &StepContext) -> Result<Vec<ChildDescriptor>, StepError>;
    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step that spawns a chain of children, one per invocation cycle.
#[async_trait]
pub trait ChildChainStep: Send + Sync {
    async fn start_chain(&self, ctx: &StepContext) -> Result<ChildChainLink, StepError>;
    async fn next_link(&self, ctx: &StepContext) -> Result<ChildChainLink, StepError>;
    async fn finalize(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step that queues one remote task.
#[async_trait]
pub trait TaskStep: Send + Sync {
    async fn obtain_task(&self, ctx: &StepContext) -> Result<Task, StepError>;
    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Step that queues a chain of remote tasks, one per invocation cycle.
#[async_trait]
pub trait TaskChainStep: Send + Sync {
    async fn start_chain_link(&self, ctx: &StepContext) -> Result<TaskChainLink, StepError>;
    async fn execute_next_link(&self, ctx: &StepContext) -> Result<TaskChainLink, StepError>;
    async fn finalize(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}

/// Closed tagged union over the capability set. The tag always matches the
/// node definition's declared capability.
#[derive(Clone)]
pub enum StepHandler {
    Sync(Arc<dyn SyncStep>),
    Async(Arc<dyn AsyncStep>),
    AsyncTask(Arc<dyn AsyncTaskStep>),
    Child(Arc<dyn ChildStep>),
    Children(Arc<dyn ChildrenStep>),
    ChildChain(Arc<dyn ChildChainStep>),
    Task(Arc<dyn TaskStep>),
    TaskChain(Arc<dyn TaskChainStep>),
}

impl StepHandler {
    pub fn capability(&self) -> StepCategory {
        match self {
            StepHandler::Sync(_) => StepCategory::Sync,
            StepHandler::Async(_) => StepCategory::Async,
            StepHandler::AsyncTask(_) => StepCategory::AsyncTask,
            StepHandler::Child(_) => StepCategory::Child,
            StepHandler::Children(_) => StepCategory::Children,
            StepHandler::ChildChain(_) => StepCategory::ChildChain,
            StepHandler::Task(_) => StepCategory::Task,
            StepHandler::TaskChain(_) => StepCategory::TaskChain,
        }
    }
}

/// Registry of step handlers by step-type identifier.
#[derive(Default)]
pub struct StepRegistry {
    handlers: HashMap<String, StepHandler>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, identifier: impl Into<String>, handler: StepHandler) {
        self.handlers.insert(identifier.into(), handler);
    }

    pub fn get(&self, identifier: &str) -> Option<StepHandler> {
        self.handlers.get(identifier).cloned()
    }
}
