//! # flowrun: an execution-dispatch and resumption engine
//!
//! `flowrun` drives directed plans of typed steps. Each plan node declares
//! one execution-mode capability; a mode-specific invoker interprets the
//! step's response and either finalizes the node or suspends it on a set of
//! correlation ids. Suspension never blocks a thread: the node's record is
//! parked in a waiting status, a wait is registered with the callback
//! engine, and the worker moves on. Once every awaited id has been notified
//! the node resumes, exactly once, on a fresh worker task.
//!
//! Supported modes:
//!
//! - **sync**: run to completion on the invoking worker.
//! - **async / async task**: suspend on external callback ids, or on a
//!   queued remote task's wait id.
//! - **child / children**: spawn one child, or fan out several and join on
//!   all of them.
//! - **child chain / task chain**: spawn children or queue tasks one link
//!   per invocation cycle, re-entering the same record until the chain ends.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use flowrun::{
//!     EngineBuilder, NodeDefinition, Plan, StepCategory, StepContext, StepError,
//!     StepHandler, StepOutcome, StepRegistry, SyncStep, TaskExecutorRegistry,
//! };
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl SyncStep for Hello {
//!     async fn run(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
//!         Ok(StepOutcome::success(serde_json::json!({"greeting": "hello"})))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let plan = Plan::new().with_node(NodeDefinition::new("hello", "hello", StepCategory::Sync));
//!     let mut steps = StepRegistry::new();
//!     steps.register("hello", StepHandler::Sync(Arc::new(Hello)));
//!
//!     let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new()).build();
//!     let record_id = engine.start_run(serde_json::Value::Null).await.unwrap();
//!     println!("started {record_id}");
//! }
//! ```

pub mod callback;
pub mod engine;
pub mod error;
pub mod execution;
pub(crate) mod invokers;
pub mod plan;
pub mod response;
pub mod step;
pub mod task;
pub mod trace;

pub use callback::{CallbackEngine, WaitCompletion};
pub use engine::config::EngineConfig;
pub use engine::events::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult, FailureCategory, FailureCode, FailureInfo, StepError};
pub use execution::{
    ExecutionStore, FakeIdGenerator, FakeTimeProvider, IdGenerator, InMemoryExecutionStore,
    NodeExecutionRecord, NodeExecutionStatus, RealIdGenerator, RealTimeProvider, RuntimeContext,
    TimeProvider,
};
pub use plan::{NodeDefinition, Plan, StepCategory};
pub use response::{ChildDescriptor, ExecutableResponse};
pub use step::{
    AsyncActivation, AsyncStep, AsyncTaskStep, ChildChainLink, ChildChainStep, ChildStep,
    ChildrenStep, NotifyData, StepContext, StepHandler, StepOutcome, StepRegistry, SyncStep,
    TaskChainStep, TaskStep,
};
pub use task::{Task, TaskChainLink, TaskExecutor, TaskExecutorRegistry};
pub use trace::{Trace, TraceLevel};
