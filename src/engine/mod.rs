//! Engine front-end: builder, worker pool and the public run API.
//!
//! The engine owns the work queue. Every invocation, start or resume, is one
//! work item executed on its own spawned task; a completed wait is forwarded
//! back onto the same queue, so resumption never runs on the task that
//! suspended the node.

pub mod config;
pub(crate) mod core;
pub(crate) mod dispatcher;
pub mod events;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use crate::callback::{CallbackEngine, WaitCompletion};
use crate::engine::config::EngineConfig;
use crate::engine::core::EngineCore;
use crate::engine::dispatcher::{Dispatcher, WorkItem};
use crate::engine::events::{EngineEvent, EventEmitter, EventSender};
use crate::error::{EngineError, EngineResult, FailureInfo};
use crate::execution::{
    ExecutionStore, InMemoryExecutionStore, NodeExecutionRecord, NodeExecutionStatus,
    RuntimeContext,
};
use crate::invokers::Invokers;
use crate::plan::Plan;
use crate::step::{NotifyData, StepHandler, StepRegistry};
use crate::task::TaskExecutorRegistry;
use crate::trace::{Trace, TraceLevel};

/// Builder for [`Engine`]. Plan and registries are required; store, runtime
/// context, events and config fall back to in-memory defaults.
pub struct EngineBuilder {
    plan: Plan,
    steps: StepRegistry,
    tasks: TaskExecutorRegistry,
    store: Option<Arc<dyn ExecutionStore>>,
    context: RuntimeContext,
    events: EventEmitter,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new(plan: Plan, steps: StepRegistry, tasks: TaskExecutorRegistry) -> Self {
        Self {
            plan,
            steps,
            tasks,
            store: None,
            context: RuntimeContext::default(),
            events: EventEmitter::disabled(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_context(mut self, context: RuntimeContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = EventEmitter::new(tx);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire the collaborators together and spawn the worker and completion
    /// loops. The engine is live as soon as this returns.
    pub fn build(self) -> Arc<Engine> {
        let (dispatcher, work_rx) = Dispatcher::new();
        let (callbacks, completion_rx) = CallbackEngine::new();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryExecutionStore::new(self.context.time_provider.clone())));

        let core = EngineCore {
            plan: Arc::new(self.plan),
            store,
            callbacks: Arc::new(callbacks),
            tasks: Arc::new(self.tasks),
            dispatcher: dispatcher.clone(),
            context: self.context,
            events: self.events,
        };
        let invokers = Invokers::new(core.clone());

        let engine = Arc::new(Engine {
            core,
            steps: Arc::new(self.steps),
            invokers,
            config: self.config,
        });

        tokio::spawn(forward_completions(completion_rx, dispatcher));
        tokio::spawn(engine.clone().work_loop(work_rx));
        engine
    }
}

/// Forward each completed wait back onto the work queue as a resume item.
async fn forward_completions(
    mut completion_rx: mpsc::UnboundedReceiver<WaitCompletion<NotifyData>>,
    dispatcher: Dispatcher,
) {
    while let Some(completion) = completion_rx.recv().await {
        dispatcher.submit_resume(completion);
    }
}

/// The invocation engine. Holds the plan, the registries and the callback
/// engine; drives runs through the worker pool.
pub struct Engine {
    core: EngineCore,
    steps: Arc<StepRegistry>,
    invokers: Invokers,
    config: EngineConfig,
}

impl Engine {
    /// Start a run at the plan's start node. Returns the root record id once
    /// the record is persisted and queued; the run proceeds in the
    /// background.
    pub async fn start_run(&self, inputs: Value) -> EngineResult<String> {
        let node = self.core.plan.start_node()?;
        self.start_run_at(&node.id, inputs).await
    }

    /// Start a run rooted at an arbitrary plan node.
    pub async fn start_run_at(&self, node_id: &str, inputs: Value) -> EngineResult<String> {
        let node = self.core.plan.get(node_id)?;
        let run_id = self.core.context.next_id();
        let record_id = self.core.context.next_id();
        let trace = Trace::root(run_id, TraceLevel::new(&node, &record_id));
        self.core.start_node(trace, &node, None, inputs).await
    }

    /// Deliver an external completion notification for one correlation id.
    /// The suspended node resumes only once every id in its awaited set has
    /// been notified.
    pub fn notify(&self, correlation_id: &str, data: NotifyData) -> EngineResult<()> {
        self.core.callbacks.notify(correlation_id, data)
    }

    /// Abort a record and every non-terminal record beneath it. Open waits
    /// are cancelled so late notifications cannot resume an aborted node; an
    /// invocation already running reaches its next boundary and is then
    /// suppressed by the terminal status.
    pub async fn abort(&self, record_id: &str, reason: &str) -> EngineResult<()> {
        let target = self.core.store.get(record_id).await?;
        let failure = FailureInfo::aborted(reason);

        let mut stack = vec![record_id.to_string()];
        while let Some(id) = stack.pop() {
            let record = self.core.store.get(&id).await?;
            for child in self.core.store.children_of(&id).await? {
                stack.push(child.uuid);
            }
            if record.status.is_terminal() {
                continue;
            }
            self.core.callbacks.cancel_wait(&id);
            self.core.store.set_failure(&id, failure.clone()).await?;
            self.core
                .store
                .update_status(&id, NodeExecutionStatus::Aborted)
                .await?;
            self.core.events.emit(EngineEvent::NodeFinished {
                record_id: id.clone(),
                node_id: record.node_id.clone(),
                status: NodeExecutionStatus::Aborted,
            });
        }

        self.core.events.emit(EngineEvent::RunAborted {
            record_id: record_id.to_string(),
            reason: reason.to_string(),
        });

        // A parent outside the aborted subtree is still waiting on the
        // target; resume it with the abort as a failure payload.
        if target.parent_id.is_some() && !target.status.is_terminal() {
            self.core
                .callbacks
                .notify(&target.uuid, NotifyData::failure(failure))?;
        }
        Ok(())
    }

    /// Fetch one record by id.
    pub async fn record(&self, id: &str) -> EngineResult<NodeExecutionRecord> {
        self.core.store.get(id).await
    }

    pub fn store(&self) -> Arc<dyn ExecutionStore> {
        self.core.store.clone()
    }

    async fn work_loop(self: Arc<Self>, mut work_rx: mpsc::UnboundedReceiver<WorkItem>) {
        let semaphore = match self.config.max_concurrency {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        while let Some(item) = work_rx.recv().await {
            let permit = match &semaphore {
                Some(s) => match s.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };
            let engine = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                engine.process(item).await;
            });
        }
    }

    async fn process(&self, item: WorkItem) {
        match item {
            WorkItem::Start { record_id } => {
                if let Err(e) = self.process_start(&record_id).await {
                    log_invocation_error(&record_id, &e);
                }
            }
            WorkItem::Resume {
                record_id,
                responses,
            } => {
                if let Err(e) = self.process_resume(&record_id, responses).await {
                    log_invocation_error(&record_id, &e);
                }
            }
        }
    }

    async fn process_start(&self, record_id: &str) -> EngineResult<()> {
        let record = self.core.store.get(record_id).await?;
        if record.status != NodeExecutionStatus::Queued {
            tracing::warn!(record_id, status = %record.status, "start on non-queued record suppressed");
            return Ok(());
        }
        let node = self.core.plan.get(&record.node_id)?;
        let handler = self.handler_for(&node)?;

        match handler {
            StepHandler::Sync(step) => self.invokers.sync.invoke(step, &node, &record).await,
            StepHandler::Async(step) => {
                self.invokers
                    .asynchronous
                    .start_async(step, &node, &record)
                    .await
            }
            StepHandler::AsyncTask(step) => {
                self.invokers
                    .asynchronous
                    .start_async_task(step, &node, &record)
                    .await
            }
            StepHandler::Child(step) => self.invokers.child.start(step, &node, &record).await,
            StepHandler::Children(step) => {
                self.invokers.children.start(step, &node, &record).await
            }
            StepHandler::ChildChain(step) => {
                self.invokers.child_chain.start(step, &node, &record).await
            }
            StepHandler::Task(step) => self.invokers.task.start(step, &node, &record).await,
            StepHandler::TaskChain(step) => {
                self.invokers.task_chain.start(step, &node, &record).await
            }
        }
    }

    async fn process_resume(
        &self,
        record_id: &str,
        responses: std::collections::HashMap<String, NotifyData>,
    ) -> EngineResult<()> {
        let record = self.core.store.get(record_id).await?;
        if record.status.is_terminal() {
            tracing::warn!(record_id, status = %record.status, "resume on terminal record suppressed");
            return Ok(());
        }
        if !record.status.is_waiting() {
            return Err(EngineError::InternalError(format!(
                "resume on record {record_id} in status {}",
                record.status
            )));
        }
        let node = self.core.plan.get(&record.node_id)?;
        let handler = self.handler_for(&node)?;

        self.core.mark_running(&record).await?;
        match handler {
            StepHandler::Sync(_) => Err(EngineError::InternalError(format!(
                "sync node {} has nothing to resume",
                record.node_id
            ))),
            StepHandler::Async(step) => {
                self.invokers
                    .asynchronous
                    .resume_async(step, &node, &record, responses)
                    .await
            }
            StepHandler::AsyncTask(step) => {
                self.invokers
                    .asynchronous
                    .resume_async_task(step, &node, &record, responses)
                    .await
            }
            StepHandler::Child(step) => {
                self.invokers
                    .child
                    .resume(step, &node, &record, responses)
                    .await
            }
            StepHandler::Children(step) => {
                self.invokers
                    .children
                    .resume(step, &node, &record, responses)
                    .await
            }
            StepHandler::ChildChain(step) => {
                self.invokers
                    .child_chain
                    .resume(step, &node, &record, responses)
                    .await
            }
            StepHandler::Task(step) => {
                self.invokers
                    .task
                    .resume(step, &node, &record, responses)
                    .await
            }
            StepHandler::TaskChain(step) => {
                self.invokers
                    .task_chain
                    .resume(step, &node, &record, responses)
                    .await
            }
        }
    }

    fn handler_for(&self, node: &crate::plan::NodeDefinition) -> EngineResult<StepHandler> {
        let handler = self
            .steps
            .get(&node.identifier)
            .ok_or_else(|| EngineError::StepNotRegistered(node.identifier.clone()))?;
        if handler.capability() != node.capability {
            return Err(EngineError::ContractViolation(format!(
                "step {} is registered as {} but node {} declares {}",
                node.identifier,
                handler.capability().as_str(),
                node.id,
                node.capability.as_str()
            )));
        }
        Ok(handler)
    }
}

fn log_invocation_error(record_id: &str, err: &EngineError) {
    if err.is_contract_violation() {
        tracing::error!(record_id, error = %err, "invocation rejected, record left untouched for retry");
    } else {
        tracing::error!(record_id, error = %err, "invocation failed");
    }
}
