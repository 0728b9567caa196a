//! Shared engine core: the collaborator bundle every invoker works against,
//! plus the node start and finalize paths.

use std::sync::Arc;

use serde_json::Value;

use crate::callback::CallbackEngine;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::events::{EngineEvent, EventEmitter};
use crate::error::{EngineError, EngineResult};
use crate::execution::{ExecutionStore, NodeExecutionRecord, NodeExecutionStatus, RuntimeContext};
use crate::plan::{NodeDefinition, Plan};
use crate::response::ChildDescriptor;
use crate::step::{NotifyData, StepOutcome};
use crate::task::TaskExecutorRegistry;
use crate::trace::{Trace, TraceLevel};

/// Clone-able bundle of the engine's collaborators. Invokers hold one of
/// these instead of the engine itself.
#[derive(Clone)]
pub(crate) struct EngineCore {
    pub plan: Arc<Plan>,
    pub store: Arc<dyn ExecutionStore>,
    pub callbacks: Arc<CallbackEngine<NotifyData>>,
    pub tasks: Arc<TaskExecutorRegistry>,
    pub dispatcher: Dispatcher,
    pub context: RuntimeContext,
    pub events: EventEmitter,
}

impl EngineCore {
    /// Create the record for the node at the tip of `trace` and submit it
    /// for independent execution. The record is persisted before dispatch.
    pub async fn start_node(
        &self,
        trace: Trace,
        node: &NodeDefinition,
        parent_id: Option<String>,
        inputs: Value,
    ) -> EngineResult<String> {
        let record_id = trace.current().runtime_id.clone();
        let record = NodeExecutionRecord::new(
            record_id.clone(),
            node.id.clone(),
            parent_id.clone(),
            trace.clone(),
            inputs,
            self.context.now_millis(),
        );
        self.store.create(record).await?;
        self.events.emit(EngineEvent::NodeQueued {
            record_id: record_id.clone(),
            node_id: node.id.clone(),
            parent_id,
        });
        self.dispatcher.submit(&trace, &record_id);
        Ok(record_id)
    }

    /// Resolve a child descriptor against the plan. Invokers call this
    /// before their first record write so a dangling descriptor fails the
    /// invocation with the parent record untouched.
    pub fn resolve_child(&self, descriptor: &ChildDescriptor) -> EngineResult<Arc<NodeDefinition>> {
        self.plan.get(&descriptor.child_node_id).map_err(|_| {
            EngineError::ContractViolation(format!(
                "child descriptor references unknown plan node {}",
                descriptor.child_node_id
            ))
        })
    }

    /// Spawn one child of `parent`: fresh instance id, trace descended one
    /// level, record created with `parent_id` set, dispatched independently.
    /// `node` is the descriptor's definition, resolved by the caller.
    pub async fn spawn_child(
        &self,
        parent: &NodeExecutionRecord,
        node: &NodeDefinition,
        descriptor: &ChildDescriptor,
    ) -> EngineResult<String> {
        let child_id = self.context.next_id();
        let child_trace = parent.trace.descend(TraceLevel::new(node, &child_id));
        self.start_node(
            child_trace,
            node,
            Some(parent.uuid.clone()),
            descriptor.additional_inputs.clone(),
        )
        .await
    }

    /// Terminal path for a node: persist the outcome, transition to the
    /// terminal status and notify the waiting parent, if any.
    pub async fn finalize(&self, record_id: &str, outcome: StepOutcome) -> EngineResult<()> {
        let record = self.store.get(record_id).await?;
        if record.status.is_terminal() {
            tracing::warn!(record_id, status = %record.status, "finalize on terminal record suppressed");
            return Ok(());
        }

        let (status, notify) = match outcome {
            StepOutcome::Success { outputs } => {
                self.store.set_outputs(record_id, outputs.clone()).await?;
                (
                    NodeExecutionStatus::Succeeded,
                    NotifyData::success(outputs),
                )
            }
            StepOutcome::Failure(failure) => {
                self.store.set_failure(record_id, failure.clone()).await?;
                (NodeExecutionStatus::Failed, NotifyData::failure(failure))
            }
        };
        self.store.update_status(record_id, status).await?;
        self.events.emit(EngineEvent::NodeFinished {
            record_id: record_id.to_string(),
            node_id: record.node_id.clone(),
            status,
        });

        match &record.parent_id {
            Some(_) => self.callbacks.notify(&record.uuid, notify)?,
            None => self.events.emit(EngineEvent::RunCompleted {
                record_id: record_id.to_string(),
                status,
            }),
        }
        Ok(())
    }

    /// Mark the invocation as running and tell any listener. Entered exactly
    /// once per invocation call, on start or resume.
    pub async fn mark_running(&self, record: &NodeExecutionRecord) -> EngineResult<()> {
        self.store
            .update_status(&record.uuid, NodeExecutionStatus::Running)
            .await?;
        self.events.emit(EngineEvent::NodeRunning {
            record_id: record.uuid.clone(),
            node_id: record.node_id.clone(),
        });
        Ok(())
    }

    /// Transition a node into one of the waiting states after its wait has
    /// been registered and its side effects persisted.
    pub async fn mark_waiting(
        &self,
        record: &NodeExecutionRecord,
        status: NodeExecutionStatus,
    ) -> EngineResult<()> {
        debug_assert!(status.is_waiting());
        self.store.update_status(&record.uuid, status).await?;
        self.events.emit(EngineEvent::NodeWaiting {
            record_id: record.uuid.clone(),
            node_id: record.node_id.clone(),
            status,
        });
        Ok(())
    }
}
