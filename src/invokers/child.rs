//! Single-child invoker: spawn exactly one child, register a wait on its
//! instance id and suspend. The spawning call never blocks on the child.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::EngineResult;
use crate::execution::{NodeExecutionRecord, NodeExecutionStatus};
use crate::plan::NodeDefinition;
use crate::response::ExecutableResponse;
use crate::step::{ChildStep, NotifyData, StepContext, StepOutcome};

pub(crate) struct ChildInvoker {
    core: EngineCore,
}

impl ChildInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn start(
        &self,
        step: Arc<dyn ChildStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let descriptor = match step.obtain_child(&ctx).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };

        // Resolve before the first record write so a dangling descriptor
        // leaves the parent untouched and retryable.
        let child_node = self.core.resolve_child(&descriptor)?;

        self.core.mark_running(record).await?;
        // Child record persisted (and dispatched) before the parent's wait
        // registration; a fast child's notify is buffered by the callback
        // engine until the registration lands.
        let child_id = self
            .core
            .spawn_child(record, &child_node, &descriptor)
            .await?;
        self.core
            .store
            .set_notify_id(&record.uuid, &record.uuid)
            .await?;
        self.core
            .store
            .append_response(
                &record.uuid,
                ExecutableResponse::Child {
                    child_node_id: descriptor.child_node_id,
                    additional_inputs: descriptor.additional_inputs,
                },
            )
            .await?;
        self.core
            .mark_waiting(record, NodeExecutionStatus::ChildWaiting)
            .await?;
        self.core.callbacks.register_wait(&record.uuid, [child_id])?;
        Ok(())
    }

    pub async fn resume(
        &self,
        step: Arc<dyn ChildStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
        responses: HashMap<String, NotifyData>,
    ) -> EngineResult<()> {
        let ctx = StepContext::resume(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
            record.pass_through.clone(),
            responses,
        );
        let outcome = match step.resume(&ctx).await {
            Ok(outcome) => outcome,
            Err(e) => StepOutcome::Failure(e.to_failure_info()),
        };
        self.core.finalize(&record.uuid, outcome).await
    }
}
