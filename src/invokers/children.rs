//! Fan-out invoker: spawn one record per child descriptor, dispatch each
//! independently, then register a single join wait on the entire id set.
//! Resumption fires exactly once after every child has reported,
//! order-independent.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::{EngineError, EngineResult};
use crate::execution::{NodeExecutionRecord, NodeExecutionStatus};
use crate::plan::NodeDefinition;
use crate::response::ExecutableResponse;
use crate::step::{ChildrenStep, NotifyData, StepContext, StepOutcome};

pub(crate) struct ChildrenInvoker {
    core: EngineCore,
}

impl ChildrenInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn start(
        &self,
        step: Arc<dyn ChildrenStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let descriptors = match step.obtain_children(&ctx).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };

        // Contract: fail before any record write.
        if descriptors.is_empty() {
            return Err(EngineError::ContractViolation(format!(
                "children step for node {} returned no child descriptors",
                node.id
            )));
        }
        // Resolve every descriptor up front so one dangling id cannot leave
        // a partial sibling set behind.
        let mut resolved = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            resolved.push(self.core.resolve_child(descriptor)?);
        }

        self.core.mark_running(record).await?;
        let mut child_ids = Vec::with_capacity(descriptors.len());
        for (descriptor, child_node) in descriptors.iter().zip(&resolved) {
            child_ids.push(
                self.core
                    .spawn_child(record, child_node, descriptor)
                    .await?,
            );
        }
        self.core
            .store
            .set_notify_id(&record.uuid, &record.uuid)
            .await?;
        self.core
            .store
            .append_response(
                &record.uuid,
                ExecutableResponse::Children {
                    children: descriptors,
                },
            )
            .await?;
        self.core
            .mark_waiting(record, NodeExecutionStatus::ChildrenWaiting)
            .await?;
        self.core.callbacks.register_wait(&record.uuid, child_ids)?;
        Ok(())
    }

    pub async fn resume(
        &self,
        step: Arc<dyn ChildrenStep>,
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
