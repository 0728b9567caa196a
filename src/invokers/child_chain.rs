//! Child-chain invoker: one child per invocation cycle against the same
//! record. Each cycle appends its response to the record's ordered list and
//! re-enters through the callback engine while `chain_end` is false; once
//! true, the node finalizes after its last child reports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::{EngineError, EngineResult, FailureInfo};
use crate::execution::{NodeExecutionRecord, NodeExecutionStatus};
use crate::plan::NodeDefinition;
use crate::response::ExecutableResponse;
use crate::step::{ChildChainLink, ChildChainStep, NotifyData, StepContext, StepOutcome};

pub(crate) struct ChildChainInvoker {
    core: EngineCore,
}

impl ChildChainInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn start(
        &self,
        step: Arc<dyn ChildChainStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let link = match step.start_chain(&ctx).await {
            Ok(link) => link,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };
        // Resolve before the first record write so a dangling descriptor
        // leaves the record untouched and retryable.
        let child_node = self.core.resolve_child(&link.child)?;
        self.core.mark_running(record).await?;
        self.advance(record, link, &child_node).await
    }

    pub async fn resume(
        &self,
        step: Arc<dyn ChildChainStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
        responses: HashMap<String, NotifyData>,
    ) -> EngineResult<()> {
        let chain_end = match record.latest_response() {
            Some(ExecutableResponse::ChildChain { chain_end, .. }) => *chain_end,
            other => {
                return Err(EngineError::InternalError(format!(
                    "child-chain record {} resumed with unexpected stored response: {other:?}",
                    record.uuid
                )))
            }
        };

        let ctx = StepContext::resume(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
            record.pass_through.clone(),
            responses,
        );

        if chain_end {
            let outcome = match step.finalize(&ctx).await {
                Ok(outcome) => outcome,
                Err(e) => StepOutcome::Failure(e.to_failure_info()),
            };
            return self.core.finalize(&record.uuid, outcome).await;
        }

        match step.next_link(&ctx).await {
            // The record already carries earlier chain cycles, so a dangling
            // descriptor mid-chain fails the node instead of rejecting the
            // invocation.
            Ok(link) => match self.core.resolve_child(&link.child) {
                Ok(child_node) => self.advance(record, link, &child_node).await,
                Err(e) => {
                    self.core
                        .finalize(
                            &record.uuid,
                            StepOutcome::Failure(FailureInfo::child(e.to_string())),
                        )
                        .await
                }
            },
            Err(e) => {
                self.core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await
            }
        }
    }

    /// Spawn the link's child, append the chain response to the same record
    /// and suspend on the child's instance id.
    async fn advance(
        &self,
        record: &NodeExecutionRecord,
        link: ChildChainLink,
        child_node: &NodeDefinition,
    ) -> EngineResult<()> {
        let child_id = self
            .core
            .spawn_child(record, child_node, &link.child)
            .await?;
        self.core
            .store
            .set_notify_id(&record.uuid, &record.uuid)
            .await?;
        self.core
            .store
            .set_pass_through(&record.uuid, link.pass_through)
            .await?;
        self.core
            .store
            .append_response(
                &record.uuid,
                ExecutableResponse::ChildChain {
                    child_node_id: link.child.child_node_id,
                    chain_end: link.chain_end,
                    additional_inputs: link.child.additional_inputs,
                },
            )
            .await?;
        self.core
            .mark_waiting(record, NodeExecutionStatus::ChildWaiting)
            .await?;
        self.core.callbacks.register_wait(&record.uuid, [child_id])?;
        Ok(())
    }
}
