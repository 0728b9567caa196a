//! Task-chain invoker: queue one remote task per invocation cycle against
//! the same record, appending each chain response in order. The node
//! finalizes after the task of the `chain_end` link reports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::{EngineError, EngineResult};
use crate::execution::{NodeExecutionRecord, NodeExecutionStatus};
use crate::plan::NodeDefinition;
use crate::response::ExecutableResponse;
use crate::step::{NotifyData, StepContext, StepOutcome, TaskChainStep};
use crate::task::TaskChainLink;

pub(crate) struct TaskChainInvoker {
    core: EngineCore,
}

impl TaskChainInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn start(
        &self,
        step: Arc<dyn TaskChainStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let link = match step.start_chain_link(&ctx).await {
            Ok(link) => link,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };

        // Queue before any record write so a registry miss or queue failure
        // leaves the record retryable.
        let task_id = self.queue(record, &link).await?;
        self.core.mark_running(record).await?;
        self.persist_and_wait(record, link, task_id).await
    }

    pub async fn resume(
        &self,
        step: Arc<dyn TaskChainStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
        responses: HashMap<String, NotifyData>,
    ) -> EngineResult<()> {
        let chain_end = match record.latest_response() {
            Some(ExecutableResponse::TaskChain { chain_end, .. }) => *chain_end,
            other => {
                return Err(EngineError::InternalError(format!(
                    "task-chain record {} resumed with unexpected stored response: {other:?}",
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

        let link = match step.execute_next_link(&ctx).await {
            Ok(link) => link,
            Err(e) => {
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await
            }
        };
        let task_id = match self.queue(record, &link).await {
            Ok(task_id) => task_id,
            Err(e) => {
                // Mid-chain queue failures cannot leave the node parked with
                // nothing to wake it; fail the record instead.
                return self
                    .core
                    .finalize(
                        &record.uuid,
                        StepOutcome::Failure(crate::error::FailureInfo::task(e.to_string())),
                    )
                    .await;
            }
        };
        self.persist_and_wait(record, link, task_id).await
    }

    async fn queue(&self, record: &NodeExecutionRecord, link: &TaskChainLink) -> EngineResult<String> {
        let executor = self.core.tasks.get(&link.task.identifier)?;
        executor.queue_task(&record.trace, &link.task).await
    }

    async fn persist_and_wait(
        &self,
        record: &NodeExecutionRecord,
        link: TaskChainLink,
        task_id: String,
    ) -> EngineResult<()> {
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
                ExecutableResponse::TaskChain {
                    task_id,
                    task_identifier: link.task.identifier.clone(),
                    chain_end: link.chain_end,
                },
            )
            .await?;
        self.core
            .mark_waiting(record, NodeExecutionStatus::TaskWaiting)
            .await?;
        self.core
            .callbacks
            .register_wait(&record.uuid, [link.task.wait_id])?;
        Ok(())
    }
}
