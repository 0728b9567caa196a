//! Async and async-task invokers.
//!
//! Both suspend the node on externally delivered correlation ids: direct
//! callback ids for the plain async mode, a queued remote task's wait id for
//! the task variant. No thread blocks during the wait; control returns as
//! soon as the wait is registered and the waiting status persisted.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::{EngineError, EngineResult};
use crate::execution::{NodeExecutionRecord, NodeExecutionStatus};
use crate::plan::NodeDefinition;
use crate::response::ExecutableResponse;
use crate::step::{AsyncStep, AsyncTaskStep, NotifyData, StepContext, StepOutcome};

pub(crate) struct AsyncInvoker {
    core: EngineCore,
}

impl AsyncInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn start_async(
        &self,
        step: Arc<dyn AsyncStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let activation = match step.start(&ctx).await {
            Ok(activation) => activation,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };

        // Contract: fail before any record write so the caller can retry
        // the whole invocation.
        if activation.callback_ids.is_empty() {
            return Err(EngineError::ContractViolation(format!(
                "async step for node {} returned no callback ids",
                node.id
            )));
        }

        self.core.mark_running(record).await?;
        self.core
            .store
            .set_notify_id(&record.uuid, &record.uuid)
            .await?;
        self.core
            .store
            .set_pass_through(&record.uuid, activation.pass_through)
            .await?;
        self.core
            .store
            .append_response(
                &record.uuid,
                ExecutableResponse::Async {
                    callback_ids: activation.callback_ids.clone(),
                },
            )
            .await?;
        self.core
            .mark_waiting(record, NodeExecutionStatus::TaskWaiting)
            .await?;
        self.core
            .callbacks
            .register_wait(&record.uuid, activation.callback_ids)?;
        Ok(())
    }

    pub async fn start_async_task(
        &self,
        step: Arc<dyn AsyncTaskStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let task = match step.start_task(&ctx).await {
            Ok(task) => task,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };

        // Registry miss and queue failures are infrastructure errors: the
        // record is untouched, the caller retries the invocation.
        let executor = self.core.tasks.get(&task.identifier)?;
        let task_id = executor.queue_task(&record.trace, &task).await?;

        self.core.mark_running(record).await?;
        self.core
            .store
            .set_notify_id(&record.uuid, &record.uuid)
            .await?;
        self.core
            .store
            .append_response(
                &record.uuid,
                ExecutableResponse::Task {
                    task_id,
                    task_identifier: task.identifier.clone(),
                },
            )
            .await?;
        self.core
            .mark_waiting(record, NodeExecutionStatus::TaskWaiting)
            .await?;
        self.core
            .callbacks
            .register_wait(&record.uuid, [task.wait_id])?;
        Ok(())
    }

    pub async fn resume_async(
        &self,
        step: Arc<dyn AsyncStep>,
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

    pub async fn resume_async_task(
        &self,
        step: Arc<dyn AsyncTaskStep>,
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
