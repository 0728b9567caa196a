//! Remote-task invoker: obtain a task from the step, queue it through the
//! registered executor, store the task response and suspend on the task's
//! wait id.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::EngineResult;
use crate::execution::{NodeExecutionRecord, NodeExecutionStatus};
use crate::plan::NodeDefinition;
use crate::response::ExecutableResponse;
use crate::step::{NotifyData, StepContext, StepOutcome, TaskStep};

pub(crate) struct TaskInvoker {
    core: EngineCore,
}

impl TaskInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn start(
        &self,
        step: Arc<dyn TaskStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        let task = match step.obtain_task(&ctx).await {
            Ok(task) => task,
            Err(e) => {
                self.core.mark_running(record).await?;
                return self
                    .core
                    .finalize(&record.uuid, StepOutcome::Failure(e.to_failure_info()))
                    .await;
            }
        };

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

    pub async fn resume(
        &self,
        step: Arc<dyn TaskStep>,
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
