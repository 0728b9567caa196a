//! Run-to-completion invoker. No suspension, no callback engine use: the
//! outcome is handed to the engine's finalize path on the same call stack.

use std::sync::Arc;

use crate::engine::core::EngineCore;
use crate::error::EngineResult;
use crate::execution::NodeExecutionRecord;
use crate::plan::NodeDefinition;
use crate::step::{StepContext, StepOutcome, SyncStep};

pub(crate) struct SyncInvoker {
    core: EngineCore,
}

impl SyncInvoker {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    pub async fn invoke(
        &self,
        step: Arc<dyn SyncStep>,
        node: &NodeDefinition,
        record: &NodeExecutionRecord,
    ) -> EngineResult<()> {
        self.core.mark_running(record).await?;
        let ctx = StepContext::start(
            record.trace.clone(),
            node.parameters.clone(),
            record.additional_inputs.clone(),
        );
        // A step error is a business failure, not an engine failure.
        let outcome = match step.run(&ctx).await {
            Ok(outcome) => outcome,
            Err(e) => StepOutcome::Failure(e.to_failure_info()),
        };
        self.core.finalize(&record.uuid, outcome).await
    }
}
