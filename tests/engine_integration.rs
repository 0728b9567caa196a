//! End-to-end engine tests: sync, async, child and children modes, abort,
//! and the response-validation contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};

use flowrun::{
    event_channel, AsyncActivation, AsyncStep, ChildDescriptor, ChildStep, ChildrenStep,
    EngineBuilder, EngineEvent, EventReceiver, ExecutionStore, NodeDefinition,
    NodeExecutionStatus, NotifyData, Plan, StepCategory, StepContext, StepError, StepHandler,
    StepOutcome, StepRegistry, SyncStep, TaskExecutorRegistry,
};

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(rx: &mut EventReceiver) -> EngineEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("event channel closed")
}

/// Drain events until the run completes, returning its terminal status.
async fn wait_for_run_completed(rx: &mut EventReceiver) -> (String, NodeExecutionStatus) {
    loop {
        if let EngineEvent::RunCompleted { record_id, status } = next_event(rx).await {
            return (record_id, status);
        }
    }
}

/// Drain events until the given record enters a waiting status.
async fn wait_for_waiting(rx: &mut EventReceiver, target: &str) -> NodeExecutionStatus {
    loop {
        if let EngineEvent::NodeWaiting {
            record_id, status, ..
        } = next_event(rx).await
        {
            if record_id == target {
                return status;
            }
        }
    }
}

struct EchoStep;

#[async_trait]
impl SyncStep for EchoStep {
    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::success(json!({ "echo": ctx.inputs })))
    }
}

struct FailingStep;

#[async_trait]
impl SyncStep for FailingStep {
    async fn run(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Err(StepError::Execution("deliberate failure".into()))
    }
}

/// Async step awaiting a fixed set of external callback ids.
struct ApprovalStep {
    callback_ids: Vec<String>,
}

#[async_trait]
impl AsyncStep for ApprovalStep {
    async fn start(&self, _ctx: &StepContext) -> Result<AsyncActivation, StepError> {
        Ok(AsyncActivation::new(self.callback_ids.clone()))
    }

    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if ctx.any_failed() {
            let failure = ctx.first_failure().cloned();
            return Ok(StepOutcome::Failure(failure.unwrap()));
        }
        Ok(StepOutcome::success(json!({ "received": ctx.responses.len() })))
    }
}

struct SingleChildStep;

#[async_trait]
impl ChildStep for SingleChildStep {
    async fn obtain_child(&self, _ctx: &StepContext) -> Result<ChildDescriptor, StepError> {
        Ok(ChildDescriptor::new("leaf").with_inputs(json!({"n": 1})))
    }

    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if let Some(failure) = ctx.first_failure() {
            return Ok(StepOutcome::Failure(failure.clone()));
        }
        Ok(StepOutcome::success(json!({ "child_done": true })))
    }
}

struct FanOutStep {
    count: usize,
}

#[async_trait]
impl ChildrenStep for FanOutStep {
    async fn obtain_children(&self, _ctx: &StepContext) -> Result<Vec<ChildDescriptor>, StepError> {
        Ok((0..self.count)
            .map(|n| ChildDescriptor::new("leaf").with_inputs(json!({ "n": n })))
            .collect())
    }

    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if ctx.any_failed() {
            return Ok(StepOutcome::Failure(ctx.first_failure().cloned().unwrap()));
        }
        Ok(StepOutcome::success(json!({ "joined": ctx.responses.len() })))
    }
}

/// Async step declaring no callback ids; the engine must reject it before
/// writing anything to the record.
struct EmptyActivationStep;

#[async_trait]
impl AsyncStep for EmptyActivationStep {
    async fn start(&self, _ctx: &StepContext) -> Result<AsyncActivation, StepError> {
        Ok(AsyncActivation::new(Vec::new()))
    }

    async fn resume(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::success(Value::Null))
    }
}

#[tokio::test]
async fn test_sync_node_runs_to_completion() {
    let plan = Plan::new().with_node(NodeDefinition::new("echo", "echo", StepCategory::Sync));
    let mut steps = StepRegistry::new();
    steps.register("echo", StepHandler::Sync(Arc::new(EchoStep)));

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(json!({"k": "v"})).await.unwrap();
    let (completed, status) = wait_for_run_completed(&mut rx).await;

    assert_eq!(completed, root);
    assert_eq!(status, NodeExecutionStatus::Succeeded);

    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::Succeeded);
    assert_eq!(record.outputs, Some(json!({"echo": {"k": "v"}})));
    // Sync nodes never touch the callback engine.
    assert!(record.notify_id.is_none());
    assert!(record.stored_responses.is_empty());
}

#[tokio::test]
async fn test_sync_step_error_becomes_failed_status() {
    let plan = Plan::new().with_node(NodeDefinition::new("boom", "boom", StepCategory::Sync));
    let mut steps = StepRegistry::new();
    steps.register("boom", StepHandler::Sync(Arc::new(FailingStep)));

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();
    let (_, status) = wait_for_run_completed(&mut rx).await;
    assert_eq!(status, NodeExecutionStatus::Failed);

    let record = engine.record(&root).await.unwrap();
    let failure = record.failure.expect("failure payload set");
    assert!(failure.message.contains("deliberate failure"));
}

#[tokio::test]
async fn test_async_node_resumes_after_all_callbacks() {
    let plan = Plan::new().with_node(NodeDefinition::new("approve", "approve", StepCategory::Async));
    let mut steps = StepRegistry::new();
    steps.register(
        "approve",
        StepHandler::Async(Arc::new(ApprovalStep {
            callback_ids: vec!["cb-a".into(), "cb-b".into()],
        })),
    );

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();
    let status = wait_for_waiting(&mut rx, &root).await;
    assert_eq!(status, NodeExecutionStatus::TaskWaiting);

    // Partial notification must not resume the node.
    engine
        .notify("cb-a", NotifyData::success(json!({"who": "a"})))
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::TaskWaiting);

    engine
        .notify("cb-b", NotifyData::success(json!({"who": "b"})))
        .unwrap();
    let (_, status) = wait_for_run_completed(&mut rx).await;
    assert_eq!(status, NodeExecutionStatus::Succeeded);

    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.outputs, Some(json!({"received": 2})));
    assert_eq!(record.stored_responses.len(), 1);
}

#[tokio::test]
async fn test_child_node_spawns_and_joins_one_child() {
    let plan = Plan::new()
        .with_node(NodeDefinition::new("parent", "spawn_one", StepCategory::Child))
        .with_node(NodeDefinition::new("leaf", "echo", StepCategory::Sync))
        .with_start("parent");
    let mut steps = StepRegistry::new();
    steps.register("spawn_one", StepHandler::Child(Arc::new(SingleChildStep)));
    steps.register("echo", StepHandler::Sync(Arc::new(EchoStep)));

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();
    let (_, status) = wait_for_run_completed(&mut rx).await;
    assert_eq!(status, NodeExecutionStatus::Succeeded);

    let parent = engine.record(&root).await.unwrap();
    assert_eq!(parent.outputs, Some(json!({"child_done": true})));

    let children = engine.store().children_of(&root).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].status, NodeExecutionStatus::Succeeded);
    assert_eq!(children[0].trace.depth(), 2);
    assert_eq!(children[0].parent_id.as_deref(), Some(root.as_str()));
}

#[tokio::test]
async fn test_children_fan_out_joins_exactly_once() {
    let plan = Plan::new()
        .with_node(NodeDefinition::new("fan", "fan", StepCategory::Children))
        .with_node(NodeDefinition::new("leaf", "echo", StepCategory::Sync))
        .with_start("fan");
    let mut steps = StepRegistry::new();
    steps.register("fan", StepHandler::Children(Arc::new(FanOutStep { count: 3 })));
    steps.register("echo", StepHandler::Sync(Arc::new(EchoStep)));

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();
    let (_, status) = wait_for_run_completed(&mut rx).await;
    assert_eq!(status, NodeExecutionStatus::Succeeded);

    let parent = engine.record(&root).await.unwrap();
    // The join fired once, with all three child responses aggregated.
    assert_eq!(parent.outputs, Some(json!({"joined": 3})));
    assert_eq!(parent.stored_responses.len(), 1);

    let children = engine.store().children_of(&root).await.unwrap();
    assert_eq!(children.len(), 3);
    for child in &children {
        assert_eq!(child.status, NodeExecutionStatus::Succeeded);
    }

    // No second RunCompleted arrives.
    sleep(Duration::from_millis(50)).await;
    let parent = engine.record(&root).await.unwrap();
    assert_eq!(parent.status, NodeExecutionStatus::Succeeded);
}

#[tokio::test]
async fn test_child_failure_propagates_to_parent() {
    let plan = Plan::new()
        .with_node(NodeDefinition::new("parent", "spawn_one", StepCategory::Child))
        .with_node(NodeDefinition::new("leaf", "boom", StepCategory::Sync))
        .with_start("parent");
    let mut steps = StepRegistry::new();
    steps.register("spawn_one", StepHandler::Child(Arc::new(SingleChildStep)));
    steps.register("boom", StepHandler::Sync(Arc::new(FailingStep)));

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();
    let (_, status) = wait_for_run_completed(&mut rx).await;
    assert_eq!(status, NodeExecutionStatus::Failed);

    let parent = engine.record(&root).await.unwrap();
    let failure = parent.failure.expect("failure propagated from child");
    assert!(failure.message.contains("deliberate failure"));
}

#[tokio::test]
async fn test_empty_activation_leaves_record_untouched() {
    let plan = Plan::new().with_node(NodeDefinition::new("bad", "bad", StepCategory::Async));
    let mut steps = StepRegistry::new();
    steps.register("bad", StepHandler::Async(Arc::new(EmptyActivationStep)));

    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new()).build();

    let root = engine.start_run(Value::Null).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // The invocation was rejected before the first record write.
    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::Queued);
    assert!(record.notify_id.is_none());
    assert!(record.stored_responses.is_empty());
    assert!(record.outputs.is_none());
    assert!(record.failure.is_none());
}

#[tokio::test]
async fn test_abort_cascades_and_blocks_late_notifications() {
    let plan = Plan::new()
        .with_node(NodeDefinition::new("parent", "spawn_one", StepCategory::Child))
        .with_node(NodeDefinition::new("leaf", "approve", StepCategory::Async))
        .with_start("parent");
    let mut steps = StepRegistry::new();
    steps.register("spawn_one", StepHandler::Child(Arc::new(SingleChildStep)));
    steps.register(
        "approve",
        StepHandler::Async(Arc::new(ApprovalStep {
            callback_ids: vec!["cb-late".into()],
        })),
    );

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();

    // Wait until the async leaf is parked, then abort the whole run.
    let leaf_id = loop {
        if let EngineEvent::NodeWaiting {
            record_id,
            node_id,
            status,
        } = next_event(&mut rx).await
        {
            if node_id == "leaf" {
                assert_eq!(status, NodeExecutionStatus::TaskWaiting);
                break record_id;
            }
        }
    };

    engine.abort(&root, "operator abort").await.unwrap();

    let parent = engine.record(&root).await.unwrap();
    let leaf = engine.record(&leaf_id).await.unwrap();
    assert_eq!(parent.status, NodeExecutionStatus::Aborted);
    assert_eq!(leaf.status, NodeExecutionStatus::Aborted);
    assert!(parent.failure.unwrap().message.contains("operator abort"));

    // Late notification must not resurrect the aborted subtree.
    engine
        .notify("cb-late", NotifyData::success(Value::Null))
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.record(&leaf_id).await.unwrap().status,
        NodeExecutionStatus::Aborted
    );
    assert_eq!(
        engine.record(&root).await.unwrap().status,
        NodeExecutionStatus::Aborted
    );
}

/// Child step whose descriptor references a node the plan does not define.
struct DanglingChildStep;

#[async_trait]
impl ChildStep for DanglingChildStep {
    async fn obtain_child(&self, _ctx: &StepContext) -> Result<ChildDescriptor, StepError> {
        Ok(ChildDescriptor::new("ghost"))
    }

    async fn resume(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::success(Value::Null))
    }
}

/// Fan-out step mixing a valid descriptor with a dangling one.
struct MixedFanOutStep;

#[async_trait]
impl ChildrenStep for MixedFanOutStep {
    async fn obtain_children(&self, _ctx: &StepContext) -> Result<Vec<ChildDescriptor>, StepError> {
        Ok(vec![
            ChildDescriptor::new("leaf"),
            ChildDescriptor::new("ghost"),
        ])
    }

    async fn resume(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::success(Value::Null))
    }
}

/// Fan-out step declaring no children; the engine must reject it before
/// writing anything to the record.
struct EmptyFanOutStep;

#[async_trait]
impl ChildrenStep for EmptyFanOutStep {
    async fn obtain_children(&self, _ctx: &StepContext) -> Result<Vec<ChildDescriptor>, StepError> {
        Ok(Vec::new())
    }

    async fn resume(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::success(Value::Null))
    }
}

/// Async step that hands data back at suspension and expects it restored on
/// resume.
struct StatefulApprovalStep;

#[async_trait]
impl AsyncStep for StatefulApprovalStep {
    async fn start(&self, _ctx: &StepContext) -> Result<AsyncActivation, StepError> {
        Ok(AsyncActivation::new(vec!["cb-stateful".into()])
            .with_pass_through(json!({"cursor": 17})))
    }

    async fn resume(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::success(json!({
            "restored": ctx.pass_through.clone(),
        })))
    }
}

#[tokio::test]
async fn test_unknown_child_descriptor_leaves_record_untouched() {
    let plan = Plan::new().with_node(NodeDefinition::new("parent", "dangle", StepCategory::Child));
    let mut steps = StepRegistry::new();
    steps.register("dangle", StepHandler::Child(Arc::new(DanglingChildStep)));

    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new()).build();

    let root = engine.start_run(Value::Null).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // The dangling descriptor is rejected before the first record write, so
    // the parent is not parked in a running state with nothing to wake it.
    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::Queued);
    assert!(record.notify_id.is_none());
    assert!(record.stored_responses.is_empty());
    assert!(engine.store().children_of(&root).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fan_out_with_unknown_descriptor_spawns_no_children() {
    let plan = Plan::new()
        .with_node(NodeDefinition::new("fan", "mixed", StepCategory::Children))
        .with_node(NodeDefinition::new("leaf", "echo", StepCategory::Sync))
        .with_start("fan");
    let mut steps = StepRegistry::new();
    steps.register("mixed", StepHandler::Children(Arc::new(MixedFanOutStep)));
    steps.register("echo", StepHandler::Sync(Arc::new(EchoStep)));

    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new()).build();

    let root = engine.start_run(Value::Null).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // All descriptors are resolved before any spawn, so the valid sibling is
    // not committed alongside the dangling one.
    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::Queued);
    assert!(record.stored_responses.is_empty());
    assert!(engine.store().children_of(&root).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_fan_out_leaves_record_untouched() {
    let plan = Plan::new().with_node(NodeDefinition::new("fan", "empty", StepCategory::Children));
    let mut steps = StepRegistry::new();
    steps.register("empty", StepHandler::Children(Arc::new(EmptyFanOutStep)));

    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new()).build();

    let root = engine.start_run(Value::Null).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::Queued);
    assert!(record.notify_id.is_none());
    assert!(record.stored_responses.is_empty());
    assert!(record.outputs.is_none());
    assert!(record.failure.is_none());
}

#[tokio::test]
async fn test_pass_through_restored_on_resume() {
    let plan =
        Plan::new().with_node(NodeDefinition::new("stateful", "stateful", StepCategory::Async));
    let mut steps = StepRegistry::new();
    steps.register("stateful", StepHandler::Async(Arc::new(StatefulApprovalStep)));

    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(plan, steps, TaskExecutorRegistry::new())
        .with_events(tx)
        .build();

    let root = engine.start_run(Value::Null).await.unwrap();
    wait_for_waiting(&mut rx, &root).await;

    // Persisted at suspension.
    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.pass_through, Some(json!({"cursor": 17})));

    engine
        .notify("cb-stateful", NotifyData::success(Value::Null))
        .unwrap();
    let (_, status) = wait_for_run_completed(&mut rx).await;
    assert_eq!(status, NodeExecutionStatus::Succeeded);

    let record = engine.record(&root).await.unwrap();
    assert_eq!(
        record.outputs,
        Some(json!({"restored": {"cursor": 17}}))
    );
}

#[tokio::test]
async fn test_unregistered_step_leaves_record_queued() {
    let plan = Plan::new().with_node(NodeDefinition::new("ghost", "missing", StepCategory::Sync));
    let engine =
        EngineBuilder::new(plan, StepRegistry::new(), TaskExecutorRegistry::new()).build();

    let root = engine.start_run(Value::Null).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let record = engine.record(&root).await.unwrap();
    assert_eq!(record.status, NodeExecutionStatus::Queued);
}
