//! Invokers: the mode-specific decision layer.
//!
//! One invoker per execution mode: each calls the step method matching the
//! node's declared capability, interprets the returned response and performs
//! the mode's side effects (persist, dispatch children or tasks, register
//! the resumption wait, transition status).
//!
//! Ordering discipline shared by every suspending mode: the step method runs
//! and its response is validated before the first record write, so a
//! contract violation leaves the record untouched; child records and task
//! queueing are persisted before the parent's wait registration, and the
//! callback engine buffers any notification that wins the race.

mod async_step;
mod child;
mod child_chain;
mod children;
mod sync;
mod task;
mod task_chain;

pub(crate) use async_step::AsyncInvoker;
pub(crate) use child::ChildInvoker;
pub(crate) use child_chain::ChildChainInvoker;
pub(crate) use children::ChildrenInvoker;
pub(crate) use sync::SyncInvoker;
pub(crate) use task::TaskInvoker;
pub(crate) use task_chain::TaskChainInvoker;

use crate::engine::core::EngineCore;

/// The full invoker set, one per execution mode.
pub(crate) struct Invokers {
    pub sync: SyncInvoker,
    pub asynchronous: AsyncInvoker,
    pub child: ChildInvoker,
    pub children: ChildrenInvoker,
    pub child_chain: ChildChainInvoker,
    pub task: TaskInvoker,
    pub task_chain: TaskChainInvoker,
}

impl Invokers {
    pub fn new(core: EngineCore) -> Self {
        Self {
            sync: SyncInvoker::new(core.clone()),
            asynchronous: AsyncInvoker::new(core.clone()),
            child: ChildInvoker::new(core.clone()),
            children: ChildrenInvoker::new(core.clone()),
            child_chain: ChildChainInvoker::new(core.clone()),
            task: TaskInvoker::new(core.clone()),
            task_chain: TaskChainInvoker::new(core),
        }
    }
}
