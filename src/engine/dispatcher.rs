//! Work submission onto the engine's worker pool.
//!
//! Submission is fire-and-forget: the spawning invocation returns as soon as
//! the work item is on the queue, never blocking on the spawned work.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::callback::WaitCompletion;
use crate::step::NotifyData;
use crate::trace::Trace;

/// One unit of work for the pool: start a freshly persisted record, or
/// resume a suspended one with its aggregated responses.
#[derive(Debug)]
pub(crate) enum WorkItem {
    Start {
        record_id: String,
    },
    Resume {
        record_id: String,
        responses: HashMap<String, NotifyData>,
    },
}

/// Submits independent node executions onto the worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<WorkItem>,
}

impl Dispatcher {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<WorkItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Submit the node at the tip of `trace` for independent execution.
    pub(crate) fn submit(&self, trace: &Trace, record_id: &str) {
        tracing::debug!(
            run_id = %trace.run_id,
            depth = trace.depth(),
            record_id,
            "dispatching node execution"
        );
        if self
            .tx
            .send(WorkItem::Start {
                record_id: record_id.to_string(),
            })
            .is_err()
        {
            tracing::warn!(record_id, "work queue closed, dropping dispatch");
        }
    }

    /// Re-submit a completed wait as a resume invocation. Resumption always
    /// runs on a different worker than the invocation that suspended.
    pub(crate) fn submit_resume(&self, completion: WaitCompletion<NotifyData>) {
        let record_id = completion.owner_id;
        if self
            .tx
            .send(WorkItem::Resume {
                record_id: record_id.clone(),
                responses: completion.responses,
            })
            .is_err()
        {
            tracing::warn!(record_id, "work queue closed, dropping resume");
        }
    }
}
