//! Engine lifecycle events.
//!
//! Emission goes through an [`EventEmitter`] that is cheaply skipped when no
//! listener is attached, so the hot path pays nothing for observability it
//! does not use.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::execution::NodeExecutionStatus;

/// Lifecycle events emitted while driving a run.
#[derive(Debug, Clone, Serialize)]
pub enum EngineEvent {
    NodeQueued {
        record_id: String,
        node_id: String,
        parent_id: Option<String>,
    },
    NodeRunning {
        record_id: String,
        node_id: String,
    },
    NodeWaiting {
        record_id: String,
        node_id: String,
        status: NodeExecutionStatus,
    },
    NodeFinished {
        record_id: String,
        node_id: String,
        status: NodeExecutionStatus,
    },
    RunCompleted {
        record_id: String,
        status: NodeExecutionStatus,
    },
    RunAborted {
        record_id: String,
        reason: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create an event channel to attach to the engine.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Sender wrapper for engine events; emission is a no-op when no listener
/// is attached.
#[derive(Clone, Default)]
pub struct EventEmitter {
    tx: Option<EventSender>,
}

impl EventEmitter {
    pub fn new(tx: EventSender) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
