//! Generic wait/notify fan-in primitive.
//!
//! A caller registers a set of correlation ids under an owner id; once every
//! awaited id has been notified, one aggregated [`WaitCompletion`] is
//! delivered on the engine's completion channel, exactly once, triggered by
//! whichever notification arrives last. The primitive knows nothing about
//! the orchestration domain: payloads are an opaque type parameter and
//! resumption is plain message passing, not a captured callback.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{EngineError, EngineResult};

/// Aggregated result of one completed wait registration.
#[derive(Debug, Clone)]
pub struct WaitCompletion<T> {
    /// Owner id the wait was registered under.
    pub owner_id: String,
    /// Payloads keyed by the correlation id they were notified on.
    pub responses: HashMap<String, T>,
}

struct Registration<T> {
    pending: HashSet<String>,
    collected: HashMap<String, T>,
}

struct CallbackState<T> {
    /// owner id -> open registration.
    registrations: HashMap<String, Registration<T>>,
    /// correlation id -> owners awaiting it.
    waiters: HashMap<String, Vec<String>>,
    /// Notifications that arrived before any registration awaited them.
    /// Children are persisted and dispatched before their parent registers
    /// its wait, so a fast child's completion can land here first.
    early: HashMap<String, T>,
    /// Correlation ids whose waits were cancelled while still pending. The
    /// next notification on such an id is dropped instead of buffered, so a
    /// late completion of an aborted subtree cannot sit in `early` forever.
    cancelled: HashSet<String>,
}

impl<T> Default for CallbackState<T> {
    fn default() -> Self {
        Self {
            registrations: HashMap::new(),
            waiters: HashMap::new(),
            early: HashMap::new(),
            cancelled: HashSet::new(),
        }
    }
}

/// Register-N-ids, resume-exactly-once callback engine.
pub struct CallbackEngine<T> {
    state: Mutex<CallbackState<T>>,
    completion_tx: mpsc::UnboundedSender<WaitCompletion<T>>,
}

impl<T: Clone + Send + 'static> CallbackEngine<T> {
    /// Create an engine together with the channel completions are delivered
    /// on. The consumer re-submits each completion to its own worker pool;
    /// resumption always happens on a different task than the suspension.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WaitCompletion<T>>) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Mutex::new(CallbackState::default()),
                completion_tx,
            },
            completion_rx,
        )
    }

    /// Register a wait for `awaited_ids` under `owner_id`.
    ///
    /// Registration is idempotent: re-registering an owner with an open
    /// registration is a no-op. Notifications that arrived before the
    /// registration are consumed immediately; if they already satisfy the
    /// whole set, the completion fires from this call.
    pub fn register_wait(
        &self,
        owner_id: &str,
        awaited_ids: impl IntoIterator<Item = String>,
    ) -> EngineResult<()> {
        let completion = {
            let mut state = self.state.lock();
            if state.registrations.contains_key(owner_id) {
                tracing::debug!(owner_id, "wait already registered, ignoring");
                return Ok(());
            }

            let ids: HashSet<String> = awaited_ids.into_iter().collect();
            if ids.is_empty() {
                return Err(EngineError::ContractViolation(format!(
                    "wait registration for {owner_id} has no awaited ids"
                )));
            }

            let mut registration = Registration {
                pending: HashSet::new(),
                collected: HashMap::new(),
            };
            for id in ids {
                // A fresh wait on a cancelled id supersedes the cancellation.
                state.cancelled.remove(&id);
                if let Some(payload) = state.early.remove(&id) {
                    registration.collected.insert(id, payload);
                } else {
                    state
                        .waiters
                        .entry(id.clone())
                        .or_default()
                        .push(owner_id.to_string());
                    registration.pending.insert(id);
                }
            }

            if registration.pending.is_empty() {
                Some(WaitCompletion {
                    owner_id: owner_id.to_string(),
                    responses: registration.collected,
                })
            } else {
                state
                    .registrations
                    .insert(owner_id.to_string(), registration);
                None
            }
        };

        if let Some(completion) = completion {
            self.deliver(completion)?;
        }
        Ok(())
    }

    /// Notify one correlation id. Every registration awaiting it records the
    /// payload; a registration whose awaited set is now fully satisfied is
    /// closed and its aggregated completion delivered. Duplicate notifies
    /// overwrite the previously collected payload (last writer wins) without
    /// re-triggering a completed registration.
    pub fn notify(&self, correlation_id: &str, payload: T) -> EngineResult<()> {
        let completions = {
            let mut state = self.state.lock();
            if state.cancelled.remove(correlation_id) {
                tracing::debug!(correlation_id, "notification for cancelled wait dropped");
                return Ok(());
            }
            let owners = match state.waiters.remove(correlation_id) {
                Some(owners) => owners,
                None => {
                    // No open waiter yet: buffer for a future registration.
                    state
                        .early
                        .insert(correlation_id.to_string(), payload);
                    return Ok(());
                }
            };

            let mut completions = Vec::new();
            for owner in owners {
                let Some(registration) = state.registrations.get_mut(&owner) else {
                    continue;
                };
                registration.pending.remove(correlation_id);
                registration
                    .collected
                    .insert(correlation_id.to_string(), payload.clone());
                if registration.pending.is_empty() {
                    if let Some(registration) = state.registrations.remove(&owner) {
                        completions.push(WaitCompletion {
                            owner_id: owner,
                            responses: registration.collected,
                        });
                    }
                }
            }
            completions
        };

        for completion in completions {
            self.deliver(completion)?;
        }
        Ok(())
    }

    /// Drop an owner's open registration, if any. Used when the awaited
    /// node is aborted and must not resume. Pending ids nobody else awaits
    /// are marked cancelled so their eventual notification is dropped rather
    /// than buffered.
    pub fn cancel_wait(&self, owner_id: &str) {
        let mut state = self.state.lock();
        if let Some(registration) = state.registrations.remove(owner_id) {
            for id in registration.pending {
                let now_unwaited = match state.waiters.get_mut(&id) {
                    Some(owners) => {
                        owners.retain(|o| o != owner_id);
                        owners.is_empty()
                    }
                    None => true,
                };
                if now_unwaited {
                    state.waiters.remove(&id);
                    state.cancelled.insert(id);
                }
            }
        }
    }

    /// Whether `owner_id` currently has an open registration.
    pub fn is_waiting(&self, owner_id: &str) -> bool {
        self.state.lock().registrations.contains_key(owner_id)
    }

    fn deliver(&self, completion: WaitCompletion<T>) -> EngineResult<()> {
        self.completion_tx
            .send(completion)
            .map_err(|_| EngineError::ChannelClosed("callback completion channel".to_string()))
    }
}
