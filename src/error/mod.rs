//! Error types for the invocation engine.
//!
//! Errors fall into three classes:
//! - contract violations (empty callback/children lists) fail fast before
//!   any record mutation and are never retried automatically;
//! - step-level failures are converted into a terminal `Failed` status with
//!   a structured [`FailureInfo`] payload and never crash the engine;
//! - infrastructure failures (store, registry, channels) are re-thrown so
//!   the caller can retry the whole invocation.

mod engine_error;
mod failure;
mod step_error;

pub use engine_error::{EngineError, EngineResult};
pub use failure::{FailureCategory, FailureCode, FailureInfo};
pub use step_error::StepError;
