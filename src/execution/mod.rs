//! Runtime execution state: per-instance records, their status machine, the
//! persistence contract, and the runtime context (time + id generation).

mod record;
mod runtime_context;
mod status;
mod store;

pub use record::NodeExecutionRecord;
pub use runtime_context::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, RealIdGenerator, RealTimeProvider,
    RuntimeContext, TimeProvider,
};
pub use status::NodeExecutionStatus;
pub use store::{ExecutionStore, InMemoryExecutionStore};
