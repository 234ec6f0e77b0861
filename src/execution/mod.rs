//! Execution records, their log buffers, and the store that owns both.
//!
//! - [`record`]: statuses, environments, git source and the record itself
//! - [`transition`]: which status changes the store accepts
//! - [`logs`]: append-only buffers and offset/limit pagination
//! - [`store`]: the lock-protected ledger every other component talks to

pub mod logs;
pub mod record;
pub mod store;
pub mod transition;

pub use logs::{LogBuffer, LogPage};
pub use record::{
    ExecutionEnvironment, ExecutionRecord, ExecutionRequest, ExecutionStatus, GitSource,
    NewExecution,
};
pub use store::{ExecutionStats, ExecutionStore};
pub use transition::TransitionPolicy;
