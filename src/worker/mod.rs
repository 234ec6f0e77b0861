//! Execution runner.
//!
//! Takes a queued execution and carries it to a terminal status, reporting
//! every step into the [`ExecutionStore`](crate::execution::ExecutionStore):
//!
//! 1. Marks the execution `running`
//! 2. Performs the work for its environment (simulated steps, or a git
//!    checkout plus `sh -c <entrypoint>` for `local`)
//! 3. Streams output into the log buffer line by line
//! 4. Records `completed`, `failed`, `canceled` or `timeout` with its
//!    result / error
//!
//! # Security Note
//!
//! Local entrypoints run directly on the host shell without sandboxing.

pub mod executor;

pub use executor::{ExecutionRunner, RunOutcome, CANCELED_MESSAGE};
