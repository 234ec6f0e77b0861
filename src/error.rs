use thiserror::Error;

use crate::execution::ExecutionStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Execution not found: {0}")]
    NotFound(String),

    #[error("Execution already exists: {0}")]
    DuplicateId(String),

    #[error("Execution {id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
