pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod service;
pub mod shutdown;
pub mod worker;
