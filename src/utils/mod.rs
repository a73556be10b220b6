//! Shared utilities: Arrow column helpers and logging

pub mod arrow;
pub mod logging;

pub use logging::{log_operation_complete, log_operation_start, log_warning};
