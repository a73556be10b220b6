//! Run logging and progress bars
//!
//! Counts of dropped rows and skipped groups go through [`log_anomaly`] so a
//! run summary can be read from the warn-level log alone.

pub mod log;
pub mod progress;

pub use self::log::{log_anomaly, log_operation_complete, log_operation_start, log_warning};
pub use self::progress::{create_main_progress_bar, create_spinner, finish_progress_bar};
