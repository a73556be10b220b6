//! Logging helpers shared by the loader, the projector and the pipeline
//!
//! Messages name the file being worked on first, so a run over many yearly
//! extracts can be followed with `grep` on a path.

use std::path::Path;
use std::time::Duration;

/// Log the start of work on `path`
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{operation} {}", path.display());
}

/// Log finished work on `path`
///
/// # Arguments
/// * `operation` - What was done, in past tense ("Read", "Wrote")
/// * `path` - File that was read or written
/// * `items` - Number of items processed
/// * `unit` - What the items are (rows, pairs, enrollments)
/// * `elapsed` - Time taken, when measured
pub fn log_operation_complete(
    operation: &str,
    path: &Path,
    items: u64,
    unit: &str,
    elapsed: Option<Duration>,
) {
    match elapsed {
        Some(duration) => log::info!(
            "{operation} {items} {unit} for {} in {duration:.2?}",
            path.display()
        ),
        None => log::info!("{operation} {items} {unit} for {}", path.display()),
    }
}

/// Log a data-quality count at warn level, only when it is non-zero
pub fn log_anomaly(count: u64, what: &str) {
    if count > 0 {
        log::warn!("{count} {what}");
    }
}

/// Warn about a file that could not be handled as intended
pub fn log_warning(message: &str, path: Option<&Path>) {
    match path {
        Some(path) => log::warn!("{message}: {}", path.display()),
        None => log::warn!("{message}"),
    }
}
