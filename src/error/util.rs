//! Utility functions for error handling
//!
//! These helpers attach the path and the purpose of an operation to I/O failures.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{NetworkError, Result};

fn with_path(e: io::Error, path: &Path, purpose: &str) -> NetworkError {
    let context = match e.kind() {
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        io::ErrorKind::NotFound => "not found".to_string(),
        _ => format!("failed to access for {purpose}"),
    };
    NetworkError::IoError(io::Error::new(
        e.kind(),
        format!("{}: {context} ({e})", path.display()),
    ))
}

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if path.exists() && !path.is_file() {
        return Err(NetworkError::IoError(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{}: expected a file for {purpose}", path.display()),
        )));
    }

    fs::File::open(path).map_err(|e| with_path(e, path, purpose))
}

/// Check that a directory exists and is readable
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.is_dir() {
        return Err(NetworkError::IoError(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: directory not found, needed for {purpose}", path.display()),
        )));
    }

    fs::read_dir(path)
        .map(|_| ())
        .map_err(|e| with_path(e, path, purpose))
}

/// Create a directory (and parents) for writing outputs
pub fn ensure_directory(path: &Path, purpose: &str) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| with_path(e, path, purpose))
}
