//! Error handling for the enrollment and projection pipeline.

pub mod util;

use std::io;
use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Specialized error type for the pipeline
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Error opening, reading or writing a file
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    ParquetError(#[from] ParquetError),

    /// Error parsing a JSON configuration
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The storage format of a dataset file is not supported
    #[error("Unsupported file format: {}", path.display())]
    UnsupportedFormat {
        /// The offending file
        path: PathBuf,
    },

    /// One or more required columns are absent
    #[error("Missing columns in {context}: {}", columns.join(", "))]
    MissingColumns {
        /// What was being processed
        context: String,
        /// Every absent column
        columns: Vec<String>,
    },

    /// A mandatory value could not be interpreted
    #[error("Invalid value '{value}' in column '{column}'")]
    InvalidValue {
        /// Column holding the value
        column: String,
        /// The raw value
        value: String,
    },

    /// A group exceeds the configured pairing ceiling
    #[error("Group {key} has {size} members, exceeding the limit of {limit}")]
    GroupTooLarge {
        /// Rendered group key
        key: String,
        /// Number of members
        size: usize,
        /// Configured ceiling
        limit: usize,
    },

    /// Appending to a file whose header differs from the expected one
    #[error("Header of {} does not match the rows being appended", path.display())]
    HeaderMismatch {
        /// The existing output file
        path: PathBuf,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl NetworkError {
    /// Create a missing-columns error
    pub fn missing_columns(context: impl Into<String>, columns: Vec<String>) -> Self {
        Self::MissingColumns {
            context: context.into(),
            columns,
        }
    }

    /// Create an invalid-value error
    pub fn invalid_value(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Whether this error is fatal for a single input only (format or schema)
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::MissingColumns { .. } | Self::InvalidValue { .. }
        )
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, NetworkError>;
