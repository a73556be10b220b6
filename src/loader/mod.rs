//! Tabular loader for yearly registry extracts
//!
//! A dataset is a directory holding one extract per year, with the year somewhere
//! in the file name. [`TableLoader::load`] finds the current file for a year, detects
//! its storage format, and returns a single record batch with the requested columns.

pub mod delimited;
pub mod encoding;
pub mod parquet;

use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;

use crate::error::util::validate_directory;
use crate::error::{NetworkError, Result};
use crate::utils::arrow::{concat, select_columns};

/// Default batch size for reading extracts
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Helper function to get batch size from environment
#[must_use]
pub fn get_batch_size() -> Option<usize> {
    std::env::var("SCHOOL_NETWORK_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
}

/// Column selection and limits for a load
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Columns to keep, in this order; `None` keeps all
    pub columns: Option<Vec<String>>,
    /// Read at most this many rows
    pub row_limit: Option<usize>,
    /// Rows per record batch while reading
    pub batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            columns: None,
            row_limit: None,
            batch_size: get_batch_size().unwrap_or(DEFAULT_BATCH_SIZE),
        }
    }
}

impl LoadOptions {
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    #[must_use]
    pub fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.row_limit = limit;
        self
    }
}

/// Storage format of an extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Parquet,
    /// Delimited text; the delimiter is sniffed from the header
    Delimited,
}

impl DataFormat {
    /// Detect the format from the file extension
    pub fn detect(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("parquet") => Ok(Self::Parquet),
            Some("tsv" | "tab" | "txt" | "csv") => Ok(Self::Delimited),
            _ => Err(NetworkError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Find the extract for `year` in a dataset directory
///
/// Files whose name contains the year are candidates; when a year has several
/// versions the lexicographically greatest name is taken as the current one.
pub fn find_dataset_file(dir: &Path, year: i32) -> Result<Option<PathBuf>> {
    validate_directory(dir, "finding dataset files")?;
    let year = year.to_string();

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && !name.starts_with('.') && name.contains(&year) {
            candidates.push(path);
        }
    }

    candidates.sort();
    if candidates.len() > 1 {
        log::info!(
            "Found {} candidate files for {} in {}, using the latest version",
            candidates.len(),
            year,
            dir.display()
        );
    }
    Ok(candidates.pop())
}

/// Loader for yearly extracts below a data root
#[derive(Debug, Clone)]
pub struct TableLoader {
    root: PathBuf,
}

impl TableLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the extract of `dataset` for `year`
    ///
    /// # Returns
    /// `None` when the dataset has no file for the year.
    pub fn load(
        &self,
        dataset: &Path,
        year: i32,
        options: &LoadOptions,
    ) -> Result<Option<RecordBatch>> {
        let dir = self.root.join(dataset);
        let Some(path) = find_dataset_file(&dir, year)? else {
            log::info!("No extract for {year} in {}", dir.display());
            return Ok(None);
        };
        load_file(&path, options).map(Some)
    }
}

/// Load one file into a single record batch
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<RecordBatch> {
    let (schema, batches) = match DataFormat::detect(path)? {
        DataFormat::Parquet => self::parquet::read_parquet(path, options)?,
        DataFormat::Delimited => self::delimited::read_delimited(path, options)?,
    };

    let batch = concat(&batches)?.unwrap_or_else(|| RecordBatch::new_empty(schema));
    match &options.columns {
        Some(columns) => select_columns(&batch, columns),
        None => Ok(batch),
    }
}
