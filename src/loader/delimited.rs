//! Delimited text extract loading
//!
//! Bipartite and pair tables, and some registry extracts, are tab- or
//! semicolon-separated text with a header row. Every column is read as `Utf8`:
//! identifiers carry leading zeros and cohort labels mix numbers with text.

use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchReader};

use crate::error::util::safe_open_file;
use crate::error::{NetworkError, Result};
use crate::loader::LoadOptions;
use crate::loader::encoding::TextDecoder;
use crate::utils::arrow::require_columns;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Delimiters recognised when sniffing a header line
pub const CANDIDATE_DELIMITERS: [u8; 3] = [b'\t', b';', b','];

/// Pick the candidate delimiter occurring most often in `header`
///
/// Ties resolve in candidate order; a header without any candidate is tab-separated.
#[must_use]
pub fn sniff_delimiter(header: &str) -> u8 {
    let mut best = (b'\t', 0);
    for candidate in CANDIDATE_DELIMITERS {
        let count = header.bytes().filter(|b| *b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

/// Split a header line into column names
#[must_use]
pub fn parse_header(line: &str, delimiter: u8) -> Vec<String> {
    let line = line.trim_start_matches('\u{feff}').trim_end_matches(['\n', '\r']);
    line.split(char::from(delimiter))
        .map(|name| name.trim().trim_matches('"').to_string())
        .collect()
}

/// Open a delimited file as UTF-8, switching to Latin-1 at the first invalid byte
fn open_text(path: &Path) -> Result<TextDecoder<File>> {
    let file = safe_open_file(path, "reading delimited file")?;
    Ok(TextDecoder::new(file, path.display().to_string()))
}

/// Read a delimited file into Arrow record batches of `Utf8` columns
///
/// # Returns
/// The schema of the returned batches and the batches. With a column selection
/// the batches hold only those columns, in file order.
pub fn read_delimited(path: &Path, options: &LoadOptions) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let start = Instant::now();
    log_operation_start("Reading delimited file", path);

    let mut reader = open_text(path)?;
    let mut header_line = String::new();
    if reader.read_line(&mut header_line)? == 0 {
        return Err(NetworkError::missing_columns(
            path.display().to_string(),
            options.columns.clone().unwrap_or_default(),
        ));
    }

    let delimiter = sniff_delimiter(&header_line);
    let names = parse_header(&header_line, delimiter);
    let schema = Schema::new(
        names
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    );

    let mut builder = ReaderBuilder::new(Arc::new(schema.clone()))
        .with_header(false)
        .with_delimiter(delimiter)
        .with_batch_size(options.batch_size);

    if let Some(columns) = &options.columns {
        require_columns(&schema, columns, &path.display().to_string())?;
        let mut projection: Vec<usize> = columns
            .iter()
            .filter_map(|c| schema.index_of(c).ok())
            .collect();
        projection.sort_unstable();
        projection.dedup();
        builder = builder.with_projection(projection);
    }

    let csv = builder.build_buffered(reader)?;
    let out_schema = csv.schema();

    let mut batches = Vec::new();
    let mut rows = 0usize;
    for batch in csv {
        let batch = batch?;
        match options.row_limit {
            Some(limit) if rows + batch.num_rows() >= limit => {
                batches.push(batch.slice(0, limit - rows));
                rows = limit;
                break;
            }
            _ => {
                rows += batch.num_rows();
                batches.push(batch);
            }
        }
    }

    log_operation_complete("Read", path, rows as u64, "rows", Some(start.elapsed()));
    Ok((out_schema, batches))
}
