//! Parquet extract loading

use std::path::Path;
use std::time::Instant;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use itertools::Itertools;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::Result;
use crate::error::util::safe_open_file;
use crate::loader::LoadOptions;
use crate::utils::arrow::require_columns;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Read a parquet file into Arrow record batches
///
/// # Arguments
/// * `path` - Path to the Parquet file
/// * `options` - Column selection, row limit and batch size
///
/// # Returns
/// The schema of the returned batches and the batches themselves. Columns keep
/// the order of the file; callers reorder with
/// [`select_columns`](crate::utils::arrow::select_columns).
pub fn read_parquet(path: &Path, options: &LoadOptions) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let start = Instant::now();
    log_operation_start("Reading parquet file", path);

    let file = safe_open_file(path, "reading parquet file")?;
    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(options.batch_size);

    if let Some(columns) = &options.columns {
        let file_schema = builder.schema().clone();
        require_columns(&file_schema, columns, &path.display().to_string())?;

        // Registry extracts are flat, so leaf indices equal field indices
        let projection = columns
            .iter()
            .filter_map(|c| file_schema.index_of(c).ok())
            .sorted_unstable()
            .dedup()
            .collect_vec();
        let mask = ProjectionMask::leaves(builder.parquet_schema(), projection);
        builder = builder.with_projection(mask);
    }

    if let Some(limit) = options.row_limit {
        builder = builder.with_limit(limit);
    }

    let reader = builder.build()?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    log_operation_complete("Read", path, rows as u64, "rows", Some(start.elapsed()));
    Ok((schema, batches))
}
