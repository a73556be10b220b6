//! Utilities for working with Arrow arrays.
//!
//! Registry extracts arrive with a mix of integer, string and date columns. Everything
//! the pipeline compares or writes is handled as text, so these helpers locate columns,
//! report every missing one at once, and cast columns to `Utf8`.

use arrow::array::{Array, AsArray, StringArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;

use crate::error::{NetworkError, Result};

/// Names of `columns` absent from `schema`, in the order requested
#[must_use]
pub fn missing_columns(schema: &Schema, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| schema.index_of(c).is_err())
        .unique()
        .cloned()
        .collect()
}

/// Fail with every missing column listed
pub fn require_columns(schema: &Schema, columns: &[String], context: &str) -> Result<()> {
    let missing = missing_columns(schema, columns);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(NetworkError::missing_columns(context, missing))
    }
}

/// Get a column cast to `Utf8`
///
/// Integer and date columns are rendered with Arrow's cast kernels, so `20200901`
/// stays `"20200901"` and a `Date32` becomes `"2020-09-01"`.
pub fn string_column(batch: &RecordBatch, column_name: &str) -> Result<StringArray> {
    let idx = batch.schema().index_of(column_name).map_err(|_| {
        NetworkError::missing_columns("record batch", vec![column_name.to_string()])
    })?;
    let column = batch.column(idx);

    let array = if column.data_type() == &DataType::Utf8 {
        column.clone()
    } else {
        cast(column, &DataType::Utf8)?
    };
    Ok(array.as_string::<i32>().clone())
}

/// Keep only `columns`, in the given order
pub fn select_columns(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    require_columns(batch.schema().as_ref(), columns, "column selection")?;
    let schema = batch.schema();
    let indices = columns
        .iter()
        .map(|c| schema.index_of(c))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batch.project(&indices)?)
}

/// Concatenate batches sharing a schema; `None` when there are no batches
pub fn concat(batches: &[RecordBatch]) -> Result<Option<RecordBatch>> {
    let Some(first) = batches.first() else {
        return Ok(None);
    };
    if batches.len() == 1 {
        return Ok(Some(first.clone()));
    }
    Ok(Some(concat_batches(&first.schema(), batches)?))
}

/// A set of columns viewed as text
///
/// Nulls read as empty strings, matching how blank cells appear in delimited extracts.
#[derive(Debug, Clone)]
pub struct TextColumns {
    names: Vec<String>,
    arrays: Vec<StringArray>,
}

impl TextColumns {
    /// Cast `columns` of `batch` to text, failing if any is missing
    pub fn from_batch(batch: &RecordBatch, columns: &[String], context: &str) -> Result<Self> {
        require_columns(batch.schema().as_ref(), columns, context)?;
        let arrays = columns
            .iter()
            .map(|c| string_column(batch, c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            names: columns.to_vec(),
            arrays,
        })
    }

    /// Value of column `col` (by position) at `row`
    #[inline]
    #[must_use]
    pub fn value(&self, col: usize, row: usize) -> &str {
        let array = &self.arrays[col];
        if array.is_null(row) { "" } else { array.value(row) }
    }

    /// All values of `row`, in column order
    pub fn row(&self, row: usize) -> impl Iterator<Item = &str> + '_ {
        (0..self.arrays.len()).map(move |col| self.value(col, row))
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.arrays.first().map_or(0, Array::len)
    }
}
