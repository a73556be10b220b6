//! Enrollment filtering
//!
//! Turns a raw registration extract into the bipartite student-school table: rows of
//! one education type, a caller-chosen column set, and three derived columns
//! (`duration_days`, `year`, `month`). Registrations shorter than the configured
//! minimum are treated as transfers and dropped.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int32Array, Int64Array, UInt32Array};
use arrow::compute::{SortColumn, SortOptions, filter_record_batch, lexsort_to_indices, take_record_batch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use crate::config::{EnrollmentFilterConfig, RegistrationDates};
use crate::error::{NetworkError, Result};
use crate::utils::arrow::{require_columns, select_columns, string_column};
use crate::utils::logging::log_anomaly;

/// Derived registration length in days
pub const DURATION_COLUMN: &str = "duration_days";
/// Derived academic year
pub const YEAR_COLUMN: &str = "year";
/// Derived calendar month of the registration start
pub const MONTH_COLUMN: &str = "month";

/// Academic year of a registration starting on `start`
///
/// The school year begins in `start_month`; registrations starting earlier in the
/// calendar year belong to the previous academic year.
#[must_use]
pub fn academic_year(start: NaiveDate, start_month: u32) -> i32 {
    if start.month() < start_month {
        start.year() - 1
    } else {
        start.year()
    }
}

/// Parse a registry date
///
/// Accepts `YYYYMMDD` (optionally with a trailing `.0` left by float storage) and
/// ISO `YYYY-MM-DD`.
#[must_use]
pub fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }
}

/// End of a registration, mapping open registrations onto the configured far-future date
///
/// Open markers are checked before date parsing, so `99999999` never reaches the parser.
#[must_use]
pub fn resolve_end_date(raw: &str, dates: &RegistrationDates) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || dates.open_end_markers.iter().any(|m| m == trimmed) {
        return Some(dates.open_end_date);
    }
    parse_registry_date(trimmed)
}

/// Outcome of filtering one extract
#[derive(Debug, Clone)]
pub struct FilteredEnrollment {
    /// Selected columns plus derived columns, for the kept rows
    pub batch: RecordBatch,
    /// Rows in the input
    pub input_rows: usize,
    /// Rows of the requested education type
    pub type_rows: usize,
    /// Rows dropped for being shorter than the minimum duration
    pub dropped_short: usize,
    /// Rows dropped because a registration date could not be parsed
    pub dropped_invalid: usize,
}

/// Filter for one education type
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentFilter<'a> {
    config: &'a EnrollmentFilterConfig,
}

impl<'a> EnrollmentFilter<'a> {
    #[must_use]
    pub const fn new(config: &'a EnrollmentFilterConfig) -> Self {
        Self { config }
    }

    fn canonical_type<'v>(&'v self, value: &'v str) -> &'v str {
        let value = value.trim();
        self.config
            .type_aliases
            .get(value)
            .map_or(value, String::as_str)
    }

    /// Columns that must exist in the input besides the selected ones
    #[must_use]
    pub fn required_columns(&self, columns: &[String]) -> Vec<String> {
        let mut required = columns.to_vec();
        required.push(self.config.education_type_column.clone());
        if let Some(dates) = &self.config.dates {
            required.push(dates.start_column.clone());
            required.push(dates.end_column.clone());
        }
        required
    }

    /// Filter `batch`, keeping `columns` and adding derived columns
    ///
    /// Fails before any work if a required source column is absent. The input
    /// batch is not modified.
    pub fn apply(&self, batch: &RecordBatch, columns: &[String]) -> Result<FilteredEnrollment> {
        require_columns(
            batch.schema().as_ref(),
            &self.required_columns(columns),
            "enrollment extract",
        )?;

        if self.config.dates.is_some() {
            for derived in [DURATION_COLUMN, YEAR_COLUMN, MONTH_COLUMN] {
                if columns.iter().any(|c| c == derived) {
                    return Err(NetworkError::config(format!(
                        "selected column '{derived}' clashes with a derived column"
                    )));
                }
            }
        }

        let types = string_column(batch, &self.config.education_type_column)?;
        let type_mask: Vec<bool> = types
            .iter()
            .map(|v| v.is_some_and(|v| self.canonical_type(v) == self.config.education_type))
            .collect();
        let type_rows = type_mask.iter().filter(|keep| **keep).count();

        let Some(dates) = &self.config.dates else {
            let filtered = filter_record_batch(batch, &BooleanArray::from(type_mask))?;
            return Ok(FilteredEnrollment {
                batch: select_columns(&filtered, columns)?,
                input_rows: batch.num_rows(),
                type_rows,
                dropped_short: 0,
                dropped_invalid: 0,
            });
        };

        let starts = string_column(batch, &dates.start_column)?;
        let ends = string_column(batch, &dates.end_column)?;

        let mut mask = type_mask;
        let mut durations = Vec::with_capacity(type_rows);
        let mut years = Vec::with_capacity(type_rows);
        let mut months = Vec::with_capacity(type_rows);
        let mut dropped_short = 0;
        let mut dropped_invalid = 0;

        for (row, keep) in mask.iter_mut().enumerate() {
            if !*keep {
                continue;
            }
            let start = starts.is_valid(row).then(|| starts.value(row)).and_then(parse_registry_date);
            let end = resolve_end_date(if ends.is_valid(row) { ends.value(row) } else { "" }, dates);
            let (Some(start), Some(end)) = (start, end) else {
                dropped_invalid += 1;
                *keep = false;
                continue;
            };

            let duration = (end - start).num_days();
            if duration < self.config.min_duration_days {
                dropped_short += 1;
                *keep = false;
                continue;
            }

            durations.push(duration);
            years.push(academic_year(start, self.config.academic_year_start_month));
            months.push(start.month() as i32);
        }

        log::info!(
            "Filtered {dropped_short} observations that were not registered for at least {} days",
            self.config.min_duration_days
        );
        log_anomaly(dropped_invalid as u64, "registrations dropped for unparseable dates");

        let filtered = filter_record_batch(batch, &BooleanArray::from(mask))?;
        let selected = select_columns(&filtered, columns)?;

        let mut fields: Vec<Field> = selected
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields.push(Field::new(DURATION_COLUMN, DataType::Int64, false));
        fields.push(Field::new(YEAR_COLUMN, DataType::Int32, false));
        fields.push(Field::new(MONTH_COLUMN, DataType::Int32, false));

        let mut arrays: Vec<ArrayRef> = selected.columns().to_vec();
        arrays.push(Arc::new(Int64Array::from(durations)));
        arrays.push(Arc::new(Int32Array::from(years)));
        arrays.push(Arc::new(Int32Array::from(months)));

        Ok(FilteredEnrollment {
            batch: RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?,
            input_rows: batch.num_rows(),
            type_rows,
            dropped_short,
            dropped_invalid,
        })
    }
}

/// Sort rows by `sort_columns`, keeping input order among ties
///
/// Nulls sort last.
pub fn sort_enrollment(batch: &RecordBatch, sort_columns: &[String]) -> Result<RecordBatch> {
    if sort_columns.is_empty() || batch.num_rows() < 2 {
        return Ok(batch.clone());
    }
    require_columns(batch.schema().as_ref(), sort_columns, "enrollment sort")?;

    let options = SortOptions {
        descending: false,
        nulls_first: false,
    };
    let mut keys = sort_columns
        .iter()
        .map(|name| {
            let idx = batch.schema().index_of(name)?;
            Ok(SortColumn {
                values: batch.column(idx).clone(),
                options: Some(options),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let row_count = u32::try_from(batch.num_rows())
        .map_err(|_| NetworkError::config("table too large to sort in one batch"))?;
    keys.push(SortColumn {
        values: Arc::new(UInt32Array::from_iter_values(0..row_count)),
        options: Some(options),
    });

    let indices = lexsort_to_indices(&keys, None)?;
    Ok(take_record_batch(batch, &indices)?)
}

/// Keep rows whose trimmed value equals the given value for every criterion
///
/// Used to extract the final grade of primary school, where grade labels are
/// stored with padding (`" 8"`).
pub fn select_matching(batch: &RecordBatch, criteria: &[(String, String)]) -> Result<RecordBatch> {
    let columns: Vec<String> = criteria.iter().map(|(c, _)| c.clone()).collect();
    require_columns(batch.schema().as_ref(), &columns, "row selection")?;

    let mut mask = vec![true; batch.num_rows()];
    for (column, expected) in criteria {
        let values = string_column(batch, column)?;
        let expected = expected.trim();
        for (keep, value) in mask.iter_mut().zip(values.iter()) {
            *keep &= value.is_some_and(|v| v.trim() == expected);
        }
    }

    Ok(filter_record_batch(batch, &BooleanArray::from(mask))?)
}
