//! Arrow data handling utilities
//!
//! Helpers for locating, casting and selecting columns of record batches.

pub mod array_utils;

pub use array_utils::{
    TextColumns, concat, missing_columns, require_columns, select_columns, string_column,
};
