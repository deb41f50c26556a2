//! tabrag-csv - CSV loading
//!
//! This crate reads a CSV file (header row, comma delimiter, UTF-8) into a
//! [`RowSet`], inferring one primitive type per column.
//!
//! # Type inference
//!
//! A column is `integer` when every present cell parses as an integer, `float`
//! when every present cell parses as a number (or when an integer column has
//! missing cells), `boolean` for `true`/`false` columns without gaps,
//! `timestamp` for ISO-8601 dates and datetimes, and `text` otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabrag_csv::{read_csv, normalize_column_name};
//!
//! let mut rows = read_csv("Datasets/Cars.csv")?;
//! rows.rename_columns(normalize_column_name)?;
//! rows.prepend_identity("id");
//! ```

mod infer;
mod reader;

pub use infer::{infer_column_type, is_missing, parse_cell};
pub use reader::{
    normalize_column_name, read_csv, read_csv_from_reader, read_csv_text, read_csv_text_from_reader,
};

// Re-export types for convenience
pub use tabrag_core::{ColumnType, RowSet, Value};
