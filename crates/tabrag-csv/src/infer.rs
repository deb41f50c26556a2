//! Per-column type inference for raw CSV cells.

use chrono::{NaiveDate, NaiveDateTime};

use tabrag_core::{ColumnType, Value};

/// Cells read as missing values.
const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "None", "<NA>"];

/// Accepted datetime layouts, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Check whether a raw cell is a missing value.
pub fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw.trim())
}

fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Infer the type of a column from its raw cells.
///
/// A column without rows is text; a column whose cells are all missing is float.
pub fn infer_column_type<'a>(cells: impl IntoIterator<Item = &'a str>) -> ColumnType {
    let mut any_cell = false;
    let mut has_missing = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;
    let mut all_ts = true;

    for raw in cells {
        any_cell = true;
        if is_missing(raw) {
            has_missing = true;
            continue;
        }

        let trimmed = raw.trim();
        all_int &= trimmed.parse::<i64>().is_ok();
        all_float &= trimmed.parse::<f64>().is_ok();
        all_bool &= parse_bool(trimmed).is_some();
        all_ts &= parse_timestamp(trimmed).is_some();
    }

    if !any_cell {
        return ColumnType::Text;
    }

    if all_int {
        // Integers cannot hold a gap; the column widens to float.
        if has_missing {
            ColumnType::Float
        } else {
            ColumnType::Integer
        }
    } else if all_float {
        ColumnType::Float
    } else if all_bool && !has_missing {
        ColumnType::Boolean
    } else if all_ts {
        ColumnType::Timestamp
    } else {
        ColumnType::Text
    }
}

/// Convert a raw cell to a value of the inferred column type.
///
/// Text cells are kept verbatim; a cell that does not parse as its column type
/// falls back to text.
pub fn parse_cell(raw: &str, kind: ColumnType) -> Value {
    if is_missing(raw) {
        return Value::Null;
    }

    let trimmed = raw.trim();
    let parsed = match kind {
        ColumnType::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        ColumnType::Float => trimmed.parse::<f64>().ok().map(Value::Float),
        ColumnType::Boolean => parse_bool(trimmed).map(Value::Boolean),
        ColumnType::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        ColumnType::Text => None,
    };

    parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
}
