//! CSV file reading.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use csv::StringRecord;
use tabrag_core::{Column, ColumnType, RagError, Result, RowSet, Value};

use crate::infer::{infer_column_type, parse_cell};

/// Normalize a CSV header into a column name: trim, spaces to underscores, lowercase.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

/// Read a CSV file into a Row Set.
pub fn read_csv(path: impl AsRef<Path>) -> Result<RowSet> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let rows = read_csv_from_reader(file)?;

    info!(
        "Read {} rows x {} columns from {:?}",
        rows.len(),
        rows.columns().len(),
        path
    );
    Ok(rows)
}

/// Read a CSV file into an all-text Row Set, keeping every cell verbatim.
pub fn read_csv_text(path: impl AsRef<Path>) -> Result<RowSet> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let rows = read_csv_text_from_reader(file)?;

    info!("Read {} raw rows from {:?}", rows.len(), path);
    Ok(rows)
}

fn read_records<R: Read>(reader: R) -> Result<(Vec<String>, Vec<StringRecord>)> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| RagError::csv(format!("Failed to read header: {}", e)))?
        .iter()
        .map(String::from)
        .collect();

    let records = rdr
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RagError::csv(e.to_string()))?;

    Ok((headers, records))
}

/// Read CSV data from any reader. The first record is the header.
pub fn read_csv_from_reader<R: Read>(reader: R) -> Result<RowSet> {
    let (headers, records) = read_records(reader)?;

    let kinds: Vec<_> = (0..headers.len())
        .map(|i| infer_column_type(records.iter().map(|r| r.get(i).unwrap_or(""))))
        .collect();

    for (name, kind) in headers.iter().zip(&kinds) {
        debug!("Column {:?} inferred as {}", name, kind);
    }

    let columns = headers
        .into_iter()
        .zip(kinds.iter().copied())
        .map(|(name, kind)| Column::new(name, kind))
        .collect();

    let mut rows = RowSet::new(columns);
    for record in &records {
        let row = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| parse_cell(record.get(i).unwrap_or(""), *kind))
            .collect();
        rows.push_row(row)?;
    }

    Ok(rows)
}

/// Read CSV data without type inference: every column is text, every cell as written.
pub fn read_csv_text_from_reader<R: Read>(reader: R) -> Result<RowSet> {
    let (headers, records) = read_records(reader)?;

    let width = headers.len();
    let mut rows = RowSet::new(
        headers
            .into_iter()
            .map(|name| Column::new(name, ColumnType::Text))
            .collect(),
    );
    for record in &records {
        let row = (0..width)
            .map(|i| Value::Text(record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push_row(row)?;
    }

    Ok(rows)
}
