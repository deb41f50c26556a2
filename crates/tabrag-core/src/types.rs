//! Core domain types: cells, row sets, table schemas and retrieval results.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::ident::Ident;

/// Text form used when a timestamp is written to or read from the store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    /// Embedding vector, stored as little-endian `f32` bytes.
    Vector(Vec<f32>),
    Blob(Vec<u8>),
}

impl Value {
    /// Check for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view, if this cell holds one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view, if this cell holds text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Self::Vector(v) => write!(f, "<vector[{}]>", v.len()),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Self::Vector(v)
    }
}

/// Primitive type of a Row Set column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Timestamp,
    Boolean,
}

impl ColumnType {
    /// Store type a column of this kind is declared with.
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Integer => SqlType::Integer,
            Self::Float => SqlType::Numeric,
            Self::Text => SqlType::Text,
            Self::Timestamp => SqlType::Timestamp,
            Self::Boolean => SqlType::Boolean,
        }
    }

    /// Infer a column type from already-typed values (query results).
    ///
    /// Nulls are ignored; an all-null column is text.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut seen_int = false;
        let mut seen_float = false;
        let mut seen_bool = false;
        let mut seen_ts = false;
        let mut seen_other = false;

        for value in values {
            match value {
                Value::Null => {}
                Value::Integer(_) => seen_int = true,
                Value::Float(_) => seen_float = true,
                Value::Boolean(_) => seen_bool = true,
                Value::Timestamp(_) => seen_ts = true,
                _ => seen_other = true,
            }
        }

        match (seen_int, seen_float, seen_bool, seen_ts, seen_other) {
            (true, false, false, false, false) => Self::Integer,
            (_, true, false, false, false) => Self::Float,
            (false, false, true, false, false) => Self::Boolean,
            (false, false, false, true, false) => Self::Timestamp,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// A named, typed Row Set column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// An in-memory table: ordered named columns and ordered rows.
///
/// Every row holds exactly one value per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create an empty Row Set with the given columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a Row Set from column names and rows, inferring column types.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != names.len()) {
            return Err(RagError::invalid_argument(format!(
                "row {} has {} values, expected {}",
                bad,
                rows[bad].len(),
                names.len()
            )));
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = ColumnType::infer(rows.iter().map(|r| &r[i]));
                Column::new(name, kind)
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(RagError::invalid_argument(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Column names as a set, for order-independent comparison.
    pub fn column_name_set(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Values of one column, in row order.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Put an integer identity column `name` first, numbered `1..=len()` in row order.
    ///
    /// A column that already carries the name is replaced.
    pub fn prepend_identity(&mut self, name: &str) {
        if let Some(idx) = self.column_index(name) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }

        self.columns.insert(0, Column::new(name, ColumnType::Integer));
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.insert(0, Value::Integer(i as i64 + 1));
        }
    }

    /// Rename every column through `f`; renamed columns must stay unique.
    pub fn rename_columns(&mut self, f: impl Fn(&str) -> String) -> Result<()> {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(&c.name)).collect();

        let mut seen = HashSet::new();
        for name in &renamed {
            if !seen.insert(name.as_str()) {
                return Err(RagError::invalid_argument(format!(
                    "duplicate column name after renaming: {}",
                    name
                )));
            }
        }

        for (column, name) in self.columns.iter_mut().zip(renamed) {
            column.name = name;
        }
        Ok(())
    }
}

/// Declared store type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Integer,
    Numeric,
    Text,
    Timestamp,
    Boolean,
    Blob,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Numeric => "numeric",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::Blob => "blob",
        }
    }
}

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: Ident,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: Ident, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
        }
    }

    pub fn primary_key(name: Ident, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: true,
        }
    }

    /// Type string as it appears in DDL, e.g. `integer PRIMARY KEY`.
    pub fn declaration(&self) -> String {
        if self.primary_key {
            format!("{} PRIMARY KEY", self.sql_type.as_sql())
        } else {
            self.sql_type.as_sql().to_string()
        }
    }
}

/// Ordered column definitions of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Build a schema; names must be unique and at most one column may be the key.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        if columns.is_empty() {
            return Err(RagError::invalid_argument("table schema has no columns"));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(RagError::invalid_argument(format!(
                    "duplicate column in schema: {}",
                    column.name
                )));
            }
        }

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(RagError::invalid_argument(
                "table schema declares more than one primary key",
            ));
        }

        Ok(Self { columns })
    }

    /// Derive a schema from a Row Set: the first column is `integer PRIMARY KEY`,
    /// the rest follow the column type mapping.
    pub fn from_row_set(rows: &RowSet) -> Result<Self> {
        let columns = rows
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let name = Ident::new(column.name.clone())?;
                Ok(if i == 0 {
                    ColumnDef::primary_key(name, SqlType::Integer)
                } else {
                    ColumnDef::new(name, column.kind.sql_type())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(columns)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Columns that differ between a Row Set and a live table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaMismatch {
    /// Present in the Row Set, missing from the table.
    pub only_in_rows: BTreeSet<String>,

    /// Present in the table, missing from the Row Set.
    pub only_in_table: BTreeSet<String>,
}

impl SchemaMismatch {
    /// Compare two column sets; `None` when they are equal.
    pub fn between(rows: &BTreeSet<String>, table: &BTreeSet<String>) -> Option<Self> {
        if rows == table {
            return None;
        }
        Some(Self {
            only_in_rows: rows.difference(table).cloned().collect(),
            only_in_table: table.difference(rows).cloned().collect(),
        })
    }
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        write!(
            f,
            "columns only in rows: [{}]; columns only in table: [{}]",
            join(&self.only_in_rows),
            join(&self.only_in_table)
        )
    }
}

/// Result of loading a Row Set into a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Column sets matched and this many rows were inserted.
    Loaded { rows: usize },

    /// Column sets differed; nothing was inserted.
    Mismatch(SchemaMismatch),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

/// A fused retrieval candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identity column value of the row.
    pub id: i64,

    /// Sum of reciprocal-rank contributions.
    pub score: f64,

    /// Rank in the vector ranking, if the row made it.
    pub semantic_rank: Option<u32>,

    /// Rank in the full-text ranking, if the row made it.
    pub keyword_rank: Option<u32>,
}

/// A retrieved row rendered into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub id: i64,
    pub title: String,
    pub body: String,
}

/// Generated answer and the candidates it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The question as asked.
    pub question: String,

    /// Model output, verbatim.
    pub text: String,

    /// Fused candidates, best first.
    pub candidates: Vec<Candidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cars() -> RowSet {
        let mut rows = RowSet::new(vec![
            Column::new("Make", ColumnType::Text),
            Column::new("Price", ColumnType::Integer),
        ]);
        rows.push_row(vec!["Honda".into(), Value::Integer(21000)]).unwrap();
        rows.push_row(vec!["Kia".into(), Value::Integer(18000)]).unwrap();
        rows.push_row(vec!["Ford".into(), Value::Integer(30000)]).unwrap();
        rows
    }

    #[test]
    fn test_prepend_identity() {
        let mut rows = cars();
        rows.prepend_identity("id");

        assert_eq!(rows.column_names(), vec!["id", "Make", "Price"]);
        let ids: Vec<i64> = rows
            .column_values("id")
            .unwrap()
            .filter_map(Value::as_i64)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_prepend_identity_replaces_existing() {
        let mut rows = RowSet::new(vec![
            Column::new("name", ColumnType::Text),
            Column::new("id", ColumnType::Integer),
        ]);
        rows.push_row(vec!["a".into(), Value::Integer(77)]).unwrap();
        rows.push_row(vec!["b".into(), Value::Integer(77)]).unwrap();
        rows.prepend_identity("id");

        assert_eq!(rows.column_names(), vec!["id", "name"]);
        assert_eq!(rows.rows()[1], vec![Value::Integer(2), Value::Text("b".into())]);
    }

    #[test]
    fn test_rename_columns_rejects_duplicates() {
        let mut rows = RowSet::new(vec![
            Column::new("Make", ColumnType::Text),
            Column::new("make ", ColumnType::Text),
        ]);
        let err = rows
            .rename_columns(|n| n.trim().to_lowercase())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_push_row_arity() {
        let mut rows = cars();
        assert!(rows.push_row(vec![Value::Null]).is_err());
    }

    #[test]
    fn test_infer_from_values() {
        let ints = [Value::Integer(1), Value::Null, Value::Integer(3)];
        assert_eq!(ColumnType::infer(&ints), ColumnType::Integer);

        let mixed = [Value::Integer(1), Value::Float(2.5)];
        assert_eq!(ColumnType::infer(&mixed), ColumnType::Float);

        let text = [Value::Integer(1), Value::Text("x".into())];
        assert_eq!(ColumnType::infer(&text), ColumnType::Text);

        assert_eq!(ColumnType::infer(&[Value::Null]), ColumnType::Text);
    }

    #[test]
    fn test_schema_from_row_set() {
        let mut rows = cars();
        rows.prepend_identity("id");
        rows.rename_columns(|n| n.to_lowercase()).unwrap();

        let schema = TableSchema::from_row_set(&rows).unwrap();
        let decls: Vec<String> = schema.columns().iter().map(|c| c.declaration()).collect();
        assert_eq!(schema.column_names(), vec!["id", "make", "price"]);
        assert_eq!(decls, vec!["integer PRIMARY KEY", "text", "integer"]);
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(ColumnType::Integer.sql_type().as_sql(), "integer");
        assert_eq!(ColumnType::Float.sql_type().as_sql(), "numeric");
        assert_eq!(ColumnType::Text.sql_type().as_sql(), "text");
        assert_eq!(ColumnType::Timestamp.sql_type().as_sql(), "timestamp");
        assert_eq!(ColumnType::Boolean.sql_type().as_sql(), "boolean");
    }

    #[test]
    fn test_schema_rejects_invalid_column() {
        let rows = RowSet::new(vec![
            Column::new("id", ColumnType::Integer),
            Column::new("price_($)", ColumnType::Float),
        ]);
        let err = TableSchema::from_row_set(&rows).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_IDENTIFIER");
    }

    #[test]
    fn test_schema_mismatch_between() {
        let rows: BTreeSet<String> = ["id", "make", "colour"].iter().map(|s| s.to_string()).collect();
        let table: BTreeSet<String> = ["id", "make", "price"].iter().map(|s| s.to_string()).collect();

        assert!(SchemaMismatch::between(&rows, &rows).is_none());

        let mismatch = SchemaMismatch::between(&rows, &table).unwrap();
        assert_eq!(mismatch.only_in_rows.iter().collect::<Vec<_>>(), vec!["colour"]);
        assert_eq!(mismatch.only_in_table.iter().collect::<Vec<_>>(), vec!["price"]);
        assert_eq!(
            mismatch.to_string(),
            "columns only in rows: [colour]; columns only in table: [price]"
        );
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(21000.0).to_string(), "21000");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Vector(vec![0.0; 4]).to_string(), "<vector[4]>");
    }
}
