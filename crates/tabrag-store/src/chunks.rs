//! Chunked fetching of large result sets.

use std::iter::FusedIterator;

use rusqlite::{params_from_iter, Rows, Statement};

use tabrag_core::{RagError, Result, RowSet, Value};

use crate::sqlite::{read_row, to_sql_value};

/// A prepared statement whose results are pulled in bounded Row Sets.
pub struct PreparedQuery<'conn> {
    stmt: Statement<'conn>,
    columns: Vec<String>,
    batch_size: usize,
}

impl<'conn> PreparedQuery<'conn> {
    pub(crate) fn new(stmt: Statement<'conn>, batch_size: usize) -> Self {
        let columns = stmt.column_names().into_iter().map(String::from).collect();
        Self {
            stmt,
            columns,
            batch_size,
        }
    }

    /// Override the rows-per-chunk of this query. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Run the query, yielding Row Sets of at most the batch size.
    pub fn chunks(&mut self, params: &[Value]) -> Result<RowSetChunks<'_>> {
        let rows = self
            .stmt
            .query(params_from_iter(params.iter().map(to_sql_value)))
            .map_err(|e| RagError::store(e.to_string()))?;

        Ok(RowSetChunks {
            rows,
            columns: &self.columns,
            batch_size: self.batch_size.max(1),
            done: false,
        })
    }
}

/// Iterator over the chunks of a running query.
pub struct RowSetChunks<'stmt> {
    rows: Rows<'stmt>,
    columns: &'stmt [String],
    batch_size: usize,
    done: bool,
}

impl RowSetChunks<'_> {
    fn next_batch(&mut self) -> Result<Vec<Vec<Value>>> {
        let width = self.columns.len();
        let mut batch = Vec::with_capacity(self.batch_size.min(1024));

        while batch.len() < self.batch_size {
            match self.rows.next().map_err(|e| RagError::store(e.to_string()))? {
                Some(row) => {
                    batch.push(read_row(row, width).map_err(|e| RagError::store(e.to_string()))?)
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        Ok(batch)
    }
}

impl Iterator for RowSetChunks<'_> {
    type Item = Result<RowSet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_batch() {
            Ok(batch) if batch.is_empty() => None,
            Ok(batch) => Some(RowSet::from_rows(self.columns.to_vec(), batch)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for RowSetChunks<'_> {}

#[cfg(test)]
mod tests {
    use crate::SqliteStore;
    use tabrag_core::{Store, Value};

    fn numbers(store: &SqliteStore, n: i64) {
        store
            .execute("CREATE TABLE numbers (n integer PRIMARY KEY, label text)", &[])
            .unwrap();
        for i in 1..=n {
            store
                .execute(
                    "INSERT INTO numbers VALUES (?1, ?2)",
                    &[Value::Integer(i), Value::Text(format!("n{}", i))],
                )
                .unwrap();
        }
        store.commit().unwrap();
    }

    #[test]
    fn test_chunk_sizes() {
        let store = SqliteStore::open_memory().unwrap();
        numbers(&store, 7);

        let mut query = store
            .prepare("SELECT n, label FROM numbers ORDER BY n")
            .unwrap()
            .with_batch_size(3);
        let sizes: Vec<usize> = query
            .chunks(&[])
            .unwrap()
            .map(|chunk| chunk.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_chunks_preserve_order_and_columns() {
        let store = SqliteStore::open_memory().unwrap();
        numbers(&store, 4);

        let mut query = store
            .prepare("SELECT n, label FROM numbers WHERE n > ?1 ORDER BY n")
            .unwrap()
            .with_batch_size(2);
        assert_eq!(query.column_names(), ["n", "label"]);

        let chunks: Vec<_> = query
            .chunks(&[Value::Integer(1)])
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].column_names(), vec!["n", "label"]);
        assert_eq!(chunks[0].rows()[0][0], Value::Integer(2));
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks[1].rows()[0][1], Value::Text("n4".into()));
    }

    #[test]
    fn test_empty_result_yields_nothing() {
        let store = SqliteStore::open_memory().unwrap();
        numbers(&store, 0);

        let mut query = store.prepare("SELECT * FROM numbers").unwrap();
        assert_eq!(query.chunks(&[]).unwrap().count(), 0);
    }

    #[test]
    fn test_default_batch_size_from_store() {
        let store = SqliteStore::open_memory().unwrap();
        numbers(&store, 5);

        let mut query = store.prepare("SELECT * FROM numbers").unwrap();
        let mut chunks = query.chunks(&[]).unwrap();
        assert_eq!(chunks.next().unwrap().unwrap().len(), 5);
        assert!(chunks.next().is_none());
        assert!(chunks.next().is_none());
    }
}
