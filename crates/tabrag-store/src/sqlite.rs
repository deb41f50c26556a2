//! SQLite-based store implementation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Once;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use tracing::{debug, info, warn};

use tabrag_core::{
    BulkInsertPolicy, DatabaseConfig, Ident, RagError, Result, RowSet, Store, Value,
    TIMESTAMP_FORMAT,
};

use crate::chunks::PreparedQuery;
use crate::schema::insert_sql;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec as an auto-extension so every connection opened
/// afterwards has `vec0` and the `vec_*` functions.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// SQLite-based store.
///
/// Writes open a transaction that stays open until [`Store::commit`],
/// [`Store::rollback`] or [`SqliteStore::close`]. Dropping the store without
/// closing it rolls pending work back.
pub struct SqliteStore {
    conn: Connection,

    /// Partial-failure behaviour of `bulk_insert`.
    bulk_policy: BulkInsertPolicy,

    /// Rows per chunk for chunked fetches.
    fetch_batch_size: usize,
}

impl SqliteStore {
    /// Open or create the database described by `config`.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path.as_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        register_vec_extension();

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::store(format!("Failed to open database: {}", e)))?;

        Self::init(conn, config, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        register_vec_extension();

        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::store(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, &DatabaseConfig::default(), Path::new(":memory:"))
    }

    fn init(conn: Connection, config: &DatabaseConfig, path: &Path) -> Result<Self> {
        if config.fetch_batch_size == 0 {
            return Err(RagError::config("fetch_batch_size must be greater than 0"));
        }

        Self::configure_connection(&conn, config)?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn,
            bulk_policy: config.bulk_insert_policy,
            fetch_batch_size: config.fetch_batch_size,
        })
    }

    /// Configure SQLite connection from the database settings.
    fn configure_connection(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
        let journal_mode = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = {};
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = {};
            PRAGMA busy_timeout = {};
            PRAGMA temp_store = MEMORY;
            "#,
            journal_mode, config.cache_size, config.busy_timeout_ms
        ))
        .map_err(|e| RagError::store(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Replace the bulk insert policy.
    pub fn with_bulk_policy(mut self, policy: BulkInsertPolicy) -> Self {
        self.bulk_policy = policy;
        self
    }

    pub fn bulk_policy(&self) -> BulkInsertPolicy {
        self.bulk_policy
    }

    pub fn fetch_batch_size(&self) -> usize {
        self.fetch_batch_size
    }

    /// Check whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Prepare a query for chunked fetching.
    ///
    /// ```rust,ignore
    /// let mut stmt = store.prepare("SELECT * FROM cars")?;
    /// for chunk in stmt.chunks(&[])? {
    ///     let chunk = chunk?;
    /// }
    /// ```
    pub fn prepare(&self, sql: &str) -> Result<PreparedQuery<'_>> {
        let stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| RagError::store(e.to_string()))?;
        Ok(PreparedQuery::new(stmt, self.fetch_batch_size))
    }

    /// Commit pending work and release the connection.
    pub fn close(self) -> Result<()> {
        self.commit()?;
        self.conn
            .close()
            .map_err(|(_, e)| RagError::store(format!("Failed to close database: {}", e)))?;
        info!("Database closed");
        Ok(())
    }

    fn begin_if_needed(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| RagError::store(e.to_string()))?;
        }
        Ok(())
    }

    /// Insert one chunk of rows with a cached statement.
    fn insert_chunk(&self, sql: &str, rows: &[Vec<Value>], table: &Ident) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| RagError::store(format!("Failed to prepare insert into {}: {}", table, e)))?;

        for row in rows {
            stmt.execute(params_from_iter(row.iter().map(to_sql_value)))
                .map_err(|e| RagError::store(format!("Failed to insert into {}: {}", table, e)))?;
        }

        Ok(rows.len())
    }

    fn bulk_insert_chunk_commit(&self, sql: &str, rows: &RowSet, table: &Ident, chunk_size: usize) -> Result<usize> {
        // Loaded rows must not be tied to whatever the caller left open.
        self.commit()?;

        let mut inserted = 0;
        for (n, chunk) in rows.rows().chunks(chunk_size).enumerate() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| RagError::store(e.to_string()))?;

            match self.insert_chunk(sql, chunk, table) {
                Ok(count) => {
                    self.conn
                        .execute_batch("COMMIT")
                        .map_err(|e| RagError::store(e.to_string()))?;
                    inserted += count;
                    debug!("Committed chunk {} ({} rows) into {}", n, count, table);
                }
                Err(e) => {
                    if let Err(rb) = self.conn.execute_batch("ROLLBACK") {
                        warn!("Rollback of chunk {} failed: {}", n, rb);
                    }
                    warn!(
                        "Bulk insert into {} stopped at chunk {}; {} rows stay committed",
                        table, n, inserted
                    );
                    return Err(e);
                }
            }
        }

        Ok(inserted)
    }

    fn bulk_insert_all_or_nothing(&self, sql: &str, rows: &RowSet, table: &Ident, chunk_size: usize) -> Result<usize> {
        self.conn
            .execute_batch("SAVEPOINT bulk_insert")
            .map_err(|e| RagError::store(e.to_string()))?;

        let result = rows
            .rows()
            .chunks(chunk_size)
            .try_fold(0, |acc, chunk| self.insert_chunk(sql, chunk, table).map(|n| acc + n));

        match result {
            Ok(inserted) => {
                self.conn
                    .execute_batch("RELEASE bulk_insert")
                    .map_err(|e| RagError::store(e.to_string()))?;
                self.commit()?;
                Ok(inserted)
            }
            Err(e) => {
                if let Err(rb) = self
                    .conn
                    .execute_batch("ROLLBACK TO bulk_insert; RELEASE bulk_insert")
                {
                    warn!("Rollback of bulk insert into {} failed: {}", table, rb);
                }
                warn!("Bulk insert into {} rolled back", table);
                Err(e)
            }
        }
    }
}

impl Store for SqliteStore {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.begin_if_needed()?;

        let changed = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sql_value)))
            .map_err(|e| RagError::store(e.to_string()))?;

        debug!("Executed statement ({} rows changed)", changed);
        Ok(changed)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| RagError::store(e.to_string()))?;

        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = names.len();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql_value)))
            .map_err(|e| RagError::store(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| RagError::store(e.to_string()))? {
            out.push(read_row(row, width).map_err(|e| RagError::store(e.to_string()))?);
        }

        RowSet::from_rows(names, out)
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![name],
                |row| row.get(0),
            )
            .map_err(|e| RagError::store(e.to_string()))
    }

    fn columns_of(&self, name: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .map_err(|e| RagError::store(e.to_string()))?;

        let columns = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))
            .map_err(|e| RagError::store(e.to_string()))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .map_err(|e| RagError::store(e.to_string()))?;

        Ok(columns)
    }

    fn bulk_insert(&self, rows: &RowSet, table: &Ident, chunk_size: usize) -> Result<usize> {
        if chunk_size == 0 {
            return Err(RagError::invalid_argument("chunk_size must be greater than 0"));
        }

        let columns = rows
            .columns()
            .iter()
            .map(|c| Ident::new(c.name.clone()))
            .collect::<Result<Vec<_>>>()?;
        let sql = insert_sql(table, &columns);

        let inserted = match self.bulk_policy {
            BulkInsertPolicy::ChunkCommit => {
                self.bulk_insert_chunk_commit(&sql, rows, table, chunk_size)?
            }
            BulkInsertPolicy::AllOrNothing => {
                self.bulk_insert_all_or_nothing(&sql, rows, table, chunk_size)?
            }
        };

        info!("Inserted {} rows into {}", inserted, table);
        Ok(inserted)
    }

    fn ensure_vector_extension(&self) -> Result<()> {
        register_vec_extension();

        let version: String = self
            .conn
            .query_row("SELECT vec_version()", [], |row| row.get(0))
            .map_err(|e| RagError::store(format!("Vector extension unavailable: {}", e)))?;

        debug!("sqlite-vec {} available", version);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| RagError::store(e.to_string()))?;
            debug!("Committed transaction");
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(|e| RagError::store(e.to_string()))?;
            debug!("Rolled back transaction");
        }
        Ok(())
    }
}

/// Convert f32 vector to bytes (little-endian), the sqlite-vec blob layout.
pub fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Timestamp(ts) => SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        Value::Vector(v) => SqlValue::Blob(vec_to_bytes(v)),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

pub(crate) fn read_row(row: &Row<'_>, width: usize) -> rusqlite::Result<Vec<Value>> {
    (0..width)
        .map(|i| row.get_ref(i).map(from_value_ref))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabrag_core::{Column, ColumnType};

    fn people(ids: &[i64]) -> RowSet {
        let rows = ids
            .iter()
            .map(|id| vec![Value::Integer(*id), Value::Text(format!("person {}", id))])
            .collect();
        RowSet::from_rows(vec!["id".into(), "name".into()], rows).unwrap()
    }

    fn people_table(store: &SqliteStore) -> Ident {
        store
            .execute(
                "CREATE TABLE \"people\" (\"id\" integer PRIMARY KEY, \"name\" text)",
                &[],
            )
            .unwrap();
        store.commit().unwrap();
        Ident::new("people").unwrap()
    }

    fn count(store: &SqliteStore, table: &str) -> i64 {
        let rows = store
            .query(&format!("SELECT COUNT(*) AS n FROM \"{}\"", table), &[])
            .unwrap();
        rows.rows()[0][0].as_i64().unwrap()
    }

    #[test]
    fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(!store.table_exists("people").unwrap());
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_execute_and_query() {
        let store = SqliteStore::open_memory().unwrap();
        people_table(&store);

        store
            .execute(
                "INSERT INTO people (id, name) VALUES (?1, ?2)",
                &[Value::Integer(7), Value::from("Ada")],
            )
            .unwrap();

        let rows = store
            .query("SELECT id, name FROM people WHERE id = ?1", &[Value::Integer(7)])
            .unwrap();
        assert_eq!(rows.column_names(), vec!["id", "name"]);
        assert_eq!(rows.columns()[0].kind, ColumnType::Integer);
        assert_eq!(rows.rows()[0], vec![Value::Integer(7), Value::from("Ada")]);
    }

    #[test]
    fn test_no_implicit_commit() {
        let store = SqliteStore::open_memory().unwrap();
        people_table(&store);

        store
            .execute("INSERT INTO people (id, name) VALUES (1, 'a')", &[])
            .unwrap();
        assert!(store.in_transaction());

        store.rollback().unwrap();
        assert_eq!(count(&store, "people"), 0);

        store
            .execute("INSERT INTO people (id, name) VALUES (1, 'a')", &[])
            .unwrap();
        store.commit().unwrap();
        store.rollback().unwrap();
        assert_eq!(count(&store, "people"), 1);
    }

    #[test]
    fn test_invalid_statement_is_store_error() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store.execute("CREATE TABLE", &[]).unwrap_err();
        assert_eq!(err.error_code(), "STORE_ERROR");

        let err = store.query("SELECT * FROM nowhere", &[]).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_table_introspection() {
        let store = SqliteStore::open_memory().unwrap();
        people_table(&store);

        assert!(store.table_exists("people").unwrap());
        let columns: Vec<String> = store.columns_of("people").unwrap().into_iter().collect();
        assert_eq!(columns, vec!["id".to_string(), "name".to_string()]);
        assert!(store.columns_of("missing").unwrap().is_empty());
    }

    #[test]
    fn test_bulk_insert_in_chunks() {
        let store = SqliteStore::open_memory().unwrap();
        let table = people_table(&store);

        let inserted = store.bulk_insert(&people(&[1, 2, 3, 4, 5]), &table, 2).unwrap();
        assert_eq!(inserted, 5);
        assert_eq!(count(&store, "people"), 5);
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_bulk_insert_zero_chunk_size() {
        let store = SqliteStore::open_memory().unwrap();
        let table = people_table(&store);
        let err = store.bulk_insert(&people(&[1]), &table, 0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_chunk_commit_keeps_earlier_chunks() {
        let store = SqliteStore::open_memory().unwrap();
        let table = people_table(&store);

        // Second chunk repeats id 3.
        let err = store
            .bulk_insert(&people(&[1, 2, 3, 3, 5]), &table, 2)
            .unwrap_err();
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert_eq!(count(&store, "people"), 2);
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_all_or_nothing_rolls_back() {
        let store = SqliteStore::open_memory()
            .unwrap()
            .with_bulk_policy(BulkInsertPolicy::AllOrNothing);
        let table = people_table(&store);

        assert!(store.bulk_insert(&people(&[1, 2, 3, 3, 5]), &table, 2).is_err());
        assert_eq!(count(&store, "people"), 0);

        assert_eq!(store.bulk_insert(&people(&[1, 2, 3]), &table, 2).unwrap(), 3);
        assert_eq!(count(&store, "people"), 3);
    }

    #[test]
    fn test_bulk_insert_unknown_column() {
        let store = SqliteStore::open_memory().unwrap();
        let table = people_table(&store);

        let mut rows = RowSet::new(vec![
            Column::new("id", ColumnType::Integer),
            Column::new("colour", ColumnType::Text),
        ]);
        rows.push_row(vec![Value::Integer(1), Value::from("red")]).unwrap();

        let err = store.bulk_insert(&rows, &table, 10).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_value_round_trip_types() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .execute(
                "CREATE TABLE t (flag boolean, at timestamp, price numeric, v blob)",
                &[],
            )
            .unwrap();
        let ts = chrono_ts();
        store
            .execute(
                "INSERT INTO t VALUES (?1, ?2, ?3, ?4)",
                &[
                    Value::Boolean(true),
                    Value::Timestamp(ts),
                    Value::Float(19990.5),
                    Value::Vector(vec![1.0, 2.0]),
                ],
            )
            .unwrap();

        let rows = store.query("SELECT * FROM t", &[]).unwrap();
        let row = &rows.rows()[0];
        assert_eq!(row[0], Value::Integer(1));
        assert_eq!(row[1], Value::Text("2024-03-01 12:00:00".to_string()));
        assert_eq!(row[2], Value::Float(19990.5));
        assert_eq!(row[3], Value::Blob(vec_to_bytes(&[1.0, 2.0])));
    }

    fn chrono_ts() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_vector_extension() {
        let store = SqliteStore::open_memory().unwrap();
        store.ensure_vector_extension().unwrap();
        store.ensure_vector_extension().unwrap();

        store
            .execute(
                "CREATE VIRTUAL TABLE v USING vec0(id integer primary key, embedding float[2])",
                &[],
            )
            .unwrap();
        assert!(store.table_exists("v").unwrap());
    }

    #[test]
    fn test_close_commits_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("store.db"),
            ..DatabaseConfig::default()
        };

        let store = SqliteStore::open(&config).unwrap();
        people_table(&store);
        store
            .execute("INSERT INTO people (id, name) VALUES (1, 'kept')", &[])
            .unwrap();
        store.close().unwrap();

        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(count(&store, "people"), 1);
    }
}
