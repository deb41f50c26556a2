//! Table creation and Row Set loading.

use tracing::{info, warn};

use tabrag_core::{Ident, LoadOutcome, RagError, Result, RowSet, SchemaMismatch, Store, TableSchema};

/// `CREATE TABLE` statement for a schema.
pub fn create_table_sql(table: &Ident, schema: &TableSchema) -> String {
    let columns = schema
        .columns()
        .iter()
        .map(|c| format!("{} {}", c.name.quoted(), c.declaration()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", table.quoted(), columns)
}

/// Positional `INSERT` statement for the given columns.
pub fn insert_sql(table: &Ident, columns: &[Ident]) -> String {
    let names = columns
        .iter()
        .map(Ident::quoted)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.quoted(),
        names,
        placeholders
    )
}

/// Creates tables and loads Row Sets into them.
pub struct SchemaBuilder<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> SchemaBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Create `table` with `schema` and commit.
    ///
    /// Fails with a schema error if the table already exists. A failed
    /// statement is undone through a savepoint, so earlier uncommitted work
    /// stays pending.
    pub fn create_table(&self, table: &Ident, schema: &TableSchema) -> Result<()> {
        let sql = create_table_sql(table, schema);

        self.store.execute("SAVEPOINT create_table", &[])?;
        if let Err(e) = self.store.execute(&sql, &[]) {
            self.store.execute("ROLLBACK TO create_table", &[])?;
            self.store.execute("RELEASE create_table", &[])?;
            return Err(RagError::schema(table.as_str(), e.to_string()));
        }
        self.store.execute("RELEASE create_table", &[])?;
        self.store.commit()?;

        info!(
            "Created table {} ({} columns)",
            table,
            schema.columns().len()
        );
        Ok(())
    }

    /// Load `rows` into an existing table.
    ///
    /// When the Row Set's column names differ from the table's (as sets), no
    /// row is written and the difference is reported.
    pub fn load_from_rowset(&self, table: &Ident, rows: &RowSet, chunk_size: usize) -> Result<LoadOutcome> {
        let table_columns = self.store.columns_of(table.as_str())?;
        if table_columns.is_empty() {
            return Err(RagError::schema(table.as_str(), "table does not exist"));
        }

        if let Some(mismatch) = SchemaMismatch::between(&rows.column_name_set(), &table_columns) {
            warn!("Not loading {}: {}", table, mismatch);
            return Ok(LoadOutcome::Mismatch(mismatch));
        }

        let inserted = self.store.bulk_insert(rows, table, chunk_size)?;
        Ok(LoadOutcome::Loaded { rows: inserted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;
    use tabrag_core::{Column, ColumnType, Value};

    fn cars() -> RowSet {
        let mut rows = RowSet::new(vec![
            Column::new("make", ColumnType::Text),
            Column::new("price", ColumnType::Integer),
        ]);
        rows.push_row(vec!["Honda".into(), Value::Integer(27295)]).unwrap();
        rows.push_row(vec!["Kia".into(), Value::Integer(19990)]).unwrap();
        rows.push_row(vec!["Ford".into(), Value::Null]).unwrap();
        rows.prepend_identity("id");
        rows
    }

    #[test]
    fn test_create_table_sql() {
        let schema = TableSchema::from_row_set(&cars()).unwrap();
        let table = Ident::new("cars").unwrap();
        assert_eq!(
            create_table_sql(&table, &schema),
            r#"CREATE TABLE "cars" ("id" integer PRIMARY KEY, "make" text, "price" integer)"#
        );
    }

    #[test]
    fn test_insert_sql() {
        let table = Ident::new("cars").unwrap();
        let columns = vec![Ident::new("id").unwrap(), Ident::new("make").unwrap()];
        assert_eq!(
            insert_sql(&table, &columns),
            r#"INSERT INTO "cars" ("id", "make") VALUES (?1, ?2)"#
        );
    }

    #[test]
    fn test_create_and_load() {
        let store = SqliteStore::open_memory().unwrap();
        let builder = SchemaBuilder::new(&store);
        let rows = cars();
        let table = Ident::new("cars").unwrap();

        builder
            .create_table(&table, &TableSchema::from_row_set(&rows).unwrap())
            .unwrap();
        assert!(store.table_exists("cars").unwrap());

        let outcome = builder.load_from_rowset(&table, &rows, 2).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { rows: 3 });

        let stored = store
            .query("SELECT id, make, price FROM cars ORDER BY id", &[])
            .unwrap();
        assert_eq!(stored.rows()[1][1], Value::Text("Kia".into()));
        assert_eq!(stored.rows()[2][2], Value::Null);
    }

    #[test]
    fn test_create_existing_table_is_schema_error() {
        let store = SqliteStore::open_memory().unwrap();
        let builder = SchemaBuilder::new(&store);
        let schema = TableSchema::from_row_set(&cars()).unwrap();
        let table = Ident::new("cars").unwrap();

        builder.create_table(&table, &schema).unwrap();
        let err = builder.create_table(&table, &schema).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_failed_create_keeps_pending_work() {
        let store = SqliteStore::open_memory().unwrap();
        let builder = SchemaBuilder::new(&store);
        let schema = TableSchema::from_row_set(&cars()).unwrap();
        let table = Ident::new("cars").unwrap();
        builder.create_table(&table, &schema).unwrap();

        store.execute("CREATE TABLE notes (body text)", &[]).unwrap();
        store
            .execute("INSERT INTO notes VALUES (?1)", &["pending".into()])
            .unwrap();
        assert!(store.in_transaction());

        let err = builder.create_table(&table, &schema).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        store.commit().unwrap();
        let notes = store.query("SELECT body FROM notes", &[]).unwrap();
        assert_eq!(notes.rows()[0][0], Value::from("pending"));
    }

    #[test]
    fn test_mismatch_inserts_nothing() {
        let store = SqliteStore::open_memory().unwrap();
        let builder = SchemaBuilder::new(&store);
        let table = Ident::new("cars").unwrap();
        builder
            .create_table(&table, &TableSchema::from_row_set(&cars()).unwrap())
            .unwrap();

        let mut other = RowSet::new(vec![
            Column::new("make", ColumnType::Text),
            Column::new("colour", ColumnType::Text),
        ]);
        other.push_row(vec!["Kia".into(), "red".into()]).unwrap();
        other.prepend_identity("id");

        match builder.load_from_rowset(&table, &other, 10).unwrap() {
            LoadOutcome::Mismatch(m) => {
                assert!(m.only_in_rows.contains("colour"));
                assert!(m.only_in_table.contains("price"));
            }
            outcome => panic!("expected mismatch, got {:?}", outcome),
        }

        let count = store.query("SELECT COUNT(*) FROM cars", &[]).unwrap();
        assert_eq!(count.rows()[0][0], Value::Integer(0));
    }

    #[test]
    fn test_load_into_missing_table() {
        let store = SqliteStore::open_memory().unwrap();
        let builder = SchemaBuilder::new(&store);
        let table = Ident::new("ghost").unwrap();
        let err = builder.load_from_rowset(&table, &cars(), 10).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .execute("CREATE TABLE cars (price integer, id integer PRIMARY KEY, make text)", &[])
            .unwrap();
        store.commit().unwrap();

        let builder = SchemaBuilder::new(&store);
        let table = Ident::new("cars").unwrap();
        let outcome = builder.load_from_rowset(&table, &cars(), 10).unwrap();
        assert!(outcome.is_loaded());
    }
}
