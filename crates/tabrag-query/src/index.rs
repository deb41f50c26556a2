//! Vector and full-text search indexes over a prepared table.

use tracing::{debug, info};

use tabrag_core::{Ident, IndexCreation, RagError, Result, Store};

/// Name of the embedding column written by `attach_embeddings`.
pub const EMBEDDING_COLUMN: &str = "embedding";

/// A prepared table and the two text columns retrieval works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub table: Ident,

    /// Column rendered as each source's heading.
    pub title_column: Ident,

    /// Column rendered as each source's body.
    pub body_column: Ident,
}

impl SearchTarget {
    pub fn new(table: &str, title_column: &str, body_column: &str) -> Result<Self> {
        Ok(Self {
            table: Ident::new(table)?,
            title_column: Ident::new(title_column)?,
            body_column: Ident::new(body_column)?,
        })
    }

    /// The `vec0` table holding the embeddings.
    pub fn vector_index(&self) -> Result<Ident> {
        self.table.with_suffix("_vec")
    }

    /// The FTS5 table over the title and body columns.
    pub fn fulltext_index(&self) -> Result<Ident> {
        self.table.with_suffix("_fts")
    }
}

/// Which indexes a call to [`ensure_search_index`] built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStatus {
    pub vector_created: bool,
    pub fulltext_created: bool,
}

/// Make sure both search indexes exist for `target`.
///
/// With [`IndexCreation::Unguarded`] the indexes are created unconditionally
/// and a second call fails with a store error. With
/// [`IndexCreation::Guarded`] an existing index is left untouched.
pub fn ensure_search_index<S: Store>(
    store: &S,
    target: &SearchTarget,
    dimensions: usize,
    creation: IndexCreation,
) -> Result<IndexStatus> {
    store.ensure_vector_extension()?;

    let result = create_indexes(store, target, dimensions, creation);
    match result {
        Ok(status) => {
            store.commit()?;
            Ok(status)
        }
        Err(e) => {
            store.rollback()?;
            Err(e)
        }
    }
}

fn create_indexes<S: Store>(
    store: &S,
    target: &SearchTarget,
    dimensions: usize,
    creation: IndexCreation,
) -> Result<IndexStatus> {
    let vec_table = target.vector_index()?;
    let fts_table = target.fulltext_index()?;
    let guarded = creation == IndexCreation::Guarded;

    let mut status = IndexStatus::default();

    if guarded && store.table_exists(vec_table.as_str())? {
        debug!("Vector index {} exists, skipping", vec_table);
    } else {
        if !store.columns_of(target.table.as_str())?.contains(EMBEDDING_COLUMN) {
            return Err(RagError::schema(
                target.table.as_str(),
                "no embedding column; attach embeddings before indexing",
            ));
        }

        store.execute(&vector_index_sql(&vec_table, dimensions), &[])?;
        let rows = store.execute(&populate_vector_index_sql(&vec_table, &target.table), &[])?;
        status.vector_created = true;
        info!("Created vector index {} ({} rows)", vec_table, rows);
    }

    if guarded && store.table_exists(fts_table.as_str())? {
        debug!("Full-text index {} exists, skipping", fts_table);
    } else {
        store.execute(&fulltext_index_sql(&fts_table, target), &[])?;
        store.execute(&rebuild_fulltext_index_sql(&fts_table), &[])?;
        status.fulltext_created = true;
        info!("Created full-text index {}", fts_table);
    }

    Ok(status)
}

/// `vec0` table with cosine distance over `dimensions` floats.
pub fn vector_index_sql(vec_table: &Ident, dimensions: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE {} USING vec0(id integer primary key, {} float[{}] distance_metric=cosine)",
        vec_table.quoted(),
        EMBEDDING_COLUMN,
        dimensions
    )
}

pub fn populate_vector_index_sql(vec_table: &Ident, table: &Ident) -> String {
    format!(
        "INSERT INTO {vec} (id, {col}) SELECT id, {col} FROM {table} WHERE {col} IS NOT NULL",
        vec = vec_table.quoted(),
        col = EMBEDDING_COLUMN,
        table = table.quoted(),
    )
}

/// External-content FTS5 table over the title and body columns.
pub fn fulltext_index_sql(fts_table: &Ident, target: &SearchTarget) -> String {
    format!(
        "CREATE VIRTUAL TABLE {} USING fts5({}, {}, content='{}', content_rowid='id', tokenize='porter unicode61')",
        fts_table.quoted(),
        target.title_column.quoted(),
        target.body_column.quoted(),
        target.table
    )
}

pub fn rebuild_fulltext_index_sql(fts_table: &Ident) -> String {
    format!(
        "INSERT INTO {fts}({fts}) VALUES('rebuild')",
        fts = fts_table.quoted()
    )
}
