//! Core traits defining the interfaces between components.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::ident::Ident;
use crate::types::{RowSet, Value};

/// Relational store adapter.
///
/// Calls block until the driver returns. Writes are not committed until
/// [`Store::commit`] is called.
pub trait Store {
    /// Run a statement with positional parameters, returning affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Run a query and materialize every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet>;

    /// Check whether a table (or virtual table) exists.
    fn table_exists(&self, name: &str) -> Result<bool>;

    /// Column names of a table; empty if the table does not exist.
    fn columns_of(&self, name: &str) -> Result<BTreeSet<String>>;

    /// Append rows to an existing table in chunks, returning rows inserted.
    fn bulk_insert(&self, rows: &RowSet, table: &Ident, chunk_size: usize) -> Result<usize>;

    /// Make the vector distance functions and index module available.
    fn ensure_vector_extension(&self) -> Result<()>;

    /// Commit the open transaction, if any.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction, if any.
    fn rollback(&self) -> Result<()>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per text in input order.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Chat completion trait.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `user` under the `system` instruction and return the text verbatim.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}
