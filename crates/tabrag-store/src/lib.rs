//! tabrag-store - SQLite store adapter
//!
//! This crate provides the relational store behind tabrag: a SQLite
//! connection with the sqlite-vec extension linked in for vector distance and
//! vector indexes, FTS5 for full-text ranking, and a schema builder that
//! creates tables and loads Row Sets into them.

mod chunks;
mod schema;
mod sqlite;

pub use chunks::{PreparedQuery, RowSetChunks};
pub use schema::{create_table_sql, insert_sql, SchemaBuilder};
pub use sqlite::{vec_to_bytes, SqliteStore};

// Re-export the Store trait for convenience
pub use tabrag_core::Store;
