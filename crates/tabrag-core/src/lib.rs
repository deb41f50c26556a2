//! tabrag-core - Core types and traits for tabrag
//!
//! This crate provides the foundational types, traits, and error handling
//! shared by the store, ingestion, model and query crates.

pub mod config;
pub mod error;
pub mod ident;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use ident::Ident;
pub use traits::*;
pub use types::*;
