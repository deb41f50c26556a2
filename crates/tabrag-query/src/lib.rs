//! tabrag-query - Ingestion and hybrid retrieval
//!
//! This crate turns a CSV into a searchable table and answers questions
//! over it:
//!
//! - CSV ingestion into a freshly created table with an identity column
//! - Embedding attachment for one text column
//! - Vector (sqlite-vec) and full-text (FTS5) indexes
//! - Hybrid ranking fused with Reciprocal Rank Fusion, in SQL or in Rust
//! - Prompt rendering and a single chat completion per question
//! - A naive word-match mode that needs neither embeddings nor indexes
//!
//! # Example
//!
//! ```rust,ignore
//! use tabrag_query::{PipelineConfig, RetrievalPipeline, SearchTarget};
//!
//! let pipeline = RetrievalPipeline::new(store, embedder, model, PipelineConfig::default());
//! pipeline.prepare_table("Cars.csv", "cars")?;
//! pipeline.attach_embeddings("cars", "trim_description").await?;
//!
//! let target = SearchTarget::new("cars", "make", "trim_description")?;
//! let answer = pipeline.answer_question(&target, "Which sedan is cheapest?").await?;
//! ```

mod fusion;
mod hybrid;
mod index;
mod naive;
mod pipeline;
mod prompt;
mod text;

pub use fusion::{reciprocal_rank_fusion, rrf_contribution, Ranked};
pub use hybrid::{hybrid_search_sql, keyword_ranking_sql, semantic_ranking_sql, source_rows_sql};
pub use index::{ensure_search_index, IndexStatus, SearchTarget, EMBEDDING_COLUMN};
pub use naive::{answer_naive, naive_matches, naive_system_prompt, question_words, render_table};
pub use pipeline::{PipelineConfig, PreparedTable, Retrieval, RetrievalPipeline, ID_COLUMN};
pub use prompt::{render_sources, user_prompt, SYSTEM_PROMPT};
pub use text::{natural_language_query, query_terms};

// Re-export for convenience
pub use tabrag_core::{Answer, Candidate, SourceRow};
