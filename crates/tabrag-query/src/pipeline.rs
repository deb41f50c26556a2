//! Retrieval pipeline: CSV ingestion, embeddings, hybrid search and answers.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use tabrag_core::{
    Answer, Candidate, Embedder, FusionMode, Ident, LanguageModel, LoadOutcome, RagConfig,
    RagError, Result, RowSet, SearchConfig, SourceRow, Store, TableSchema, Value,
};
use tabrag_csv::{normalize_column_name, read_csv};
use tabrag_store::SchemaBuilder;

use crate::fusion::{reciprocal_rank_fusion, Ranked};
use crate::hybrid::{hybrid_search_sql, keyword_ranking_sql, semantic_ranking_sql, source_rows_sql};
use crate::index::{ensure_search_index, IndexStatus, SearchTarget, EMBEDDING_COLUMN};
use crate::prompt::{render_sources, user_prompt, SYSTEM_PROMPT};
use crate::text::natural_language_query;

/// Name of the identity column added on ingestion.
pub const ID_COLUMN: &str = "id";

/// Settings the pipeline reads from [`RagConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows per chunk when loading a table.
    pub bulk_chunk_size: usize,

    /// Embedding dimension stored and indexed.
    pub dimensions: usize,

    /// Rows embedded per request.
    pub embed_batch_size: usize,

    pub search: SearchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

impl PipelineConfig {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            bulk_chunk_size: config.ingest.bulk_chunk_size,
            dimensions: config.model.dimensions,
            embed_batch_size: config.model.batch_size,
            search: config.search.clone(),
        }
    }
}

/// Result of [`RetrievalPipeline::prepare_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTable {
    pub table: Ident,
    pub columns: Vec<String>,
    pub rows: usize,
    pub outcome: LoadOutcome,
}

/// Fused candidates and the rows they point at, best first.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    pub sources: Vec<SourceRow>,
}

/// Ingestion and question answering over one store.
///
/// Every call runs to completion before returning; store calls block and
/// model calls are awaited one at a time.
pub struct RetrievalPipeline<S, E, L> {
    /// Storage backend, owned by this pipeline.
    store: S,

    /// Embedding model.
    embedder: E,

    /// Chat model.
    model: L,

    config: PipelineConfig,
}

impl<S, E, L> RetrievalPipeline<S, E, L>
where
    S: Store,
    E: Embedder,
    L: LanguageModel,
{
    /// Create a new pipeline.
    pub fn new(store: S, embedder: E, model: L, config: PipelineConfig) -> Self {
        Self {
            store,
            embedder,
            model,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn model(&self) -> &L {
        &self.model
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Give the store back, e.g. to close it.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Load a CSV into `table`, replacing any existing table of that name.
    ///
    /// The table gets an `id` identity column (`1..=N` in file order) as its
    /// primary key, followed by the CSV columns with normalized names.
    pub fn prepare_table(&self, csv_path: impl AsRef<Path>, table: &str) -> Result<PreparedTable> {
        let table = Ident::new(table)?;
        // The derived index tables must also be valid names
        table.with_suffix("_fts")?;
        table.with_suffix("_vec")?;

        let mut rows = read_csv(csv_path)?;
        rows.rename_columns(normalize_column_name)?;
        rows.prepend_identity(ID_COLUMN);

        let schema = TableSchema::from_row_set(&rows)?;

        self.drop_table(&table)?;

        let builder = SchemaBuilder::new(&self.store);
        builder.create_table(&table, &schema)?;
        let outcome = builder.load_from_rowset(&table, &rows, self.config.bulk_chunk_size)?;

        info!("Prepared table {} with {} rows", table, rows.len());

        Ok(PreparedTable {
            columns: rows.column_names().into_iter().map(String::from).collect(),
            rows: rows.len(),
            table,
            outcome,
        })
    }

    /// Drop `table` and the search indexes derived from it.
    fn drop_table(&self, table: &Ident) -> Result<()> {
        if !self.store.table_exists(table.as_str())? {
            debug!("Table {} does not exist", table);
            return Ok(());
        }

        let fts = table.with_suffix("_fts")?;
        let vec = table.with_suffix("_vec")?;
        self.store
            .execute(&format!("DROP TABLE IF EXISTS {}", fts.quoted()), &[])?;
        self.store
            .execute(&format!("DROP TABLE IF EXISTS {}", vec.quoted()), &[])?;
        self.store
            .execute(&format!("DROP TABLE {}", table.quoted()), &[])?;
        self.store.commit()?;

        info!("Table {} dropped", table);
        Ok(())
    }

    /// Embed the text of `column` for every row of `table`.
    ///
    /// Adds the `embedding` column when missing, walks rows by ascending `id`
    /// and commits after each batch. Returns the number of rows embedded.
    pub async fn attach_embeddings(&self, table: &str, column: &str) -> Result<usize> {
        let table = Ident::new(table)?;
        let column = Ident::new(column)?;

        let columns = self.store.columns_of(table.as_str())?;
        if columns.is_empty() {
            return Err(RagError::schema(table.as_str(), "table does not exist"));
        }
        if !columns.contains(column.as_str()) {
            return Err(RagError::invalid_argument(format!(
                "table {} has no column {}",
                table, column
            )));
        }

        if !columns.contains(EMBEDDING_COLUMN) {
            self.store.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} blob", table.quoted(), EMBEDDING_COLUMN),
                &[],
            )?;
            self.store.commit()?;
            debug!("Added {} column to {}", EMBEDDING_COLUMN, table);
        }

        let select = format!(
            "SELECT id, {} FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2",
            column.quoted(),
            table.quoted()
        );
        let update = format!(
            "UPDATE {} SET {} = ?1 WHERE id = ?2",
            table.quoted(),
            EMBEDDING_COLUMN
        );

        let batch_size = self.config.embed_batch_size.max(1);
        let mut last_id = i64::MIN;
        let mut embedded = 0;

        loop {
            let batch = self.store.query(
                &select,
                &[Value::Integer(last_id), Value::Integer(batch_size as i64)],
            )?;
            if batch.is_empty() {
                break;
            }

            let ids = batch
                .rows()
                .iter()
                .map(|row| {
                    row[0]
                        .as_i64()
                        .ok_or_else(|| RagError::schema(table.as_str(), "id is not an integer"))
                })
                .collect::<Result<Vec<_>>>()?;
            let texts: Vec<String> = batch.rows().iter().map(|row| row[1].to_string()).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

            let vectors = self.embedder.embed_documents(&refs).await?;
            if vectors.len() != ids.len() {
                return Err(RagError::service(
                    "embedding",
                    format!("expected {} embeddings, got {}", ids.len(), vectors.len()),
                ));
            }

            for (id, vector) in ids.iter().zip(vectors) {
                let vector = fit_dimensions(vector, self.config.dimensions)?;
                self.store
                    .execute(&update, &[Value::Vector(vector), Value::Integer(*id)])?;
            }
            self.store.commit()?;

            embedded += ids.len();
            last_id = ids.last().copied().unwrap_or(last_id);
            debug!("Embedded {} rows of {}", embedded, table);
        }

        info!("Attached embeddings to {} rows of {}", embedded, table);
        Ok(embedded)
    }

    /// Make sure the vector and full-text indexes of `target` exist.
    pub fn ensure_search_index(&self, target: &SearchTarget) -> Result<IndexStatus> {
        ensure_search_index(
            &self.store,
            target,
            self.config.dimensions,
            self.config.search.index_creation,
        )
    }

    /// Rank rows of `target` against `question` and fetch their title and body.
    pub async fn retrieve(&self, target: &SearchTarget, question: &str) -> Result<Retrieval> {
        let start = Instant::now();
        info!("Retrieving for: {:?}", question);

        self.ensure_search_index(target)?;

        let embedding = self.embedder.embed_query(question).await?;
        let embedding = fit_dimensions(embedding, self.config.dimensions)?;
        let fts_query = natural_language_query(question);

        let candidates = match self.config.search.fusion {
            FusionMode::Sql => self.fuse_in_sql(target, embedding, fts_query)?,
            FusionMode::Client => self.fuse_in_client(target, embedding, fts_query)?,
        };
        debug!("Fused to {} candidates", candidates.len());

        let sources = self.source_rows(target, &candidates)?;

        info!(
            "Retrieved {} sources in {}ms",
            sources.len(),
            start.elapsed().as_millis()
        );

        Ok(Retrieval {
            candidates,
            sources,
        })
    }

    /// Answer `question` from the rows of `target` that hybrid search ranks highest.
    pub async fn answer_question(&self, target: &SearchTarget, question: &str) -> Result<Answer> {
        let retrieval = self.retrieve(target, question).await?;

        let block = render_sources(&retrieval.sources);
        let prompt = user_prompt(question, &block);

        debug!("Sending {} sources to {}", retrieval.sources.len(), self.model.model_name());
        let text = self.model.complete(SYSTEM_PROMPT, &prompt).await?;

        Ok(Answer {
            question: question.to_string(),
            text,
            candidates: retrieval.candidates,
        })
    }

    fn fuse_in_sql(
        &self,
        target: &SearchTarget,
        embedding: Vec<f32>,
        fts_query: Option<String>,
    ) -> Result<Vec<Candidate>> {
        let search = &self.config.search;
        let sql = hybrid_search_sql(
            &target.vector_index()?,
            &target.fulltext_index()?,
            fts_query.is_some(),
        );

        let rows = self.store.query(
            &sql,
            &[
                Value::Vector(embedding),
                Value::Text(fts_query.unwrap_or_default()),
                Value::Integer(i64::from(search.rrf_k)),
                Value::Integer(search.semantic_limit as i64),
                Value::Integer(search.keyword_limit as i64),
                Value::Integer(search.top_k as i64),
            ],
        )?;

        rows.rows()
            .iter()
            .map(|row| {
                Ok(Candidate {
                    id: id_of(&row[0])?,
                    semantic_rank: rank_of(&row[1])?,
                    keyword_rank: rank_of(&row[2])?,
                    score: score_of(&row[3])?,
                })
            })
            .collect()
    }

    fn fuse_in_client(
        &self,
        target: &SearchTarget,
        embedding: Vec<f32>,
        fts_query: Option<String>,
    ) -> Result<Vec<Candidate>> {
        let search = &self.config.search;

        let semantic = self.ranking(
            &semantic_ranking_sql(&target.vector_index()?),
            Value::Vector(embedding),
            search.semantic_limit,
        )?;

        let keyword = match fts_query {
            Some(query) => self.ranking(
                &keyword_ranking_sql(&target.fulltext_index()?),
                Value::Text(query),
                search.keyword_limit,
            )?,
            None => Vec::new(),
        };

        debug!(
            "Semantic ranking has {} rows, keyword ranking has {} rows",
            semantic.len(),
            keyword.len()
        );

        Ok(reciprocal_rank_fusion(
            &semantic,
            &keyword,
            search.rrf_k,
            search.top_k,
        ))
    }

    fn ranking(&self, sql: &str, query: Value, limit: usize) -> Result<Vec<Ranked>> {
        let rows = self
            .store
            .query(sql, &[query, Value::Integer(limit as i64)])?;

        rows.rows()
            .iter()
            .map(|row| {
                let rank = rank_of(&row[1])?
                    .ok_or_else(|| RagError::internal("ranking row without rank"))?;
                Ok(Ranked::new(id_of(&row[0])?, rank))
            })
            .collect()
    }

    /// Title and body for each candidate, in candidate order.
    fn source_rows(&self, target: &SearchTarget, candidates: &[Candidate]) -> Result<Vec<SourceRow>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
        let rows: RowSet = self.store.query(
            &source_rows_sql(&target.table, &target.title_column, &target.body_column),
            &[Value::Text(serde_json::to_string(&ids)?)],
        )?;

        let mut by_id: HashMap<i64, SourceRow> = rows
            .rows()
            .iter()
            .map(|row| {
                let id = id_of(&row[0])?;
                Ok((
                    id,
                    SourceRow {
                        id,
                        title: row[1].to_string(),
                        body: row[2].to_string(),
                    },
                ))
            })
            .collect::<Result<_>>()?;

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

/// Truncate an embedding to `dimensions`; a shorter one is a service error.
fn fit_dimensions(mut vector: Vec<f32>, dimensions: usize) -> Result<Vec<f32>> {
    if vector.len() < dimensions {
        return Err(RagError::service(
            "embedding",
            format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                dimensions
            ),
        ));
    }
    vector.truncate(dimensions);
    Ok(vector)
}

fn id_of(value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| RagError::internal(format!("expected integer id, got {:?}", value)))
}

fn rank_of(value: &Value) -> Result<Option<u32>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(r) => u32::try_from(*r)
            .map(Some)
            .map_err(|_| RagError::internal(format!("rank out of range: {}", r))),
        other => Err(RagError::internal(format!("expected rank, got {:?}", other))),
    }
}

fn score_of(value: &Value) -> Result<f64> {
    match value {
        Value::Float(s) => Ok(*s),
        Value::Integer(s) => Ok(*s as f64),
        other => Err(RagError::internal(format!("expected score, got {:?}", other))),
    }
}
