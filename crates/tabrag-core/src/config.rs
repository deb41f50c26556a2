//! Configuration types for tabrag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Logical database name used when none is given.
pub const DEFAULT_DATABASE: &str = "default";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Connection settings keyed by logical database name.
    #[serde(default = "default_databases")]
    pub databases: BTreeMap<String, DatabaseConfig>,

    /// Embedding and completion service configuration.
    #[serde(default)]
    pub model: ModelConfig,

    /// CSV ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            databases: default_databases(),
            model: ModelConfig::default(),
            ingest: IngestConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// What happens to already-inserted chunks when a bulk load fails partway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkInsertPolicy {
    /// Every chunk commits on its own; earlier chunks survive a later failure.
    ChunkCommit,

    /// The whole load runs in one savepoint and is rolled back on failure.
    AllOrNothing,
}

impl Default for BulkInsertPolicy {
    fn default() -> Self {
        Self::ChunkCommit
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    pub path: PathBuf,

    /// Enable WAL mode (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// SQLite cache size in KB (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,

    /// Partial-failure behaviour of bulk inserts.
    #[serde(default)]
    pub bulk_insert_policy: BulkInsertPolicy,

    /// Rows per chunk for chunked fetches of large result sets.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: true,
            cache_size: -64000, // 64MB
            busy_timeout_ms: 30000,
            bulk_insert_policy: BulkInsertPolicy::default(),
            fetch_batch_size: default_fetch_batch_size(),
        }
    }
}

/// Embedding and completion service configuration.
///
/// Both calls go to an OpenAI-compatible HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL, without the `/v1` suffix.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Chat completion model name.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding dimension requested from the service and stored in the index.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Sampling temperature for completions.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Token limit for completions.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Rows embedded per request when attaching embeddings.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            dimensions: default_dimensions(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// CSV ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Rows per bulk insert chunk.
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bulk_chunk_size: default_bulk_chunk_size(),
        }
    }
}

/// Whether search index creation tolerates an existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexCreation {
    /// Plain `CREATE`; a second creation fails in the store.
    Unguarded,

    /// Skip creation (and population) of an index that already exists.
    Guarded,
}

impl Default for IndexCreation {
    fn default() -> Self {
        Self::Unguarded
    }
}

/// Where the two rankings are fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// One statement with a `FULL OUTER JOIN` of both rankings.
    Sql,

    /// Two ranking statements, fused in process.
    Client,
}

impl Default for FusionMode {
    fn default() -> Self {
        Self::Sql
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Rows kept from the vector ranking.
    #[serde(default = "default_limit")]
    pub semantic_limit: usize,

    /// Rows kept from the full-text ranking.
    #[serde(default = "default_limit")]
    pub keyword_limit: usize,

    /// Fused candidates passed to the language model.
    #[serde(default = "default_limit")]
    pub top_k: usize,

    /// Guarded or unguarded index creation.
    #[serde(default)]
    pub index_creation: IndexCreation,

    /// SQL or in-process fusion.
    #[serde(default)]
    pub fusion: FusionMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            semantic_limit: 20,
            keyword_limit: 20,
            top_k: 20,
            index_creation: IndexCreation::default(),
            fusion: FusionMode::default(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -64000
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_fetch_batch_size() -> usize {
    1_000_000
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_chat_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_dimensions() -> usize {
    256
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_batch_size() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_bulk_chunk_size() -> usize {
    100
}

fn default_rrf_k() -> u32 {
    60
}

fn default_limit() -> usize {
    20
}

fn default_databases() -> BTreeMap<String, DatabaseConfig> {
    let mut databases = BTreeMap::new();
    databases.insert(DEFAULT_DATABASE.to_string(), DatabaseConfig::default());
    databases
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabrag")
        .join("tabrag.db")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::error::RagError::config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tabrag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("tabrag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Look up connection settings by logical database name.
    pub fn database(&self, name: &str) -> crate::error::Result<&DatabaseConfig> {
        self.databases.get(name).ok_or_else(|| {
            crate::error::RagError::config(format!(
                "no database named {:?} (known: {})",
                name,
                self.databases.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}
