//! tabrag CLI - Question answering over CSV tables.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tabrag_core::{
    FusionMode, IndexCreation, LoadOutcome, RagConfig, Result, RowSet, Store, Value,
    DEFAULT_DATABASE,
};
use tabrag_csv::read_csv_text;
use tabrag_model::OpenAiClient;
use tabrag_query::{answer_naive, PipelineConfig, RetrievalPipeline, SearchTarget};
use tabrag_store::SqliteStore;

type Pipeline = RetrievalPipeline<SqliteStore, OpenAiClient, OpenAiClient>;

/// tabrag - Retrieval-augmented answers over tabular data
#[derive(Parser)]
#[command(name = "tabrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/tabrag/config.toml, then ./tabrag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logical database name from the configuration
    #[arg(short, long, global = true, default_value = DEFAULT_DATABASE)]
    database: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV into a table, replacing any table of the same name
    Prepare {
        /// Path to the CSV file
        csv: PathBuf,

        /// Target table
        #[arg(short, long)]
        table: String,
    },

    /// Embed one text column of a table
    Embed {
        #[arg(short, long)]
        table: String,

        /// Column whose text is embedded
        #[arg(long)]
        column: String,
    },

    /// Create the vector and full-text indexes
    Index {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Answer a question from the best-matching rows
    Ask {
        question: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Print the fused candidates after the answer
        #[arg(long)]
        show_candidates: bool,
    },

    /// Show the rows hybrid search ranks highest, without asking the model
    Search {
        question: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Print candidates and sources as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from rows sharing a word with it
    Naive {
        question: String,

        /// Path to the CSV file
        #[arg(long)]
        csv: PathBuf,

        /// Header of the title column
        #[arg(long)]
        title: String,

        /// Header of the body column
        #[arg(long)]
        body: String,

        /// What the rows describe, e.g. "cars"
        #[arg(long, default_value = "rows")]
        subject: String,
    },

    /// Run a SQL statement
    Sql {
        statement: String,

        /// Run as a write statement and commit
        #[arg(long)]
        execute: bool,

        /// Rows fetched per chunk
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[derive(Args)]
struct TargetArgs {
    #[arg(short, long)]
    table: String,

    /// Column used as each source's title
    #[arg(long)]
    title: String,

    /// Column used as each source's body
    #[arg(long)]
    body: String,

    /// Skip indexes that already exist
    #[arg(long)]
    guarded: bool,

    /// Fuse rankings in Rust instead of SQL
    #[arg(long)]
    client_fusion: bool,
}

impl TargetArgs {
    fn target(&self) -> Result<SearchTarget> {
        SearchTarget::new(&self.table, &self.title, &self.body)
    }

    fn apply(&self, config: &mut RagConfig) {
        if self.guarded {
            config.search.index_creation = IndexCreation::Guarded;
        }
        if self.client_fusion {
            config.search.fusion = FusionMode::Client;
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    match path {
        Some(path) => RagConfig::load(path),
        None => RagConfig::load_default(),
    }
}

fn open_pipeline(config: &RagConfig, database: &str) -> Result<Pipeline> {
    let store = SqliteStore::open(config.database(database)?)?;
    let client = OpenAiClient::new(&config.model)?;
    Ok(RetrievalPipeline::new(
        store,
        client.clone(),
        client,
        PipelineConfig::from_config(config),
    ))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Prepare { csv, table } => {
            let pipeline = open_pipeline(&config, &cli.database)?;
            let prepared = pipeline.prepare_table(&csv, &table)?;
            match &prepared.outcome {
                LoadOutcome::Loaded { rows } => println!(
                    "Loaded {} rows into {} ({})",
                    rows,
                    prepared.table,
                    prepared.columns.join(", ")
                ),
                LoadOutcome::Mismatch(m) => {
                    println!("Nothing loaded into {}: {}", prepared.table, m)
                }
            }
            pipeline.into_store().close()?;
        }
        Commands::Embed { table, column } => {
            let pipeline = open_pipeline(&config, &cli.database)?;
            let count = pipeline.attach_embeddings(&table, &column).await?;
            println!("Embedded {} rows of {}", count, table);
            pipeline.into_store().close()?;
        }
        Commands::Index { target } => {
            target.apply(&mut config);
            let pipeline = open_pipeline(&config, &cli.database)?;
            let status = pipeline.ensure_search_index(&target.target()?)?;
            println!(
                "Vector index: {}, full-text index: {}",
                created(status.vector_created),
                created(status.fulltext_created)
            );
            pipeline.into_store().close()?;
        }
        Commands::Ask {
            question,
            target,
            show_candidates,
        } => {
            target.apply(&mut config);
            let pipeline = open_pipeline(&config, &cli.database)?;
            let answer = pipeline.answer_question(&target.target()?, &question).await?;

            println!("{}", answer.text);
            if show_candidates {
                println!();
                for (i, c) in answer.candidates.iter().enumerate() {
                    println!(
                        "{:>2}. id={} score={:.5} semantic={} keyword={}",
                        i + 1,
                        c.id,
                        c.score,
                        rank_label(c.semantic_rank),
                        rank_label(c.keyword_rank)
                    );
                }
            }
            pipeline.into_store().close()?;
        }
        Commands::Search {
            question,
            target,
            json,
        } => {
            target.apply(&mut config);
            let pipeline = open_pipeline(&config, &cli.database)?;
            let retrieval = pipeline.retrieve(&target.target()?, &question).await?;

            if json {
                let out = serde_json::json!({
                    "question": question,
                    "candidates": retrieval.candidates,
                    "sources": retrieval.sources,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (c, s) in retrieval.candidates.iter().zip(&retrieval.sources) {
                    println!("[{:.5}] {} (id {})", c.score, s.title, s.id);
                    println!("    {}", s.body);
                }
            }
            pipeline.into_store().close()?;
        }
        Commands::Naive {
            question,
            csv,
            title,
            body,
            subject,
        } => {
            let rows = read_csv_text(&csv)?;
            let model = OpenAiClient::new(&config.model)?;
            let answer = answer_naive(&model, &rows, &question, &title, &body, &subject).await?;
            println!("{}", answer);
        }
        Commands::Sql {
            statement,
            execute,
            batch_size,
        } => {
            let store = SqliteStore::open(config.database(&cli.database)?)?;
            if execute {
                let changed = store.execute(&statement, &[])?;
                println!("{} rows changed", changed);
            } else {
                print_query(&store, &statement, batch_size)?;
            }
            store.close()?;
        }
    }

    Ok(())
}

fn created(flag: bool) -> &'static str {
    if flag {
        "created"
    } else {
        "exists"
    }
}

fn rank_label(rank: Option<u32>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

/// Print a query's rows chunk by chunk as a markdown table.
fn print_query(store: &SqliteStore, sql: &str, batch_size: Option<usize>) -> Result<()> {
    let mut query = store.prepare(sql)?;
    if let Some(size) = batch_size {
        query = query.with_batch_size(size);
    }

    println!("{}", query.column_names().join(" | "));
    println!("{}", vec![" --- "; query.column_names().len()].join(" | "));

    let mut total = 0;
    for chunk in query.chunks(&[])? {
        let chunk: RowSet = chunk?;
        for row in chunk.rows() {
            println!("{}", row.iter().map(Value::to_string).collect::<Vec<_>>().join(" | "));
        }
        total += chunk.len();
    }

    eprintln!("({} rows)", total);
    Ok(())
}
