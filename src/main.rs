use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trellis_core::config::AppConfig;
use trellis_core::traits::{EmbeddingProvider, LlmClient, VectorStore};
use trellis_core::types::{DocumentRecord, TaskMessage};
use trellis_engine::{rag_graph, Engine, ExtracterNode, SimpleTaskHandler};
use trellis_memory::{HttpEmbeddingProvider, SqliteVectorStore};

const INGEST_BATCH: usize = 32;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Async node-graph engine for retrieval-augmented generation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "trellis.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer questions through the retrieval-augmented graph
    Run {
        /// Questions to answer, one row each (read from stdin if empty)
        questions: Vec<String>,
    },
    /// Embed a JSONL file of documents into the configured collection
    Ingest {
        /// One document per line: {"page_content": ..., "metadata": {...}}
        file: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trellis=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Run { questions } => {
            let questions = if questions.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .filter(|l| !l.trim().is_empty())
                    .collect()
            } else {
                questions
            };
            if questions.is_empty() {
                bail!("no questions given");
            }
            run(&config, questions).await?;
        }
        Commands::Ingest { file } => {
            ingest(&config, &file).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    // Check for config in the home directory
    if let Some(home) = dirs_home().map(|h| h.join(".trellis").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }

    bail!(
        "no config file found at {} or ~/.trellis/config.toml",
        path.display()
    )
}

fn embedder(config: &AppConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let embedding = config
        .embedding
        .as_ref()
        .ok_or_else(|| anyhow!("an [embedding] section is required"))?;
    Ok(Arc::new(HttpEmbeddingProvider::from_config(embedding)?))
}

/// extracter -> rag(retriever -> prompt -> generate) -> handler
fn build_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    let store = SqliteVectorStore::open(&config.vector_store_path())?;
    let collection: Arc<dyn VectorStore> =
        Arc::new(store.collection(&config.vector_store.collection));
    let llm: Arc<dyn LlmClient> = Arc::from(trellis_llm::create_client(&config.model)?);

    let rag = rag_graph(
        &config.rag.prompt,
        config.rag.template_format,
        embedder(config)?,
        collection,
        llm,
        config.vector_store.k,
    )?;

    let columns = &config.engine.output_columns;
    let handler_inputs: Vec<String> = columns
        .iter()
        .map(|c| format!("/rag/generate as {}", c))
        .collect();
    let handler_inputs: Vec<&str> = handler_inputs.iter().map(String::as_str).collect();

    let mut engine = Engine::new();
    engine
        .add_node("extracter", &[], ExtracterNode::new(), false)?
        .add_node("rag", &["/extracter"], rag, true)?
        .add_task_handler(&handler_inputs, SimpleTaskHandler::new(columns.clone()))?;
    Ok(engine)
}

async fn run(config: &AppConfig, questions: Vec<String>) -> anyhow::Result<()> {
    let engine = build_engine(config)?;

    let key = config
        .engine
        .input_keys
        .first()
        .cloned()
        .unwrap_or_else(|| "questions".to_string());
    let task = TaskMessage::from_column(key, questions.into_iter().map(Value::String).collect());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Cancel the run on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Cancelling run...");
        cancel_clone.cancel();
    });

    let deadline = Duration::from_secs(config.engine.run_timeout_secs);
    let output = match tokio::time::timeout(deadline, engine.run(task, cancel.clone())).await {
        Ok(result) => result?,
        Err(_) => {
            cancel.cancel();
            bail!("run exceeded {}s", deadline.as_secs());
        }
    };

    info!(
        tasks = output.tasks.len(),
        elapsed_ms = output.elapsed_ms,
        "Run finished"
    );
    println!("{}", serde_json::to_string_pretty(&output.tasks)?);
    Ok(())
}

async fn ingest(config: &AppConfig, file: &Path) -> anyhow::Result<()> {
    let embedder = embedder(config)?;
    let store = SqliteVectorStore::open(&config.vector_store_path())?;
    let collection = &config.vector_store.collection;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let docs = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<DocumentRecord>(line)
                .with_context(|| format!("{}:{}", file.display(), i + 1))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut stored = 0;
    for batch in docs.chunks(INGEST_BATCH) {
        let texts: Vec<String> = batch.iter().map(|d| d.page_content.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        stored += store.insert(collection, batch, &vectors)?.len();
        info!(stored, total = docs.len(), "Ingesting");
    }

    println!("Stored {} document(s) in collection '{}'", stored, collection);
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
