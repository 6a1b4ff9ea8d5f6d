//! # Quarry CLI
//!
//! The `quarry` binary drives the full pipeline: ingesting local
//! documents, crawling web sources, and answering questions against
//! the resulting index in an interactive chat loop.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quarry ingest-docs <dir>` | Ingest txt/md/pdf files under a directory |
//! | `quarry ingest-web <sources.json>` | Crawl web sources and ingest extracted text |
//! | `quarry query` | Interactive retrieval-augmented chat |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a documentation tree
//! quarry ingest-docs ./docs
//!
//! # Crawl one level deep and ingest
//! quarry ingest-web sources.json --depth 1
//!
//! # Chat, printing the retrieved passages with each answer
//! quarry query --show-context
//! ```
//!
//! Configuration is read from environment variables, optionally loaded
//! from an env file (`./config.env` by default). See [`quarry::config`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use quarry::chat::{ChatClient, ChatSession};
use quarry::config::Config;
use quarry::ingest::{load_web_sources, Ingestor};
use quarry::models::IngestReport;
use quarry::retrieve::Retriever;
use quarry::retry::CancelToken;

/// Quarry — a local-first RAG pipeline for locally hosted
/// OpenAI-compatible models.
#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry — retrieval-augmented generation against a locally hosted model",
    version,
    long_about = "Quarry ingests local documents and crawled web pages, embeds them against a \
    locally hosted OpenAI-compatible backend (LM Studio, llama.cpp server), stores the vectors \
    in an on-disk index, and answers questions with retrieved passages folded into the prompt."
)]
struct Cli {
    /// Path to an env file with QUARRY_* settings.
    ///
    /// Loaded before reading the environment; real environment
    /// variables win over file entries. A missing file is not an
    /// error.
    #[arg(long, global = true, default_value = "./config.env")]
    env_file: PathBuf,

    /// Directory holding the vector index (created on first ingest).
    #[arg(long, global = true, default_value = "./quarry_index")]
    index: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest local documents into the index.
    ///
    /// Walks the directory recursively, extracts text from `.txt`,
    /// `.md`, and `.pdf` files, chunks and embeds it, and appends the
    /// result to the index. Re-running appends again; the index is
    /// never overwritten.
    IngestDocs {
        /// Directory to scan for documents.
        dir: PathBuf,

        /// Passage window size in characters.
        #[arg(long, default_value_t = quarry::ingest::DOC_CHUNK_SIZE)]
        chunk_size: usize,

        /// Characters shared between consecutive passages.
        #[arg(long, default_value_t = quarry::ingest::DOC_CHUNK_OVERLAP)]
        overlap: usize,
    },

    /// Crawl web sources and ingest the extracted text.
    ///
    /// The sources file is JSON: one object or an array of objects,
    /// each with a `url` (string or list), optional `selectors` (CSS),
    /// and optional `tags`. Writes a `manifest.json` next to the index
    /// recording the provenance of every passage added.
    IngestWeb {
        /// Path to the JSON sources file.
        sources: PathBuf,

        /// Link-following depth. 0 fetches the listed URLs only.
        #[arg(long)]
        depth: Option<u32>,

        /// Passage window size in characters.
        #[arg(long, default_value_t = quarry::ingest::WEB_CHUNK_SIZE)]
        chunk_size: usize,

        /// Characters shared between consecutive passages.
        #[arg(long, default_value_t = quarry::ingest::WEB_CHUNK_OVERLAP)]
        overlap: usize,
    },

    /// Interactive retrieval-augmented chat.
    ///
    /// Reads questions from stdin until `exit` or EOF. Each answer is
    /// grounded in the most similar indexed passages; an empty index
    /// degrades to plain chat.
    Query {
        /// Print the retrieved passages before each answer.
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quarry=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env(&cli.env_file)?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted, finishing current batch...");
                cancel.cancel();
            }
        });
    }

    tracing::info!(
        endpoint = %config.endpoint,
        chat_model = %config.chat_model,
        embedding_model = %config.embedding_model,
        "configured backend"
    );

    match cli.command {
        Commands::IngestDocs {
            dir,
            chunk_size,
            overlap,
        } => {
            let ingestor = Ingestor::new(&config, &cli.index)?;
            let report = ingestor
                .ingest_documents(&dir, chunk_size, overlap, &cancel)
                .await?;
            print_report("ingest-docs", &report, &cli.index);
        }
        Commands::IngestWeb {
            sources,
            depth,
            chunk_size,
            overlap,
        } => {
            let sources = load_web_sources(&sources)?;
            let depth = depth.unwrap_or(config.crawl_depth);
            let ingestor = Ingestor::new(&config, &cli.index)?;
            let report = ingestor
                .ingest_web(&sources, depth, chunk_size, overlap, &cancel)
                .await?;
            print_report("ingest-web", &report, &cli.index);
        }
        Commands::Query { show_context } => {
            run_query_loop(&config, &cli.index, show_context, &cancel).await?;
        }
    }
    Ok(())
}

fn print_report(command: &str, report: &IngestReport, index_dir: &std::path::Path) {
    println!("{}", command);
    println!("  sources processed: {}", report.sources_processed);
    println!("  passages added: {}", report.passages_added);
    if !report.sources_failed.is_empty() {
        println!("  sources failed: {}", report.sources_failed.len());
        for (source, reason) in &report.sources_failed {
            println!("    {}: {}", source, reason);
        }
    }
    if let Ok(index) = quarry::index::IndexStore::open_or_create(index_dir, None) {
        println!("  index passages: {}", index.len());
        println!("  index sources: {}", index.source_count());
    }
    println!("ok");
}

async fn run_query_loop(
    config: &Config,
    index_dir: &std::path::Path,
    show_context: bool,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let mut session = ChatSession::new(
        ChatClient::new(config)?,
        Retriever::new(config, index_dir)?,
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("quarry chat — type a question, or `exit` to quit");
    println!("  endpoint: {}", config.endpoint);
    println!("  chat model: {}", config.chat_model);
    println!("  embedding model: {}", config.embedding_model);
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = cancel.cancelled() => break,
        };
        let Some(line) = line else {
            break; // EOF
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") {
            break;
        }

        match session.ask(question, cancel).await {
            Ok(answer) => {
                if show_context {
                    for (i, scored) in answer.context.iter().enumerate() {
                        println!(
                            "[source {}] {} (score {:.3})",
                            i + 1,
                            scored.passage.source,
                            scored.score
                        );
                        println!("{}\n", scored.passage.text);
                    }
                }
                println!("{}", answer.answer);
                if !answer.citations.is_empty() {
                    println!("\nsources:");
                    for source in &answer.citations {
                        println!("  {}", source);
                    }
                }
            }
            Err(quarry::Error::Cancelled) => break,
            Err(e) => eprintln!("error: {}", e),
        }
    }
    println!("bye");
    Ok(())
}
