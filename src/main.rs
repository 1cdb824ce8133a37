//! # docsage CLI
//!
//! The `docsage` binary drives the document assistant core from the
//! command line: database initialization, document ingestion, the
//! generation tasks, and provider management.
//!
//! ## Usage
//!
//! ```bash
//! docsage --config ./config/docsage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsage init` | Create the SQLite database and run schema migrations |
//! | `docsage add <file>` | Ingest a text file and index it |
//! | `docsage status <id>` | Show a document's indexing status |
//! | `docsage delete <id>` | Delete a document, its chunks, and cached results |
//! | `docsage summarize <id>` | Summarize a document |
//! | `docsage highlights <id>` | Extract key concepts, sentences, and topics |
//! | `docsage presentation <id>` | Build a slide outline |
//! | `docsage ask <id> "<question>"` | Answer a question against the document |
//! | `docsage providers` | List configured generation backends |
//! | `docsage switch <name>` | Make a backend the active one |
//! | `docsage models` | List models the active backend advertises |

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

use docsage::config::load_config;
use docsage::prompt::SummaryStyle;
use docsage::service::Service;
use docsage::store::sqlite::SqliteStore;

/// docsage — a local-first document assistant over interchangeable LLM
/// backends.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsage",
    about = "docsage — summarize, highlight, and question documents with local or hosted LLMs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest a plain-text file: chunk it, embed it when an embedding
    /// backend is configured, and mark it ready.
    Add {
        /// Path to a UTF-8 text file.
        file: PathBuf,

        /// Document title; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
    },

    /// Show a document's status and indexing totals.
    Status {
        /// Document UUID.
        id: String,
    },

    /// Delete a document along with its chunks, embeddings, and cached
    /// results.
    Delete {
        /// Document UUID.
        id: String,
    },

    /// Summarize a document.
    Summarize {
        /// Document UUID.
        id: String,

        /// Summary style: `paragraph`, `bullets`, or `executive`.
        #[arg(long, default_value = "paragraph")]
        style: String,

        /// Response language code (e.g. `en`, `cs`).
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Extract key concepts, key sentences, and topics as JSON.
    Highlights {
        /// Document UUID.
        id: String,

        /// Response language code.
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Build a slide outline (title + slides) as JSON.
    Presentation {
        /// Document UUID.
        id: String,

        /// Response language code.
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Answer a question using the document's most relevant chunks.
    Ask {
        /// Document UUID.
        id: String,

        /// The question to answer.
        question: String,

        /// Print the answer incrementally as the backend produces it.
        /// Streamed answers are not cached.
        #[arg(long)]
        stream: bool,
    },

    /// List configured generation backends and which one is active.
    Providers,

    /// Make a backend the active one for subsequent tasks.
    ///
    /// The switch is validated eagerly: an unknown name or a
    /// misconfigured backend leaves the current selection in place.
    Switch {
        /// Provider name (e.g. `ollama`, `lm_studio`, `openai`).
        name: String,

        /// Pin a specific model instead of the provider's default.
        #[arg(long)]
        model: Option<String>,
    },

    /// List models the active backend advertises.
    Models,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = load_config(&cli.config)?;
    let store = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
    let db_path = cfg.db.path.clone();
    let service = Service::new(cfg, store)?;

    match cli.command {
        Commands::Init => {
            // connect() already ran the migrations
            println!("Database initialized at {}.", db_path.display());
        }
        Commands::Add { file, title } => {
            let text = std::fs::read_to_string(&file)?;
            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            });
            let doc = service.add_document(&title, &text).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Status { id } => {
            let doc = service.document_status(&id).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Delete { id } => {
            service.delete_document(&id).await?;
            println!("Deleted {id}.");
        }
        Commands::Summarize {
            id,
            style,
            language,
        } => {
            let style: SummaryStyle = style.parse()?;
            let payload = service.summarize(&id, style, &language).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Highlights { id, language } => {
            let payload = service.highlights(&id, &language).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Presentation { id, language } => {
            let payload = service.presentation(&id, &language).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Ask {
            id,
            question,
            stream,
        } => {
            if stream {
                let mut fragments = service.ask_stream(&id, &question).await?;
                let mut stdout = std::io::stdout();
                while let Some(fragment) = fragments.next().await {
                    write!(stdout, "{}", fragment?)?;
                    stdout.flush()?;
                }
                writeln!(stdout)?;
            } else {
                let payload = service.ask(&id, &question).await?;
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
        }
        Commands::Providers => {
            let statuses = service.providers();
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        Commands::Switch { name, model } => {
            let statuses = service.switch_provider(&name, model.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        Commands::Models => {
            for model in service.list_models().await? {
                println!("{model}");
            }
        }
    }

    Ok(())
}
