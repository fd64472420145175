//! # folio-chat CLI (`folio`)
//!
//! The `folio` binary drives the portfolio chatbot service. It can run the
//! HTTP API, rebuild the persistent knowledge-base index, answer a single
//! question from the terminal, or report index status.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio serve` | Start the chat API server |
//! | `folio index` | Fetch sources and rebuild the embedding index |
//! | `folio ask "<question>"` | Ask one question, streaming the answer |
//! | `folio status` | Show index and provider status |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use folio_chat::config::{self, Config};
use folio_chat::embedding::create_embedder;
use folio_chat::extract::PdfExtractor;
use folio_chat::github::GithubClient;
use folio_chat::index::SearchIndex;
use folio_chat::models::RepoRecord;
use folio_chat::server::run_server;
use folio_chat::session::{build_knowledge_base, ChatSession};

/// folio-chat — a retrieval-augmented portfolio chatbot.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Portfolio chatbot — retrieval-augmented answers about your projects, skills, and resume",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat API.
    ///
    /// Initialization runs in the background at startup; questions that
    /// arrive earlier receive a 503 until the knowledge base is ready.
    Serve,

    /// Fetch sources and (re)build the persistent embedding index.
    Index,

    /// Ask one question against the persisted index, streaming the answer.
    ///
    /// Rebuilds the knowledge base first if no usable index is found.
    Ask {
        question: String,
    },

    /// Show index contents and provider credential status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(config::load_config(&cli.config)?);

    match cli.command {
        Commands::Serve => {
            let session = Arc::new(ChatSession::new(config.clone())?);
            run_server(config, session).await?;
        }
        Commands::Index => {
            let embedder = create_embedder(&config.embedding)?;
            let repos = fetch_repos(&config).await;
            let (_, summary) =
                build_knowledge_base(&config, &repos, embedder.as_ref(), &PdfExtractor).await?;
            println!("index rebuild");
            println!("  repositories: {}", summary.repos);
            println!("  documents: {}", summary.documents);
            println!("  chunks written: {}", summary.chunks);
            println!("  model: {}", embedder.model_name());
            println!("ok");
        }
        Commands::Ask { question } => {
            let session = ChatSession::new(config.clone())?;
            if !session.restore().await? {
                println!("(no usable index found, building knowledge base first)");
                let repos = fetch_repos(&config).await;
                session.initialize(&repos).await?;
            }
            let mut stream = session.ask_stream(&question).await?;
            let mut stdout = std::io::stdout();
            while let Some(fragment) = futures::StreamExt::next(&mut stream).await {
                write!(stdout, "{}", fragment?)?;
                stdout.flush()?;
            }
            println!();
        }
        Commands::Status => {
            print_status(&config).await?;
        }
    }

    Ok(())
}

/// Fetch repositories for CLI commands, degrading to an empty list with a
/// note on stderr so index builds still succeed offline.
async fn fetch_repos(config: &Config) -> Vec<RepoRecord> {
    if config.github.username.trim().is_empty() {
        eprintln!("github.username not configured; using profile data only");
        return Vec::new();
    }
    match GithubClient::from_env(&config.github.username) {
        Ok(client) => match client.list_repositories().await {
            Ok(repos) => repos,
            Err(e) => {
                eprintln!("repository fetch failed ({}); using profile data only", e);
                Vec::new()
            }
        },
        Err(e) => {
            eprintln!("{}; using profile data only", e);
            Vec::new()
        }
    }
}

async fn print_status(config: &Config) -> Result<()> {
    let index = SearchIndex::open(&config.index.dir).await?;
    let chunks = index.len().await?;
    let model = index.recorded_model().await?;

    println!("index: {}", config.index.dir.display());
    println!("  chunks: {}", chunks);
    println!(
        "  embedding model: {}",
        model.as_deref().unwrap_or("(not built)")
    );
    if let Some(ts) = index.built_at().await? {
        let built = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        println!("  built: {}", built);
    }

    let has = |var: &str| std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
    println!("providers:");
    println!(
        "  {:<10} {}",
        "groq",
        if has("GROQ_API_KEY") { "OK" } else { "NO CREDENTIAL" }
    );
    println!(
        "  {:<10} {}",
        "gemini",
        if has("GEMINI_API_KEY") || has("GOOGLE_API_KEY") {
            "OK"
        } else {
            "NO CREDENTIAL"
        }
    );
    println!(
        "  {:<10} {}",
        "github",
        if config.github.username.trim().is_empty() {
            "NOT CONFIGURED"
        } else if has("GITHUB_TOKEN") {
            "OK (authenticated)"
        } else {
            "OK (anonymous)"
        }
    );

    Ok(())
}
