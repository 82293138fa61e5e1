//! # Course RAG CLI (`crag`)
//!
//! ## Usage
//!
//! ```bash
//! crag --config ./config/crag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag init` | Create the SQLite database and schema |
//! | `crag ingest [--root DIR]` | Parse, chunk and index course documents |
//! | `crag courses` | List indexed course titles |
//! | `crag outline "<title>"` | Print a course outline (loose title match) |
//! | `crag query "<question>"` | Ask a question |
//! | `crag serve` | Ingest the documents root and start the HTTP API |
//!
//! With `[db] backend = "memory"` nothing persists between runs, so
//! `courses`, `outline` and `query` ingest the documents root first.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use course_rag::config::{self, Config};
use course_rag::ingest::IngestReport;
use course_rag::llm::create_model;
use course_rag::rag::{self, RagSystem};
use course_rag::server;
use course_rag::tools::{CourseTools, OutlineArgs, ToolCall};
use course_rag_core::index::CourseIndex;

/// Course RAG: ask questions about a folder of course documents.
#[derive(Parser)]
#[command(name = "crag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crag.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Ingest course documents.
    ///
    /// Re-ingesting a course with the same title replaces it. Documents
    /// that fail to parse are reported and skipped.
    Ingest {
        /// Directory to ingest instead of `[documents].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// List indexed courses.
    Courses,

    /// Print the outline of a course.
    Outline {
        /// Course title; partial titles are matched semantically.
        title: String,
    },

    /// Ask a question.
    Query {
        question: String,

        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP API.
    Serve,
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "course_rag=info,course_rag_core=info",
        1 => "course_rag=debug,course_rag_core=debug,tower_http=debug",
        _ => "course_rag=trace,course_rag_core=trace,tower_http=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn print_report(report: &IngestReport) {
    for ingested in &report.courses {
        println!(
            "  {} ({} lessons, {} chunks)",
            ingested.course.title,
            ingested.course.lessons.len(),
            ingested.chunk_count
        );
    }
    for failure in &report.failures {
        println!("  FAILED {}: {}", failure.path.display(), failure.error);
    }
    println!(
        "Ingested {} courses ({} chunks), {} failed.",
        report.courses.len(),
        report.chunk_count(),
        report.failures.len()
    );
}

/// Open the index; a memory-backed index is filled from the documents root.
async fn open_populated_index(cfg: &Config) -> Result<CourseIndex> {
    let index = rag::open_index(cfg).await?;
    if cfg.db.backend == "memory" {
        course_rag::ingest::ingest_directory(&index, &cfg.documents.root, &cfg.documents).await?;
    }
    Ok(index)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            rag::open_store(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { root } => {
            let index = rag::open_index(&cfg).await?;
            let root = root.unwrap_or_else(|| cfg.documents.root.clone());
            let report = course_rag::ingest::ingest_directory(&index, &root, &cfg.documents).await?;
            print_report(&report);
        }
        Commands::Courses => {
            let index = open_populated_index(&cfg).await?;
            let catalog = index.list_courses().await?;
            println!("{} courses", catalog.total_courses);
            for title in &catalog.course_titles {
                println!("  {}", title);
            }
        }
        Commands::Outline { title } => {
            let index = open_populated_index(&cfg).await?;
            let tools = CourseTools::new(index, cfg.retrieval.max_results);
            let output = tools
                .execute(&ToolCall::GetCourseOutline(OutlineArgs {
                    course_title: title,
                }))
                .await?;
            println!("{}", output.text);
        }
        Commands::Query { question, session } => {
            let index = open_populated_index(&cfg).await?;
            let model = create_model(&cfg.llm)?;
            let system = RagSystem::new(index, model, &cfg);
            let response = system.query(&question, session.as_deref()).await?;

            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &response.sources {
                    match &source.url {
                        Some(url) => println!("  {} <{}>", source.label(), url),
                        None => println!("  {}", source.label()),
                    }
                }
            }
            println!();
            println!("session: {}", response.session_id);
        }
        Commands::Serve => {
            let index = rag::open_index(&cfg).await?;
            let model = create_model(&cfg.llm)?;
            let system = RagSystem::new(index, model, &cfg);
            server::run_server(&cfg, system).await?;
        }
    }

    Ok(())
}
