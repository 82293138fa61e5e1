//! Query orchestration.
//!
//! [`RagSystem`] is the entry point used by the CLI and the HTTP server.
//! It owns the course index, the session store and the tool loop, and is
//! the only code that writes session history.
//!
//! A query holds its session's lock from reading history until the new
//! turns are appended. If the loop fails (model error, timeout, index
//! outage) nothing is written.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{debug, info};

use course_rag_core::chunk::ChunkConfig;
use course_rag_core::index::{CourseIndex, IndexConfig};
use course_rag_core::models::{CourseCatalog, SourceRef};
use course_rag_core::store::memory::InMemoryStore;
use course_rag_core::store::Store;
use course_rag_core::Result;

use crate::config::{Config, DocumentsConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::ingest::{self, IngestReport};
use crate::llm::LanguageModel;
use crate::migrate;
use crate::orchestrator::ToolLoop;
use crate::session::{Role, SessionStore, Turn};
use crate::sqlite_store::SqliteStore;
use crate::tools::CourseTools;

/// Answer to one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// The session the turn was recorded in. Differs from the requested id
    /// when that id was missing or unknown.
    pub session_id: String,
}

pub fn index_config(config: &Config) -> IndexConfig {
    IndexConfig {
        chunking: ChunkConfig {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
        },
        course_match_max_distance: config.retrieval.course_match_max_distance,
        max_chunk_distance: config.retrieval.max_chunk_distance,
    }
}

/// Open the configured store backend, creating the schema if needed.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.db.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool)
                .await
                .context("Failed to create database schema")?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
        other => bail!("Unknown db backend: {}", other),
    }
}

/// Build a [`CourseIndex`] from configuration.
pub async fn open_index(config: &Config) -> anyhow::Result<CourseIndex> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    info!(
        backend = %config.db.backend,
        embedder = embedder.model_name(),
        dims = embedder.dims(),
        "opened course index"
    );
    Ok(CourseIndex::new(store, embedder, index_config(config)))
}

/// Course question-answering system.
#[derive(Clone)]
pub struct RagSystem {
    index: CourseIndex,
    tool_loop: ToolLoop,
    sessions: Arc<SessionStore>,
    documents: DocumentsConfig,
}

impl RagSystem {
    pub fn new(index: CourseIndex, model: Arc<dyn LanguageModel>, config: &Config) -> Self {
        let tools = CourseTools::new(index.clone(), config.retrieval.max_results);
        let tool_loop = ToolLoop::new(
            model,
            tools,
            config.llm.max_tool_rounds,
            Duration::from_secs(config.llm.timeout_secs),
        );
        Self {
            index,
            tool_loop,
            sessions: Arc::new(SessionStore::new(config.session.max_history)),
            documents: config.documents.clone(),
        }
    }

    pub fn index(&self) -> &CourseIndex {
        &self.index
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer `text` in the context of a session.
    ///
    /// A missing or unknown `session_id` starts a new session. On success the
    /// (user, assistant) pair is appended to the session; on error the
    /// session is untouched.
    pub async fn query(&self, text: &str, session_id: Option<&str>) -> Result<QueryResponse> {
        let (session_id, mut history) = self.sessions.open(session_id).await;
        let past: Vec<Turn> = history.turns();
        debug!(session = %session_id, history = past.len(), "running query");

        let outcome = self.tool_loop.run(&past, text).await?;

        history.push(Role::User, text);
        history.push(Role::Assistant, outcome.answer.as_str());
        drop(history);

        info!(
            session = %session_id,
            tool_rounds = outcome.tool_rounds,
            sources = outcome.sources.len(),
            "query answered"
        );

        Ok(QueryResponse {
            answer: outcome.answer,
            sources: outcome.sources,
            session_id,
        })
    }

    /// Ingest every course document under `root`, or under the configured
    /// documents root when `root` is `None`.
    pub async fn ingest_all(&self, root: Option<&Path>) -> anyhow::Result<IngestReport> {
        let root = root.unwrap_or(self.documents.root.as_path());
        ingest::ingest_directory(&self.index, root, &self.documents).await
    }

    pub async fn list_courses(&self) -> Result<CourseCatalog> {
        self.index.list_courses().await
    }

    pub async fn history(&self, session_id: &str) -> Vec<Turn> {
        self.sessions.get_history(session_id).await
    }

    /// Forget a session's history. Returns `false` for unknown ids.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id).await
    }
}
