//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates a file; [`Config::default`]
//! gives an all-defaults configuration for tests and first runs.
//!
//! ```toml
//! [db]
//! backend = "sqlite"
//! path = "./data/courses.sqlite"
//!
//! [documents]
//! root = "./docs"
//!
//! [embedding]
//! provider = "local"
//!
//! [llm]
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// `"sqlite"` or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/courses.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_docs_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_docs_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Largest cosine distance at which a loose course name still resolves.
    #[serde(default = "default_course_match_max_distance")]
    pub course_match_max_distance: f32,
    #[serde(default)]
    pub max_chunk_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            course_match_max_distance: default_course_match_max_distance(),
            max_chunk_distance: None,
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_course_match_max_distance() -> f32 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"local"`, `"openai"`, `"ollama"` or `"hash"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"anthropic"` or `"openai"` (any OpenAI-compatible endpoint).
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: None,
            api_key_env: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            max_tool_rounds: default_max_tool_rounds(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tokens() -> u32 {
    800
}
fn default_max_tool_rounds() -> usize {
    2
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    /// The environment variable the API key is read from.
    pub fn api_key_var(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => var,
            (None, "openai") => "OPENAI_API_KEY",
            (None, _) => "ANTHROPIC_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Number of (user, assistant) exchanges replayed to the model.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_max_history() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    match config.db.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!("Unknown db backend: '{}'. Must be sqlite or memory.", other),
    }

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.retrieval.course_match_max_distance) {
        anyhow::bail!("retrieval.course_match_max_distance must be in [0.0, 2.0]");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "local" | "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hash.",
            other
        ),
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "anthropic" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be anthropic or openai.",
            other
        ),
    }
    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.db.backend, "sqlite");
        assert_eq!(cfg.chunking.chunk_size, 800);
        assert_eq!(cfg.chunking.chunk_overlap, 100);
        assert_eq!(cfg.retrieval.max_results, 5);
        assert_eq!(cfg.session.max_history, 2);
        assert_eq!(cfg.llm.model, "claude-sonnet-4-20250514");
        assert_eq!(cfg.llm.max_tool_rounds, 2);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert_eq!(cfg.llm.api_key_var(), "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_overrides() {
        let cfg = parse_config(
            r#"
[db]
backend = "memory"

[chunking]
chunk_size = 400
chunk_overlap = 50

[embedding]
provider = "hash"
dims = 128

[llm]
provider = "openai"
model = "gpt-4o-mini"
"#,
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.db.backend, "memory");
        assert_eq!(cfg.chunking.chunk_size, 400);
        assert_eq!(cfg.embedding.dims, Some(128));
        assert_eq!(cfg.llm.api_key_var(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let cfg = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_remote_embedding_needs_model_and_dims() {
        let cfg = parse_config("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let cfg = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap();
        assert!(validate(&cfg).is_err());
        let cfg = parse_config("[llm]\nprovider = \"magic\"\n").unwrap();
        assert!(validate(&cfg).is_err());
        let cfg = parse_config("[db]\nbackend = \"postgres\"\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/crag.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
