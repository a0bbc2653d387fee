use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Error;

/// Name of the per-project state directory.
pub const VAULT_DIR: &str = ".memvault";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VaultConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path. Empty means `<root>/.memvault/memvault.db`.
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"none"`, `"openai"` or `"ollama"`.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Requested output dimension, for endpoints that support truncation.
    pub dimensions: Option<usize>,
    /// Upper bound on a single embedding call.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k_chunks: usize,
    pub top_k_memories: usize,
    pub similarity_threshold: f32,
    pub similarity_weight: f64,
    pub importance_weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    /// Context body budget; zero or negative means unbounded.
    pub max_tokens: i64,
    pub top_k_sessions: usize,
    /// `"heuristic"` or a path to a `tokenizer.json`.
    pub tokenizer: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            model: "nomic-embed-text".into(),
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            dimensions: None,
            timeout_ms: 30_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_chunks: 10,
            top_k_memories: 5,
            similarity_threshold: 0.0,
            similarity_weight: 0.7,
            importance_weight: 0.3,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            top_k_sessions: 0,
            tokenizer: "heuristic".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Returns `<root>/.memvault/`
pub fn vault_dir(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(VAULT_DIR)
}

/// Returns `<root>/.memvault/config.toml`
pub fn project_config_path(root: impl AsRef<Path>) -> PathBuf {
    vault_dir(root).join("config.toml")
}

/// Returns `<root>/.memvault/memvault.db`
pub fn project_db_path(root: impl AsRef<Path>) -> PathBuf {
    vault_dir(root).join("memvault.db")
}

impl VaultConfig {
    /// Load the project config under `root` then apply env var overrides.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        Self::load_from(project_config_path(root))
    }

    /// Load from a specific path (defaults if absent), then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VaultConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMVAULT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_EMBED_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_EMBED_URL") {
            self.embedding.base_url = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_API_KEY") {
            self.embedding.api_key = Some(val);
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        let r = &self.retrieval;
        if !(-1.0..=1.0).contains(&r.similarity_threshold) {
            return Err(Error::Config(format!(
                "retrieval.similarity_threshold must be within [-1, 1], got {}",
                r.similarity_threshold
            )));
        }
        if r.similarity_weight <= 0.0 && r.importance_weight <= 0.0 {
            return Err(Error::Config(
                "retrieval weights must not both be zero or negative".into(),
            ));
        }
        if self.embedding.timeout_ms == 0 {
            return Err(Error::Config("embedding.timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Database path for the project at `root`, expanding `~`.
    pub fn resolved_db_path(&self, root: impl AsRef<Path>) -> PathBuf {
        if self.storage.db_path.is_empty() {
            project_db_path(root)
        } else {
            expand_tilde(&self.storage.db_path)
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
