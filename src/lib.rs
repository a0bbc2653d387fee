//! Persistent project memory and context assembly for AI coding assistants.
//!
//! memvault stores project facts (decisions, conventions, constraints, notes,
//! todos) and source chunks in a per-project SQLite database, retrieves the
//! ones relevant to a question by embedding similarity, and composes them into
//! a token-bounded context block.
//!
//! | Type | Importance | Where it appears in a built context |
//! |------|------------|-------------------------------------|
//! | **Decision** | 0.8 | Context body, always |
//! | **Constraint** | 0.8 | System prompt, always |
//! | **Convention** | 0.7 | System prompt, always |
//! | **Todo** | 0.6 | Context body, when retrieved |
//! | **Note** | 0.5 | Context body, when retrieved |
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) holding metadata plus two vector tables, one for
//!   chunk embeddings and one for memory embeddings
//! - **Search**: brute-force cosine similarity over little-endian f32 blobs
//! - **Embeddings**: optional; any OpenAI-compatible `/embeddings` endpoint.
//!   Without one, retrieval degrades to "all memories, no chunks"
//! - **Ranking**: `0.7 * similarity + 0.3 * importance`, stable on ties
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: connection setup, schema, migrations and health checks
//! - [`embedding`]: the [`Embedder`](embedding::Embedder) capability and its HTTP implementation
//! - [`memory`]: metadata store, vector indices, ranker and the orchestrator
//! - [`context`]: tokenizers, formatters and the budgeted context builder

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod logging;
pub mod memory;

pub use error::{Error, Result};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::config::VaultConfig;
use crate::context::{BuildOptions, BuildResult, ContextBuilder, MarkdownFormatter};
use crate::db::SharedConnection;
use crate::embedding::Embedder;
use crate::memory::orchestrator::Orchestrator;
use crate::memory::ranker::Ranker;
use crate::memory::store::{MetadataStore, SqliteStore};
use crate::memory::vector::SqliteVectorIndex;

/// A project's memory engine wired from configuration.
pub struct Vault {
    config: VaultConfig,
    db: SharedConnection,
    orchestrator: Arc<Orchestrator>,
    builder: ContextBuilder,
}

impl Vault {
    /// Open the vault for the project rooted at `root`.
    pub fn open(root: impl AsRef<Path>, config: VaultConfig) -> anyhow::Result<Self> {
        let path = config.resolved_db_path(root);
        let conn = db::open_database(&path)?;
        let embedder = embedding::create_embedder(&config.embedding)?;
        Self::from_parts(db::share(conn), config, embedder)
    }

    /// Assemble a vault over an already-initialized connection.
    pub fn from_parts(
        db: SharedConnection,
        config: VaultConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        if let Some(embedder) = &embedder {
            record_embedding_model(&db, embedder.model())?;
        }

        let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(db.clone()));
        let ranker = Ranker::new(
            config.retrieval.similarity_weight,
            config.retrieval.importance_weight,
        );
        let orchestrator = Arc::new(
            Orchestrator::new(
                store.clone(),
                Arc::new(SqliteVectorIndex::chunks(db.clone())),
                Arc::new(SqliteVectorIndex::memories(db.clone())),
                ranker,
                embedder,
            )
            .with_embed_timeout(Duration::from_millis(config.embedding.timeout_ms))
            .with_search_threshold(config.retrieval.similarity_threshold),
        );
        let tokenizer = context::create_tokenizer(&config.context.tokenizer)?;
        let builder = ContextBuilder::new(
            store,
            orchestrator.clone(),
            Arc::new(MarkdownFormatter),
            tokenizer,
        )
        .with_ranker(ranker);

        Ok(Self {
            config,
            db,
            orchestrator,
            builder,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.db
    }

    /// Build context for `question` with the configured defaults.
    pub async fn build_context(&self, question: &str) -> Result<BuildResult> {
        let options = BuildOptions::from_config(question, &self.config);
        self.builder.build(&options).await
    }

    pub async fn build(&self, options: &BuildOptions) -> Result<BuildResult> {
        self.builder.build(options).await
    }
}

/// Record which model produced stored vectors, warning when it changes.
fn record_embedding_model(db: &SharedConnection, model: &str) -> anyhow::Result<()> {
    let conn = db::lock(db)?;
    match db::migrations::get_embedding_model(&conn)? {
        Some(previous) if previous != model => {
            tracing::warn!(
                previous = %previous,
                current = %model,
                "embedding model changed; stored vectors may not be comparable"
            );
        }
        Some(_) => return Ok(()),
        None => {}
    }
    db::migrations::set_embedding_model(&conn, model).context("failed to record embedding model")?;
    Ok(())
}
