//! Retrieval entry point and memory lifecycle.
//!
//! The [`Orchestrator`] coordinates the metadata store, the chunk and memory
//! vector indices, the [`Ranker`] and an optional [`Embedder`]. Embedding
//! failures never escape as errors: they come back as a [`Degradation`] on the
//! [`Outcome`] while the call still succeeds with reduced functionality.
//!
//! Writes are two-step and weakly consistent. The metadata record is written
//! first; a failed record write aborts before any embedding is attempted, and a
//! failed vector write afterwards leaves the record durable but unsearchable.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::memory::classify::classify;
use crate::memory::ranker::{Candidate, Ranker, Scored};
use crate::memory::store::MetadataStore;
use crate::memory::types::{Chunk, Memory, MemoryType, Session};
use crate::memory::vector::VectorIndex;

/// Default upper bound on one embedding call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an operation ran with reduced functionality.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Degradation {
    /// No embedding capability is configured.
    NoEmbedder,
    /// The embedder returned an error.
    EmbedFailed(String),
    /// The embedder did not answer within the configured timeout.
    EmbedTimedOut,
    /// The record was stored but its vector could not be written.
    IndexWriteFailed(String),
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEmbedder => f.write_str("no embedder configured"),
            Self::EmbedFailed(e) => write!(f, "embedding failed: {e}"),
            Self::EmbedTimedOut => f.write_str("embedding timed out"),
            Self::IndexWriteFailed(e) => write!(f, "vector write failed: {e}"),
        }
    }
}

/// A successful result that may have been produced in degraded mode.
///
/// `Err` from the surrounding `Result` is a hard failure; `degraded: None` is
/// full success; `degraded: Some(_)` is success with reduced functionality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

impl<T> Outcome<T> {
    pub fn full(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    pub fn degraded(value: T, reason: Degradation) -> Self {
        Self {
            value,
            degraded: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Knobs for [`Orchestrator::retrieve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieveOptions {
    pub top_k_chunks: usize,
    pub top_k_memories: usize,
    pub similarity_threshold: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrieveOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k_chunks: config.top_k_chunks,
            top_k_memories: config.top_k_memories,
            similarity_threshold: config.similarity_threshold,
        }
    }
}

/// Chunks and memories relevant to a query, each in ranker order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub chunks: Vec<Scored<Chunk>>,
    pub memories: Vec<Scored<Memory>>,
}

/// The retrieval capability the context builder depends on.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Outcome<Retrieval>>;
}

pub struct Orchestrator {
    store: Arc<dyn MetadataStore>,
    chunk_index: Arc<dyn VectorIndex>,
    memory_index: Arc<dyn VectorIndex>,
    ranker: Ranker,
    embedder: Option<Arc<dyn Embedder>>,
    embed_timeout: Duration,
    search_threshold: f32,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        chunk_index: Arc<dyn VectorIndex>,
        memory_index: Arc<dyn VectorIndex>,
        ranker: Ranker,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            store,
            chunk_index,
            memory_index,
            ranker,
            embedder,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            search_threshold: RetrieveOptions::default().similarity_threshold,
        }
    }

    /// Minimum similarity for [`Orchestrator::search`] hits.
    pub fn with_search_threshold(mut self, threshold: f32) -> Self {
        self.search_threshold = threshold;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Embed a single text, translating every failure into a [`Degradation`].
    async fn embed_one(&self, text: &str) -> std::result::Result<Vec<f32>, Degradation> {
        let embedder = self.embedder.as_ref().ok_or(Degradation::NoEmbedder)?;
        let texts = [text.to_string()];

        let vectors = match tokio::time::timeout(self.embed_timeout, embedder.embed(&texts)).await {
            Err(_) => return Err(Degradation::EmbedTimedOut),
            Ok(Err(e)) => return Err(Degradation::EmbedFailed(format!("{e:#}"))),
            Ok(Ok(vectors)) => vectors,
        };

        match vectors.into_iter().next() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Degradation::EmbedFailed("embedder returned no vector".into())),
        }
    }

    /// Embed `text` and store it under `id`. Failures are reported, not raised.
    async fn index(&self, index: &dyn VectorIndex, id: &str, text: &str) -> Option<Degradation> {
        let vector = match self.embed_one(text).await {
            Ok(v) => v,
            Err(Degradation::NoEmbedder) => return Some(Degradation::NoEmbedder),
            Err(reason) => {
                tracing::warn!(id = %id, %reason, "stored without embedding");
                return Some(reason);
            }
        };
        match index.upsert(id, &vector) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "vector write failed; record kept");
                Some(Degradation::IndexWriteFailed(e.to_string()))
            }
        }
    }

    /// Find chunks and memories relevant to `query`.
    ///
    /// Without a working embedder this returns every stored memory in
    /// insertion order and no chunks.
    pub async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Outcome<Retrieval>> {
        let query_vec = match self.embed_one(query).await {
            Ok(v) => v,
            Err(reason) => {
                if reason != Degradation::NoEmbedder {
                    tracing::warn!(%reason, "semantic retrieval unavailable, returning all memories");
                }
                let memories = self
                    .store
                    .list_memories(None)?
                    .into_iter()
                    .map(Scored::unscored)
                    .collect();
                return Ok(Outcome::degraded(
                    Retrieval {
                        chunks: Vec::new(),
                        memories,
                    },
                    reason,
                ));
            }
        };

        let chunk_matches =
            self.chunk_index
                .search(&query_vec, options.top_k_chunks, options.similarity_threshold)?;
        let memory_matches =
            self.memory_index
                .search(&query_vec, options.top_k_memories, options.similarity_threshold)?;

        let mut chunks = Vec::with_capacity(chunk_matches.len());
        for m in chunk_matches {
            match self.store.get_chunk(&m.id)? {
                Some(chunk) => chunks.push((chunk, m.similarity)),
                None => tracing::debug!(id = %m.id, "stale chunk vector skipped"),
            }
        }

        let mut memories = Vec::with_capacity(memory_matches.len());
        for m in memory_matches {
            match self.store.get_memory(&m.id)? {
                Some(memory) => memories.push((memory, m.similarity)),
                None => tracing::debug!(id = %m.id, "stale memory vector skipped"),
            }
        }

        Ok(Outcome::full(Retrieval {
            chunks: self.ranker.rank(chunks),
            memories: self.ranker.rank(memories),
        }))
    }

    /// Mixed semantic search over chunks and memories, best first.
    /// Degraded searches return an empty list.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Outcome<Vec<Candidate>>> {
        let options = RetrieveOptions {
            top_k_chunks: top_k,
            top_k_memories: top_k,
            similarity_threshold: self.search_threshold,
        };
        let outcome = self.retrieve(query, &options).await?;
        if let Some(reason) = outcome.degraded {
            return Ok(Outcome::degraded(Vec::new(), reason));
        }
        let Retrieval { chunks, memories } = outcome.value;
        let mut merged = self.ranker.merge(chunks, memories);
        merged.truncate(top_k);
        Ok(Outcome::full(merged))
    }

    /// Store a new memory.
    ///
    /// An empty `memory_type` auto-classifies from the content; any other
    /// unrecognized value fails with [`Error::InvalidType`] before anything is
    /// written.
    pub async fn remember(&self, content: &str, memory_type: &str, source: &str) -> Result<Outcome<Memory>> {
        let kind = if memory_type.trim().is_empty() {
            classify(content)
        } else {
            memory_type.parse::<MemoryType>()?
        };

        let memory = Memory::new(content, kind, source);
        self.store.insert_memory(&memory)?;
        tracing::info!(id = %memory.id, memory_type = %kind, "memory stored");

        let degraded = self
            .index(self.memory_index.as_ref(), &memory.id, &memory.content)
            .await;
        Ok(Outcome {
            value: memory,
            degraded,
        })
    }

    /// Delete a memory and its vector.
    pub fn forget(&self, id: &str) -> Result<()> {
        let removed = self.store.delete_memory(id)?;
        self.memory_index.delete(id)?;
        if !removed {
            return Err(Error::not_found("memory", id));
        }
        tracing::info!(id = %id, "memory forgotten");
        Ok(())
    }

    /// Delete every memory of one type. Returns how many were removed.
    pub fn forget_by_type(&self, memory_type: &str) -> Result<usize> {
        let kind: MemoryType = memory_type.parse()?;
        let doomed = self.store.list_memories(Some(kind))?;
        for memory in &doomed {
            self.store.delete_memory(&memory.id)?;
            self.memory_index.delete(&memory.id)?;
        }
        tracing::info!(memory_type = %kind, count = doomed.len(), "memories forgotten by type");
        Ok(doomed.len())
    }

    /// Persist a chunk from the indexer and embed it when possible.
    pub async fn index_chunk(&self, chunk: &Chunk) -> Result<Outcome<()>> {
        self.store.insert_chunk(chunk)?;
        let degraded = self
            .index(self.chunk_index.as_ref(), &chunk.id, &chunk.content)
            .await;
        Ok(Outcome { value: (), degraded })
    }

    /// Remove an indexed file, its chunks, and their vectors. Returns the number
    /// of chunks removed.
    pub fn remove_file(&self, path: &str) -> Result<usize> {
        let file = self
            .store
            .get_file_by_path(path)?
            .ok_or_else(|| Error::not_found("file", path))?;
        let chunk_ids = self.store.delete_file(&file.id)?;
        for id in &chunk_ids {
            self.chunk_index.delete(id)?;
        }
        Ok(chunk_ids.len())
    }

    /// Append an interaction to the session log.
    pub fn record_session(
        &self,
        question: &str,
        response_summary: &str,
        model_used: &str,
        tokens_used: u32,
        sources: &[String],
    ) -> Result<Session> {
        let mut session = Session::new(question, response_summary, model_used, tokens_used);
        session.context_used = serde_json::to_string(sources)?;
        self.store.insert_session(&session)?;
        Ok(session)
    }
}

#[async_trait]
impl Retriever for Orchestrator {
    async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Outcome<Retrieval>> {
        Orchestrator::retrieve(self, query, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::SqliteStore;
    use crate::memory::vector::SqliteVectorIndex;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![vec![1.0]])
        }

        fn model(&self) -> &str {
            "slow"
        }
    }

    fn orchestrator(embedder: Option<Arc<dyn Embedder>>) -> (Orchestrator, Arc<SqliteVectorIndex>) {
        let conn = db::share(db::open_memory_database().unwrap());
        let memory_index = Arc::new(SqliteVectorIndex::memories(conn.clone()));
        let orch = Orchestrator::new(
            Arc::new(SqliteStore::new(conn.clone())),
            Arc::new(SqliteVectorIndex::chunks(conn)),
            memory_index.clone(),
            Ranker::default(),
            embedder,
        );
        (orch, memory_index)
    }

    #[tokio::test]
    async fn remember_without_embedder_is_degraded_but_stored() {
        let (orch, index) = orchestrator(None);
        let outcome = orch.remember("use PostgreSQL", "decision", "user").await.unwrap();
        assert_eq!(outcome.degraded, Some(Degradation::NoEmbedder));
        assert_eq!(outcome.value.importance, 0.8);
        assert!(orch.store().get_memory(&outcome.value.id).unwrap().is_some());
        assert!(index.is_empty().unwrap());
    }

    #[tokio::test]
    async fn remember_indexes_when_embedder_present() {
        let (orch, index) = orchestrator(Some(Arc::new(FixedEmbedder(vec![1.0, 0.0]))));
        let outcome = orch.remember("always validate input", "", "user").await.unwrap();
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.value.memory_type, MemoryType::Constraint);
        assert_eq!(index.len().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_embedder_times_out_into_degradation() {
        let (orch, index) = orchestrator(Some(Arc::new(SlowEmbedder)));
        let orch = orch.with_embed_timeout(Duration::from_millis(50));

        let outcome = orch.remember("a note", "note", "user").await.unwrap();
        assert_eq!(outcome.degraded, Some(Degradation::EmbedTimedOut));
        assert!(index.is_empty().unwrap());

        let retrieval = orch.retrieve("anything", &RetrieveOptions::default()).await.unwrap();
        assert_eq!(retrieval.degraded, Some(Degradation::EmbedTimedOut));
        assert_eq!(retrieval.value.memories.len(), 1);
    }

    #[tokio::test]
    async fn search_merges_kinds() {
        let (orch, _) = orchestrator(Some(Arc::new(FixedEmbedder(vec![1.0, 1.0]))));
        orch.remember("we use JWT", "decision", "user").await.unwrap();

        let hits = orch.search("auth", 5).await.unwrap();
        assert!(!hits.is_degraded());
        assert_eq!(hits.value.len(), 1);
        assert!(matches!(hits.value[0], Candidate::Memory(_)));
    }

    #[tokio::test]
    async fn search_applies_configured_threshold() {
        let (orch, index) = orchestrator(Some(Arc::new(FixedEmbedder(vec![1.0, 0.0]))));
        let orch = orch.with_search_threshold(0.5);
        orch.remember("we use JWT", "decision", "user").await.unwrap();
        let far = orch.remember("unrelated", "note", "user").await.unwrap().value;
        index.upsert(&far.id, &[0.0, 1.0]).unwrap();

        let hits = orch.search("auth", 5).await.unwrap().value;
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|c| c.id() != far.id));

        let (loose, loose_index) = orchestrator(Some(Arc::new(FixedEmbedder(vec![1.0, 0.0]))));
        let far = loose.remember("unrelated", "note", "user").await.unwrap().value;
        loose_index.upsert(&far.id, &[0.0, 1.0]).unwrap();
        assert_eq!(loose.search("auth", 5).await.unwrap().value.len(), 1);
    }

    #[tokio::test]
    async fn search_without_embedder_is_empty() {
        let (orch, _) = orchestrator(None);
        orch.remember("we use JWT", "decision", "user").await.unwrap();
        let hits = orch.search("auth", 5).await.unwrap();
        assert!(hits.is_degraded());
        assert!(hits.value.is_empty());
    }

    #[test]
    fn record_session_stores_sources_as_json() {
        let (orch, _) = orchestrator(None);
        let session = orch
            .record_session("how to deploy?", "docker compose", "claude", 120, &["decision:1".into()])
            .unwrap();
        assert_eq!(session.context_used, r#"["decision:1"]"#);
        assert_eq!(orch.store().last_sessions(1).unwrap()[0].id, session.id);
    }
}
