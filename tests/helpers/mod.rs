#![allow(dead_code)]

use async_trait::async_trait;
use memvault::db::{self, SharedConnection};
use memvault::embedding::Embedder;
use memvault::memory::orchestrator::Orchestrator;
use memvault::memory::ranker::Ranker;
use memvault::memory::store::{MetadataStore, SqliteStore};
use memvault::memory::vector::SqliteVectorIndex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> SharedConnection {
    db::share(db::open_memory_database().unwrap())
}

/// A vector of `dim` copies of `value`.
pub fn uniform(dim: usize, value: f32) -> Vec<f32> {
    vec![value; dim]
}

/// Deterministic unit vector with a spike at position `seed`.
pub fn spike(dim: usize, seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    v[seed % dim] = 1.0;
    v
}

/// Returns a fixed vector per exact text, and `fallback` for anything else.
pub struct TableEmbedder {
    table: Mutex<HashMap<String, Vec<f32>>>,
    fallback: Vec<f32>,
    calls: Mutex<usize>,
}

impl TableEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(0),
        }
    }

    pub fn with(self, text: &str, vector: Vec<f32>) -> Self {
        self.table.lock().unwrap().insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        *self.calls.lock().unwrap() += 1;
        let table = self.table.lock().unwrap();
        Ok(texts
            .iter()
            .map(|t| table.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
            .collect())
    }

    fn model(&self) -> &str {
        "table-test"
    }
}

/// Always fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("connection refused")
    }

    fn model(&self) -> &str {
        "failing-test"
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowEmbedder;

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    fn model(&self) -> &str {
        "slow-test"
    }
}

/// An orchestrator over one shared in-memory database, with handles to every part.
pub struct Harness {
    pub db: SharedConnection,
    pub store: Arc<SqliteStore>,
    pub chunks: Arc<SqliteVectorIndex>,
    pub memories: Arc<SqliteVectorIndex>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn harness(embedder: Option<Arc<dyn Embedder>>) -> Harness {
    harness_with_timeout(embedder, Duration::from_secs(5))
}

pub fn harness_with_timeout(embedder: Option<Arc<dyn Embedder>>, timeout: Duration) -> Harness {
    let db = test_db();
    let store = Arc::new(SqliteStore::new(db.clone()));
    let chunks = Arc::new(SqliteVectorIndex::chunks(db.clone()));
    let memories = Arc::new(SqliteVectorIndex::memories(db.clone()));
    let orchestrator = Arc::new(
        Orchestrator::new(
            store.clone(),
            chunks.clone(),
            memories.clone(),
            Ranker::default(),
            embedder,
        )
        .with_embed_timeout(timeout),
    );
    Harness {
        db,
        store,
        chunks,
        memories,
        orchestrator,
    }
}

impl Harness {
    pub fn store_dyn(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}
