//! Keyed embedding storage with brute-force cosine search.
//!
//! Vectors are stored as little-endian `f32` blobs in one table per
//! [`IndexSpace`]. Search scans every row (O(n·d)); per-project corpora are in
//! the thousands, so no index structure is maintained. [`VectorIndex`] is the
//! seam for an approximate backend should that ever change.

use rusqlite::params;
use serde::Serialize;
use std::cmp::Ordering;

use crate::db::{self, SharedConnection};
use crate::error::Result;

/// Width in bytes of one encoded vector component.
pub const COMPONENT_WIDTH: usize = std::mem::size_of::<f32>();

/// Encode a vector as `4 * len` little-endian bytes.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * COMPONENT_WIDTH);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a blob produced by [`encode`]. Trailing bytes short of a full
/// component are ignored.
pub fn decode(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(COMPONENT_WIDTH)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity of two equal-length vectors. Zero when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// A search hit. `distance` is `1 - similarity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMatch {
    pub id: String,
    pub distance: f32,
    pub similarity: f32,
}

/// Durable id → vector storage with similarity search.
pub trait VectorIndex: Send + Sync {
    /// Replace any vector stored for `id`. An empty vector is a no-op.
    fn upsert(&self, id: &str, vector: &[f32]) -> Result<()>;

    /// Remove the vector for `id`. Deleting a missing id is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Up to `top_k` stored vectors with similarity ≥ `threshold`, most similar
    /// first, ties in insertion order. An empty query yields no matches.
    fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<VectorMatch>>;
}

/// Which of the two independent index spaces a store addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpace {
    Chunks,
    Memories,
}

impl IndexSpace {
    fn table(self) -> &'static str {
        match self {
            Self::Chunks => "chunk_embeddings",
            Self::Memories => "memory_embeddings",
        }
    }
}

/// [`VectorIndex`] over one embedding table of the project database.
#[derive(Clone)]
pub struct SqliteVectorIndex {
    db: SharedConnection,
    space: IndexSpace,
}

impl SqliteVectorIndex {
    pub fn new(db: SharedConnection, space: IndexSpace) -> Self {
        Self { db, space }
    }

    pub fn chunks(db: SharedConnection) -> Self {
        Self::new(db, IndexSpace::Chunks)
    }

    pub fn memories(db: SharedConnection) -> Self {
        Self::new(db, IndexSpace::Memories)
    }

    pub fn space(&self) -> IndexSpace {
        self.space
    }

    /// Number of stored vectors.
    pub fn len(&self) -> Result<usize> {
        let conn = db::lock(&self.db)?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.space.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Ok(());
        }
        let conn = db::lock(&self.db)?;
        // ON CONFLICT keeps the original rowid, so tie order stays stable across re-embeds.
        conn.execute(
            &format!(
                "INSERT INTO {} (id, embedding) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                self.space.table()
            ),
            params![id, encode(vector)],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = db::lock(&self.db)?;
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.space.table()),
            params![id],
        )?;
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<VectorMatch>> {
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = db::lock(&self.db)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, embedding FROM {} ORDER BY rowid",
            self.space.table()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let query_bytes = query.len() * COMPONENT_WIDTH;
        let mut scored = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            if blob.len() != query_bytes {
                continue;
            }
            let similarity = cosine_similarity(query, &decode(&blob));
            if similarity >= threshold {
                scored.push(VectorMatch {
                    id,
                    distance: 1.0 - similarity,
                    similarity,
                });
            }
        }

        // Stable sort: equal similarities keep rowid order.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(top_k);

        tracing::debug!(
            space = ?self.space,
            matches = scored.len(),
            top_k,
            threshold,
            "vector search"
        );
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(space: IndexSpace) -> SqliteVectorIndex {
        let conn = crate::db::open_memory_database().unwrap();
        SqliteVectorIndex::new(crate::db::share(conn), space)
    }

    fn uniform(value: f32) -> Vec<f32> {
        vec![value; 768]
    }

    #[test]
    fn encode_is_little_endian() {
        let blob = encode(&[1.0, 2.0, 3.0]);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[0..4], &1.0f32.to_le_bytes());
    }

    #[test]
    fn codec_round_trips_extremes() {
        let input = [0.0, -1.0, 1e-10, 1e10, f32::MAX, f32::MIN, f32::MIN_POSITIVE, -0.0];
        let output = decode(&encode(&input));
        assert_eq!(output.len(), input.len());
        for (a, b) in input.iter().zip(&output) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn codec_handles_empty() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).is_empty());
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn empty_upsert_is_noop() {
        let idx = index(IndexSpace::Chunks);
        idx.upsert("id", &[]).unwrap();
        assert!(idx.is_empty().unwrap());
    }

    #[test]
    fn empty_query_returns_nothing() {
        let idx = index(IndexSpace::Memories);
        idx.upsert("a", &uniform(1.0)).unwrap();
        assert!(idx.search(&[], 10, 0.0).unwrap().is_empty());
    }

    #[test]
    fn upsert_replaces_without_duplicating() {
        let idx = index(IndexSpace::Chunks);
        idx.upsert("a", &[1.0, 0.0]).unwrap();
        idx.upsert("a", &[0.0, 1.0]).unwrap();
        assert_eq!(idx.len().unwrap(), 1);

        let hits = idx.search(&[0.0, 1.0], 10, 0.9).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let idx = index(IndexSpace::Chunks);
        idx.upsert("first", &[1.0, 1.0]).unwrap();
        idx.upsert("second", &[2.0, 2.0]).unwrap();
        idx.upsert("third", &[3.0, 3.0]).unwrap();
        // Re-embedding keeps the original position.
        idx.upsert("first", &[4.0, 4.0]).unwrap();

        let ids: Vec<String> = idx
            .search(&[1.0, 1.0], 10, 0.0)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let idx = index(IndexSpace::Chunks);
        idx.upsert("short", &[1.0, 1.0]).unwrap();
        idx.upsert("long", &[1.0, 1.0, 1.0]).unwrap();

        let hits = idx.search(&[1.0, 1.0], 10, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "short");
    }

    #[test]
    fn spaces_are_never_cross_matched() {
        let conn = crate::db::share(crate::db::open_memory_database().unwrap());
        let chunks = SqliteVectorIndex::chunks(conn.clone());
        let memories = SqliteVectorIndex::memories(conn);

        chunks.upsert("c1", &uniform(1.0)).unwrap();
        assert!(memories.search(&uniform(1.0), 10, 0.0).unwrap().is_empty());
        assert_eq!(chunks.search(&uniform(1.0), 10, 0.0).unwrap().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let idx = index(IndexSpace::Memories);
        idx.upsert("gone", &uniform(1.0)).unwrap();
        idx.delete("gone").unwrap();
        idx.delete("gone").unwrap();
        idx.delete("never-existed").unwrap();
        assert!(idx.search(&uniform(1.0), 10, 0.0).unwrap().is_empty());
    }
}
