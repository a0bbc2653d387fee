//! Blended relevance ordering for retrieved chunks and memories.
//!
//! `score = similarity_weight * similarity + importance_weight * importance`.
//! Both weights are clamped to be non-negative, so the score never decreases
//! when either input grows. Sorting is stable: equal scores keep the order the
//! candidates arrived in (vector search order, which is itself insertion order
//! on ties).

use serde::Serialize;
use std::cmp::Ordering;

use crate::memory::types::{Chunk, Memory};

/// Static importance assigned to code chunks, which carry none of their own.
pub const CHUNK_IMPORTANCE: f64 = 0.5;

/// Anything the ranker can order.
pub trait Rankable {
    fn id(&self) -> &str;
    fn importance(&self) -> f64;
}

impl Rankable for Memory {
    fn id(&self) -> &str {
        &self.id
    }

    fn importance(&self) -> f64 {
        self.importance
    }
}

impl Rankable for Chunk {
    fn id(&self) -> &str {
        &self.id
    }

    fn importance(&self) -> f64 {
        CHUNK_IMPORTANCE
    }
}

/// A retrieved entity with its similarity and blended score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<T> {
    pub item: T,
    pub similarity: f32,
    pub score: f64,
}

impl<T> Scored<T> {
    /// Wrap an entity that was not produced by similarity search.
    pub fn unscored(item: T) -> Self {
        Self {
            item,
            similarity: 0.0,
            score: 0.0,
        }
    }
}

/// One entry of a mixed, ranked result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Candidate {
    Chunk(Scored<Chunk>),
    Memory(Scored<Memory>),
}

impl Candidate {
    pub fn score(&self) -> f64 {
        match self {
            Self::Chunk(c) => c.score,
            Self::Memory(m) => m.score,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Chunk(c) => &c.item.id,
            Self::Memory(m) => &m.item.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranker {
    similarity_weight: f64,
    importance_weight: f64,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(0.7, 0.3)
    }
}

impl Ranker {
    pub fn new(similarity_weight: f64, importance_weight: f64) -> Self {
        Self {
            similarity_weight: similarity_weight.max(0.0),
            importance_weight: importance_weight.max(0.0),
        }
    }

    pub fn score(&self, similarity: f32, importance: f64) -> f64 {
        self.similarity_weight * f64::from(similarity) + self.importance_weight * importance
    }

    /// Score and order `(entity, similarity)` pairs, best first.
    pub fn rank<T: Rankable>(&self, items: Vec<(T, f32)>) -> Vec<Scored<T>> {
        let mut scored: Vec<Scored<T>> = items
            .into_iter()
            .map(|(item, similarity)| {
                let score = self.score(similarity, item.importance());
                Scored {
                    item,
                    similarity,
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| by_score_desc(a.score, b.score));
        scored
    }

    /// Interleave already-scored chunks and memories into one ordered list.
    /// On equal scores chunks precede memories, each in their given order.
    pub fn merge(&self, chunks: Vec<Scored<Chunk>>, memories: Vec<Scored<Memory>>) -> Vec<Candidate> {
        let mut merged: Vec<Candidate> = chunks
            .into_iter()
            .map(Candidate::Chunk)
            .chain(memories.into_iter().map(Candidate::Memory))
            .collect();
        merged.sort_by(|a, b| by_score_desc(a.score(), b.score()));
        merged
    }
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryType;

    fn mem(content: &str, kind: MemoryType) -> Memory {
        Memory::new(content, kind, "test")
    }

    #[test]
    fn score_is_monotonic_in_both_inputs() {
        let r = Ranker::default();
        assert!(r.score(0.9, 0.5) > r.score(0.8, 0.5));
        assert!(r.score(0.8, 0.8) > r.score(0.8, 0.5));
    }

    #[test]
    fn negative_weights_are_clamped() {
        let r = Ranker::new(-1.0, 0.5);
        assert!(r.score(1.0, 0.5) >= r.score(0.0, 0.5));
    }

    #[test]
    fn importance_breaks_similarity_ties() {
        let r = Ranker::default();
        let note = mem("note", MemoryType::Note);
        let decision = mem("decision", MemoryType::Decision);
        let ranked = r.rank(vec![(note, 0.9), (decision, 0.9)]);
        assert_eq!(ranked[0].item.content, "decision");
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let r = Ranker::default();
        let items: Vec<(Memory, f32)> = (0..5)
            .map(|i| (mem(&format!("n{i}"), MemoryType::Note), 0.5))
            .collect();
        let ranked = r.rank(items);
        let order: Vec<&str> = ranked.iter().map(|s| s.item.content.as_str()).collect();
        assert_eq!(order, vec!["n0", "n1", "n2", "n3", "n4"]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let r = Ranker::default();
        let build = || {
            vec![
                (mem("a", MemoryType::Todo), 0.3),
                (mem("b", MemoryType::Note), 0.7),
                (mem("c", MemoryType::Decision), 0.3),
            ]
        };
        let first: Vec<String> = r.rank(build()).into_iter().map(|s| s.item.content).collect();
        let second: Vec<String> = r.rank(build()).into_iter().map(|s| s.item.content).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["b", "c", "a"]);
    }

    #[test]
    fn merge_orders_across_kinds() {
        let r = Ranker::default();
        let chunk = Chunk::new("f", "fn x() {}", 1, 1, "code");
        let chunks = r.rank(vec![(chunk, 0.2)]);
        let memories = r.rank(vec![(mem("strong", MemoryType::Note), 0.95)]);

        let merged = r.merge(chunks, memories);
        assert_eq!(merged.len(), 2);
        assert!(matches!(merged[0], Candidate::Memory(_)));
        assert!(merged[0].score() >= merged[1].score());
    }
}
