//! Core record definitions.
//!
//! Defines [`MemoryType`] (the five project-fact categories) together with its
//! fixed importance table, and the persisted records the engine reads:
//! [`Memory`], [`Chunk`], [`File`], [`Session`] and [`Project`].

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The five kinds of project fact.
///
/// Discriminants index into [`KINDS`]; keep both in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// An architectural or tooling choice ("we use PostgreSQL").
    Decision,
    /// A style or naming rule.
    Convention,
    /// A hard rule that must not be broken.
    Constraint,
    /// Anything else worth keeping.
    Note,
    /// Outstanding work.
    Todo,
}

/// `(kind, name, importance)` for every memory type.
const KINDS: [(MemoryType, &str, f64); 5] = [
    (MemoryType::Decision, "decision", 0.8),
    (MemoryType::Convention, "convention", 0.7),
    (MemoryType::Constraint, "constraint", 0.8),
    (MemoryType::Note, "note", 0.5),
    (MemoryType::Todo, "todo", 0.6),
];

impl MemoryType {
    /// Every memory type, in declaration order.
    pub const ALL: [MemoryType; 5] = [
        Self::Decision,
        Self::Convention,
        Self::Constraint,
        Self::Note,
        Self::Todo,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(self) -> &'static str {
        KINDS[self as usize].1
    }

    /// Static importance derived from the type.
    pub fn importance(self) -> f64 {
        KINDS[self as usize].2
    }

    /// Types already surfaced unconditionally by the context builder.
    pub fn is_always_included(self) -> bool {
        matches!(self, Self::Convention | Self::Constraint | Self::Decision)
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KINDS
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(kind, _, _)| *kind)
            .ok_or_else(|| Error::InvalidType(s.to_string()))
    }
}

/// A persisted project fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Always `memory_type.importance()` for memories created by the orchestrator.
    pub importance: f64,
    /// Free-text origin, e.g. `"user"`.
    pub source: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl Memory {
    /// Build a new memory with a fresh id and type-derived importance.
    pub fn new(content: impl Into<String>, memory_type: MemoryType, source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            content: content.into(),
            memory_type,
            importance: memory_type.importance(),
            source: source.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A retrievable fragment of an indexed source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Owning [`File`] id.
    pub file_id: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Indexer-defined label such as `"code"` or `"doc"`.
    pub chunk_type: String,
}

impl Chunk {
    pub fn new(
        file_id: impl Into<String>,
        content: impl Into<String>,
        start_line: u32,
        end_line: u32,
        chunk_type: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            file_id: file_id.into(),
            content: content.into(),
            start_line,
            end_line,
            chunk_type: chunk_type.into(),
        }
    }
}

/// An indexed source file. Owns zero or more chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    /// Path relative to the project root.
    pub path: String,
    pub language: String,
    /// RFC 3339 modification timestamp.
    pub last_modified: String,
    pub content_hash: String,
}

impl File {
    pub fn new(
        path: impl Into<String>,
        language: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            path: path.into(),
            language: language.into(),
            last_modified: chrono::Utc::now().to_rfc3339(),
            content_hash: content_hash.into(),
        }
    }
}

/// One past assistant interaction. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub question: String,
    /// JSON list of context sources that fed the answer.
    pub context_used: String,
    pub response_summary: String,
    pub model_used: String,
    pub tokens_used: u32,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl Session {
    pub fn new(
        question: impl Into<String>,
        response_summary: impl Into<String>,
        model_used: impl Into<String>,
        tokens_used: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            question: question.into(),
            context_used: "[]".into(),
            response_summary: response_summary.into(),
            model_used: model_used.into(),
            tokens_used,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Detected technology profile of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechStack {
    pub language: String,
    pub framework: String,
    pub database: String,
}

/// The project rooted at the working directory. At most one per database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub root_path: String,
    pub tech_stack: TechStack,
}
