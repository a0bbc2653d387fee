//! SQL DDL for all memvault tables.
//!
//! Metadata tables (`project`, `memories`, `files`, `chunks`, `sessions`) and
//! the two embedding tables (`chunk_embeddings`, `memory_embeddings`) live in
//! the same database. The embedding tables carry no foreign keys: vectors are
//! an optional accelerant, not a record of truth. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Singleton project profile
CREATE TABLE IF NOT EXISTS project (
    id INTEGER PRIMARY KEY CHECK(id = 1),
    name TEXT NOT NULL,
    root_path TEXT NOT NULL,
    tech_stack TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);

-- Project facts
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('decision','convention','constraint','note','todo')),
    importance REAL NOT NULL CHECK(importance >= 0.0 AND importance <= 1.0),
    source TEXT NOT NULL DEFAULT 'user',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);

-- Indexed source files and their chunks
CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    language TEXT NOT NULL DEFAULT '',
    last_modified TEXT NOT NULL,
    content_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    chunk_type TEXT NOT NULL DEFAULT 'code'
);

CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

-- Append-only interaction log
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    context_used TEXT NOT NULL DEFAULT '[]',
    response_summary TEXT NOT NULL DEFAULT '',
    model_used TEXT NOT NULL DEFAULT '',
    tokens_used INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

-- Embedding index spaces (little-endian f32 blobs)
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_embeddings (
    id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
