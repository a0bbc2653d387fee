//! Keyed persistence for projects, memories, files, chunks and sessions.
//!
//! [`MetadataStore`] is the capability the orchestrator and context builder
//! consume; [`SqliteStore`] implements it over the shared project connection.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{self, SharedConnection};
use crate::error::{Error, Result};
use crate::memory::types::{Chunk, File, Memory, MemoryType, Project, Session, TechStack};

/// Record-of-truth storage for every entity the engine reads.
pub trait MetadataStore: Send + Sync {
    fn get_project(&self) -> Result<Option<Project>>;
    fn upsert_project(&self, project: &Project) -> Result<()>;

    fn insert_memory(&self, memory: &Memory) -> Result<()>;
    fn get_memory(&self, id: &str) -> Result<Option<Memory>>;
    /// Memories in insertion order, optionally restricted to one type.
    fn list_memories(&self, filter: Option<MemoryType>) -> Result<Vec<Memory>>;
    /// Returns `false` when no memory had this id.
    fn delete_memory(&self, id: &str) -> Result<bool>;

    /// Insert or update by path. Returns the stored file id.
    fn upsert_file(&self, file: &File) -> Result<String>;
    fn get_file(&self, id: &str) -> Result<Option<File>>;
    fn get_file_by_path(&self, path: &str) -> Result<Option<File>>;
    /// Delete a file and its chunks. Returns the ids of the removed chunks.
    fn delete_file(&self, id: &str) -> Result<Vec<String>>;

    fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;
    fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;
    fn chunks_for_file(&self, file_id: &str) -> Result<Vec<Chunk>>;

    fn insert_session(&self, session: &Session) -> Result<()>;
    /// The `n` most recent sessions, newest first.
    fn last_sessions(&self, n: usize) -> Result<Vec<Session>>;

    /// Memory counts for every type, in [`MemoryType::ALL`] order. Absent types count zero.
    fn count_memories_by_type(&self) -> Result<Vec<(MemoryType, u64)>>;
    fn count_files(&self) -> Result<u64>;
    fn count_chunks(&self) -> Result<u64>;
    fn count_sessions(&self) -> Result<u64>;
}

/// [`MetadataStore`] backed by the project SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: SharedConnection,
}

impl SqliteStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = db::lock(&self.db)?;
        f(&conn)
    }
}

const MEMORY_COLUMNS: &str = "id, content, type, importance, source, created_at";
const CHUNK_COLUMNS: &str = "id, file_id, content, start_line, end_line, chunk_type";
const FILE_COLUMNS: &str = "id, path, language, last_modified, content_hash";
const SESSION_COLUMNS: &str =
    "id, question, context_used, response_summary, model_used, tokens_used, created_at";

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let type_str: String = row.get(2)?;
    let memory_type = type_str.parse::<MemoryType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        memory_type,
        importance: row.get(3)?,
        source: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        content: row.get(2)?,
        start_line: row.get(3)?,
        end_line: row.get(4)?,
        chunk_type: row.get(5)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get(0)?,
        path: row.get(1)?,
        language: row.get(2)?,
        last_modified: row.get(3)?,
        content_hash: row.get(4)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        question: row.get(1)?,
        context_used: row.get(2)?,
        response_summary: row.get(3)?,
        model_used: row.get(4)?,
        tokens_used: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn count(conn: &Connection, table: &str) -> Result<u64> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(n as u64)
}

impl MetadataStore for SqliteStore {
    fn get_project(&self) -> Result<Option<Project>> {
        self.with_conn(|conn| {
            let row: Option<(String, String, String)> = conn
                .query_row(
                    "SELECT name, root_path, tech_stack FROM project WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            row.map(|(name, root_path, stack_json)| -> Result<Project> {
                let tech_stack: TechStack = serde_json::from_str(&stack_json)?;
                Ok(Project {
                    name,
                    root_path,
                    tech_stack,
                })
            })
            .transpose()
        })
    }

    fn upsert_project(&self, project: &Project) -> Result<()> {
        let stack_json = serde_json::to_string(&project.tech_stack)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO project (id, name, root_path, tech_stack, updated_at) \
                 VALUES (1, ?1, ?2, ?3, ?4) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, root_path = excluded.root_path, \
                 tech_stack = excluded.tech_stack, updated_at = excluded.updated_at",
                params![project.name, project.root_path, stack_json, now],
            )?;
            Ok(())
        })
    }

    fn insert_memory(&self, memory: &Memory) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO memories ({MEMORY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    memory.id,
                    memory.content,
                    memory.memory_type.as_str(),
                    memory.importance,
                    memory.source,
                    memory.created_at,
                ],
            )?;
            Ok(())
        })
    }

    fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                    params![id],
                    memory_from_row,
                )
                .optional()?)
        })
    }

    fn list_memories(&self, filter: Option<MemoryType>) -> Result<Vec<Memory>> {
        self.with_conn(|conn| {
            let memories = match filter {
                Some(kind) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories WHERE type = ?1 ORDER BY rowid"
                    ))?;
                    let rows = stmt.query_map(params![kind.as_str()], memory_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn
                        .prepare(&format!("SELECT {MEMORY_COLUMNS} FROM memories ORDER BY rowid"))?;
                    let rows = stmt.query_map([], memory_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(memories)
        })
    }

    fn delete_memory(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
            Ok(rows > 0)
        })
    }

    fn upsert_file(&self, file: &File) -> Result<String> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO files ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(path) DO UPDATE SET language = excluded.language, \
                     last_modified = excluded.last_modified, content_hash = excluded.content_hash"
                ),
                params![
                    file.id,
                    file.path,
                    file.language,
                    file.last_modified,
                    file.content_hash,
                ],
            )?;
            // On conflict the original id is kept, so read it back.
            let id: String = conn.query_row(
                "SELECT id FROM files WHERE path = ?1",
                params![file.path],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    fn get_file(&self, id: &str) -> Result<Option<File>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                    params![id],
                    file_from_row,
                )
                .optional()?)
        })
    }

    fn get_file_by_path(&self, path: &str) -> Result<Option<File>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
                    params![path],
                    file_from_row,
                )
                .optional()?)
        })
    }

    fn delete_file(&self, id: &str) -> Result<Vec<String>> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        let chunk_ids = {
            let mut stmt = tx.prepare("SELECT id FROM chunks WHERE file_id = ?1 ORDER BY rowid")?;
            let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(Error::not_found("file", id));
        }
        tx.commit()?;
        Ok(chunk_ids)
    }

    fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO chunks ({CHUNK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    chunk.id,
                    chunk.file_id,
                    chunk.content,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.chunk_type,
                ],
            )?;
            Ok(())
        })
    }

    fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
                    params![id],
                    chunk_from_row,
                )
                .optional()?)
        })
    }

    fn chunks_for_file(&self, file_id: &str) -> Result<Vec<Chunk>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks WHERE file_id = ?1 ORDER BY start_line, rowid"
            ))?;
            let rows = stmt.query_map(params![file_id], chunk_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn insert_session(&self, session: &Session) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    session.id,
                    session.question,
                    session.context_used,
                    session.response_summary,
                    session.model_used,
                    session.tokens_used,
                    session.created_at,
                ],
            )?;
            Ok(())
        })
    }

    fn last_sessions(&self, n: usize) -> Result<Vec<Session>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            // rowid breaks ties between sessions logged within the same instant.
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC, rowid DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![n as i64], session_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn count_memories_by_type(&self) -> Result<Vec<(MemoryType, u64)>> {
        self.with_conn(|conn| {
            let mut counts: Vec<(MemoryType, u64)> = MemoryType::ALL.iter().map(|&k| (k, 0)).collect();
            let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM memories GROUP BY type")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (type_str, n) = row?;
                let kind: MemoryType = type_str.parse()?;
                if let Some(slot) = counts.iter_mut().find(|(k, _)| *k == kind) {
                    slot.1 = n as u64;
                }
            }
            Ok(counts)
        })
    }

    fn count_files(&self) -> Result<u64> {
        self.with_conn(|conn| count(conn, "files"))
    }

    fn count_chunks(&self) -> Result<u64> {
        self.with_conn(|conn| count(conn, "chunks"))
    }

    fn count_sessions(&self) -> Result<u64> {
        self.with_conn(|conn| count(conn, "sessions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteStore {
        let conn = crate::db::open_memory_database().unwrap();
        SqliteStore::new(crate::db::share(conn))
    }

    #[test]
    fn project_is_absent_until_upserted() {
        let store = test_store();
        assert!(store.get_project().unwrap().is_none());

        let project = Project {
            name: "demo".into(),
            root_path: "/tmp/demo".into(),
            tech_stack: TechStack {
                language: "Rust".into(),
                framework: "axum".into(),
                database: "SQLite".into(),
            },
        };
        store.upsert_project(&project).unwrap();
        assert_eq!(store.get_project().unwrap(), Some(project.clone()));

        let renamed = Project {
            name: "renamed".into(),
            ..project
        };
        store.upsert_project(&renamed).unwrap();
        assert_eq!(store.get_project().unwrap().unwrap().name, "renamed");
    }

    #[test]
    fn memory_crud() {
        let store = test_store();
        let mem = Memory::new("use PostgreSQL", MemoryType::Decision, "user");
        store.insert_memory(&mem).unwrap();

        assert_eq!(store.get_memory(&mem.id).unwrap(), Some(mem.clone()));
        assert!(store.delete_memory(&mem.id).unwrap());
        assert!(!store.delete_memory(&mem.id).unwrap());
        assert!(store.get_memory(&mem.id).unwrap().is_none());
    }

    #[test]
    fn list_memories_filters_by_type_in_insertion_order() {
        let store = test_store();
        let a = Memory::new("note a", MemoryType::Note, "user");
        let b = Memory::new("decision", MemoryType::Decision, "user");
        let c = Memory::new("note c", MemoryType::Note, "user");
        for m in [&a, &b, &c] {
            store.insert_memory(m).unwrap();
        }

        let all = store.list_memories(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, a.id);

        let notes: Vec<String> = store
            .list_memories(Some(MemoryType::Note))
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(notes, vec![a.id, c.id]);
    }

    #[test]
    fn count_memories_by_type_covers_every_kind() {
        let store = test_store();
        assert!(store.count_memories_by_type().unwrap().iter().all(|(_, n)| *n == 0));

        for (content, kind) in [("a", MemoryType::Note), ("b", MemoryType::Note), ("c", MemoryType::Todo)] {
            store.insert_memory(&Memory::new(content, kind, "user")).unwrap();
        }
        let counts = store.count_memories_by_type().unwrap();
        assert_eq!(counts.len(), MemoryType::ALL.len());
        assert!(counts.contains(&(MemoryType::Note, 2)));
        assert!(counts.contains(&(MemoryType::Todo, 1)));
        assert!(counts.contains(&(MemoryType::Decision, 0)));
    }

    #[test]
    fn upsert_file_keeps_id_per_path() {
        let store = test_store();
        let first = File::new("src/main.rs", "rust", "h1");
        let id = store.upsert_file(&first).unwrap();
        assert_eq!(id, first.id);

        let again = File::new("src/main.rs", "rust", "h2");
        assert_eq!(store.upsert_file(&again).unwrap(), id);
        assert_eq!(store.get_file(&id).unwrap().unwrap().content_hash, "h2");
    }

    #[test]
    fn delete_file_returns_chunk_ids() {
        let store = test_store();
        let file_id = store.upsert_file(&File::new("lib.rs", "rust", "h")).unwrap();
        let chunk = Chunk::new(&file_id, "fn main() {}", 1, 1, "code");
        store.insert_chunk(&chunk).unwrap();

        let removed = store.delete_file(&file_id).unwrap();
        assert_eq!(removed, vec![chunk.id.clone()]);
        assert!(store.get_chunk(&chunk.id).unwrap().is_none());
        assert!(store.delete_file(&file_id).unwrap_err().is_not_found());
    }

    #[test]
    fn last_sessions_newest_first() {
        let store = test_store();
        let mut older = Session::new("q1", "a1", "claude", 10);
        older.created_at = "2024-01-01T00:00:00+00:00".into();
        let mut newer = Session::new("q2", "a2", "gemini", 20);
        newer.created_at = "2024-02-01T00:00:00+00:00".into();
        store.insert_session(&older).unwrap();
        store.insert_session(&newer).unwrap();

        let sessions = store.last_sessions(5).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].question, "q2");
        assert_eq!(store.last_sessions(1).unwrap().len(), 1);
        assert!(store.last_sessions(0).unwrap().is_empty());
    }
}
