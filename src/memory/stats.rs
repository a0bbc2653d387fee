//! Project status snapshot: what the vault holds, counted in SQL.

use serde::Serialize;
use std::collections::HashMap;

use crate::error::Result;
use crate::memory::store::MetadataStore;
use crate::memory::types::Project;

/// Snapshot of what the vault holds for one project.
#[derive(Debug, Serialize)]
pub struct ProjectStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    pub files_indexed: u64,
    pub chunks: u64,
    pub total_memories: u64,
    /// Every memory type is present, zero when none are stored.
    pub memories_by_type: HashMap<String, u64>,
    pub sessions: u64,
}

/// Compute project status from the metadata store.
pub fn project_status(store: &dyn MetadataStore) -> Result<ProjectStatus> {
    let mut memories_by_type = HashMap::new();
    let mut total_memories = 0;
    for (kind, count) in store.count_memories_by_type()? {
        total_memories += count;
        memories_by_type.insert(kind.to_string(), count);
    }

    Ok(ProjectStatus {
        project: store.get_project()?,
        files_indexed: store.count_files()?,
        chunks: store.count_chunks()?,
        total_memories,
        memories_by_type,
        sessions: store.count_sessions()?,
    })
}
