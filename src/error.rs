//! Error taxonomy for the retrieval and context engine.
//!
//! Only structural failures live here. Embedding failures are never errors:
//! they surface as [`Degradation`](crate::memory::orchestrator::Degradation) values instead.

use thiserror::Error;

/// Errors returned by the metadata store, vector indices, orchestrator and builder.
#[derive(Debug, Error)]
pub enum Error {
    /// A memory type string that is not one of the five recognized kinds.
    #[error("invalid memory type: {0:?} (expected decision, convention, constraint, note or todo)")]
    InvalidType(String),

    /// Lookup or deletion of an id that does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Failure inside the SQLite layer, propagated untouched.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A structured column (e.g. the tech stack JSON) could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A writer panicked while holding the project connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = Error::not_found("memory", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "memory not found: abc");
    }

    #[test]
    fn storage_errors_convert_from_rusqlite() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.is_not_found());
    }
}
