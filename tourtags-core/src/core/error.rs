//! Error types for the tour tag taxonomy core.

use thiserror::Error;

/// Failure reported by a [`PersistenceGateway`](super::gateway::PersistenceGateway).
#[derive(Debug, Error)]
pub enum PersistError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The backing store refused the operation (missing row, injected test
    /// failure, remote rejection).
    #[error("Persistence rejected: {0}")]
    Rejected(String),
}

/// All errors that can occur within the taxonomy core.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    /// A name or structural precondition failed before any persistence call.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A drag-and-drop move was refused (self-drop, cycle, drop on a tag).
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// A node key or id was requested that does not exist in the store.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The persistence gateway failed; the in-memory mutation was rolled back.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// A multi-write operation was partially committed and the compensating
    /// write failed too. In-memory state can no longer be trusted; the caller
    /// should force a reload from the gateway.
    #[error("Partial failure while {step} for '{node}': {source}")]
    PartialFailure {
        /// Name of the node the failing step was operating on.
        node: String,
        /// Which step of the multi-write operation failed.
        step: &'static str,
        #[source]
        source: PersistError,
    },

    /// A direct SQLite operation failed (storage layer).
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The opened file is not a valid tag database.
    #[error("Invalid tag database: {0}")]
    InvalidDatabase(String),

    /// Stored settings data could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias that pins the error type to [`TaxonomyError`].
pub type Result<T> = std::result::Result<T, TaxonomyError>;

impl TaxonomyError {
    /// Returns a short, human-readable message suitable for display to the
    /// end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::InvalidMove(msg) => msg.clone(),
            Self::NodeNotFound(_) => "Tag or category no longer exists".to_string(),
            Self::Persist(e) => format!("Failed to save: {e}"),
            Self::PartialFailure { node, .. } => format!(
                "Saving '{node}' only partially succeeded; the tag structure will be reloaded"
            ),
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::InvalidDatabase(_) => "Could not open tag database".to_string(),
            Self::Json(e) => format!("Data format error: {e}"),
            Self::Io(e) => format!("File error: {e}"),
        }
    }

    /// `true` when in-memory state may no longer match the backing store and
    /// the caller must force a reload through the gateway.
    #[must_use]
    pub fn requires_reload(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_requires_reload() {
        let e = TaxonomyError::PartialFailure {
            node: "Running".to_string(),
            step: "reverting tag save",
            source: PersistError::Rejected("disk full".to_string()),
        };
        assert!(e.requires_reload());
        assert!(e.to_string().contains("Running"));
        assert!(e.to_string().contains("reverting tag save"));
    }

    #[test]
    fn test_validation_never_requires_reload() {
        let e = TaxonomyError::Validation("name must not be empty".to_string());
        assert!(!e.requires_reload());
        assert_eq!(e.user_message(), "name must not be empty");
    }

    #[test]
    fn test_persist_error_folds_into_taxonomy_error() {
        let e: TaxonomyError = PersistError::Rejected("nope".to_string()).into();
        assert!(matches!(e, TaxonomyError::Persist(_)));
    }
}
