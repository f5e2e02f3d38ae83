//! Persistence gateway abstraction.
//!
//! The taxonomy core treats persistence as an opaque synchronous
//! collaborator: a node goes in, the canonical saved form (with its assigned
//! id) comes back. The bundled SQLite implementation lives in
//! [`sqlite_gateway`](super::sqlite_gateway); tests use an in-memory gateway
//! with failure injection.

use crate::{NodeId, NodeRecord, PersistError};

/// Synchronous persistence collaborator for the taxonomy core.
///
/// Calls are blocking from the caller's point of view; there is no
/// cancellation once a write has started. Long-running operations such as
/// [`PersistenceGateway::reset_structure`] are expected to run under a
/// caller-supplied busy indicator.
pub trait PersistenceGateway {
    /// Persists a new or modified node and returns its canonical id. For a
    /// record with `id == None` this assigns the identity; for an existing
    /// record it updates in place and echoes the id back.
    fn save(&mut self, record: &NodeRecord) -> Result<NodeId, PersistError>;

    /// Removes a node from the backing store, including any relations that
    /// reference it.
    fn delete(&mut self, id: NodeId) -> Result<(), PersistError>;

    /// Detaches a tag from every tour that references it. Called before the
    /// tag itself is deleted; a failure here aborts the delete.
    fn clear_tour_references(&mut self, tag_id: NodeId) -> Result<(), PersistError>;

    /// Flattens the taxonomy: clears all parent/child relations so every
    /// node becomes a root. Tour/tag references are left untouched.
    fn reset_structure(&mut self) -> Result<(), PersistError>;

    /// Loads every persisted node. Used to (re)build the in-memory forest.
    fn load_all(&mut self) -> Result<Vec<NodeRecord>, PersistError>;
}
