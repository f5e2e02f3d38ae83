//! Core library for tourtags: hierarchical management of tour tags and
//! tag categories.
//!
//! The primary entry point is [`Taxonomy`], which owns the in-memory forest
//! and a persistence gateway for one editing session. All mutations go
//! through `Taxonomy` methods; tree widgets project their state with
//! [`TreeProjection`].
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    error::{PersistError, Result, TaxonomyError},
    gateway::PersistenceGateway,
    moves::{can_move, check_move, effective_parent, DropLocation},
    node::{CategoryData, Node, NodeId, NodeKey, NodeKind, NodeRecord, RecordKind},
    order::{sorted_children, SiblingComparator},
    sqlite_gateway::SqliteGateway,
    storage::Storage,
    store::NodeStore,
    taxonomy::{DeleteResult, Taxonomy},
    viewsync::{ExpandChange, SelectionOutcome, SyncState, TreeProjection},
};
