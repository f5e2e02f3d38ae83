//! Internal domain modules for the tourtags core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod error;
pub mod gateway;
pub mod moves;
pub mod node;
pub mod order;
pub mod sqlite_gateway;
pub mod storage;
pub mod store;
pub mod taxonomy;
pub mod viewsync;

#[doc(inline)]
pub use error::{PersistError, Result, TaxonomyError};
#[doc(inline)]
pub use gateway::PersistenceGateway;
#[doc(inline)]
pub use moves::{can_move, check_move, effective_parent, DropLocation};
#[doc(inline)]
pub use node::{CategoryData, Node, NodeId, NodeKey, NodeKind, NodeRecord, RecordKind};
#[doc(inline)]
pub use order::{sorted_children, SiblingComparator};
#[doc(inline)]
pub use sqlite_gateway::SqliteGateway;
#[doc(inline)]
pub use storage::Storage;
#[doc(inline)]
pub use store::NodeStore;
#[doc(inline)]
pub use taxonomy::{DeleteResult, Taxonomy};
#[doc(inline)]
pub use viewsync::{ExpandChange, SelectionOutcome, SyncState, TreeProjection};
