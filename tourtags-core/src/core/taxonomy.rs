//! High-level taxonomy operations: the façade used by UI handlers.
//!
//! Every public operation is a single user intent (add, rename, delete,
//! move) performed as atomic-looking whole: mutate the in-memory forest,
//! persist through the gateway, and on failure roll the memory state back to
//! exactly its pre-call shape. Writes that span several nodes (a new child
//! plus its parent, a move touching three nodes) run as explicit phases in
//! dependency order, each with a defined rollback step; only when a
//! compensating write fails too is a [`TaxonomyError::PartialFailure`]
//! surfaced and the caller must force a reload.

use crate::core::moves::{check_move, effective_parent};
use crate::{
    DropLocation, NodeId, NodeKey, NodeStore, PersistError, PersistenceGateway, Result,
    TaxonomyError,
};
use log::{debug, warn};

/// Cached `(tag_count, category_count)` of a category, captured for rollback.
type Counters = (Option<u32>, Option<u32>);

/// The outcome of a delete operation.
#[derive(Debug, Clone)]
pub struct DeleteResult {
    /// Number of nodes removed from the forest.
    pub deleted_count: usize,
    /// Persisted ids of the removed nodes (unsaved nodes are not listed).
    pub affected_ids: Vec<NodeId>,
}

/// Everything needed to undo a move: the pre-move linkage and counters.
struct MoveSnapshot {
    dragged: NodeKey,
    name: String,
    old_modified: i64,
    old_parent: Option<NodeKey>,
    old_counters: Option<Counters>,
    new_parent: Option<NodeKey>,
    new_counters: Option<Counters>,
}

/// The taxonomy façade: owns the forest and the persistence gateway for the
/// lifetime of one preference session.
///
/// All operations run on a single cooperative control thread; gateway calls
/// are synchronous and block the caller. After any committed mutation the
/// taxonomy is marked modified; [`Taxonomy::fire_modified`] notifies
/// registered observers at most once per user action.
pub struct Taxonomy {
    store: NodeStore,
    gateway: Box<dyn PersistenceGateway>,
    listeners: Vec<Box<dyn FnMut()>>,
    modified: bool,
}

impl Taxonomy {
    /// An empty taxonomy over `gateway`, without loading anything.
    pub fn new(gateway: Box<dyn PersistenceGateway>) -> Self {
        Self {
            store: NodeStore::new(),
            gateway,
            listeners: Vec::new(),
            modified: false,
        }
    }

    /// Builds the forest from everything the gateway has persisted.
    pub fn load(gateway: Box<dyn PersistenceGateway>) -> Result<Self> {
        let mut taxonomy = Self::new(gateway);
        taxonomy.reload()?;
        Ok(taxonomy)
    }

    /// Discards the in-memory forest and rebuilds it from the gateway. The
    /// last resort after a [`TaxonomyError::PartialFailure`], and the normal
    /// path after [`Taxonomy::reset_structure`].
    pub fn reload(&mut self) -> Result<()> {
        let records = self.gateway.load_all()?;
        self.store = NodeStore::from_records(&records);
        debug!("reloaded taxonomy with {} nodes", self.store.len());
        Ok(())
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Registers an observer for the coalesced "taxonomy changed" event.
    pub fn on_modified(&mut self, listener: Box<dyn FnMut()>) {
        self.listeners.push(listener);
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Emits the taxonomy-changed event if any mutation committed since the
    /// last call. Multiple mutations in one user action produce one event.
    pub fn fire_modified(&mut self) {
        if !self.modified {
            return;
        }
        self.modified = false;
        for listener in &mut self.listeners {
            listener();
        }
    }

    fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Creates a tag under `parent` (or at the forest root) and persists it.
    ///
    /// Two dependent writes: the tag first, then the parent category so the
    /// new child relation is durably recorded. On failure the staged tag is
    /// discarded and the parent's children and counters are restored to
    /// exactly their pre-call state.
    pub fn add_tag(
        &mut self,
        parent: Option<NodeKey>,
        name: &str,
        notes: &str,
    ) -> Result<NodeKey> {
        let parent_counters = self.capture_counters(parent)?;
        let key = self.store.create_tag(parent, name, notes)?;
        self.persist_new_node(key, parent, parent_counters)
    }

    /// Creates a category under `parent` (or at the forest root) and
    /// persists it. Same two-phase shape as [`Taxonomy::add_tag`].
    pub fn add_category(&mut self, parent: Option<NodeKey>, name: &str) -> Result<NodeKey> {
        let parent_counters = self.capture_counters(parent)?;
        let key = self.store.create_category(parent, name)?;
        self.persist_new_node(key, parent, parent_counters)
    }

    fn capture_counters(&self, parent: Option<NodeKey>) -> Result<Option<Counters>> {
        match parent {
            Some(pkey) => {
                let node = self.store.node(pkey)?;
                if !node.is_category() {
                    return Err(TaxonomyError::Validation(format!(
                        "'{}' is a tag and cannot contain children",
                        node.name
                    )));
                }
                Ok(Some(self.store.counters(pkey)?))
            }
            None => Ok(None),
        }
    }

    fn persist_new_node(
        &mut self,
        key: NodeKey,
        parent: Option<NodeKey>,
        parent_counters: Option<Counters>,
    ) -> Result<NodeKey> {
        // Phase 1: the node itself.
        let record = match self.store.record(key) {
            Ok(record) => record,
            Err(e) => {
                self.discard_staged(key, parent, parent_counters);
                return Err(e);
            }
        };
        let saved_id = match self.gateway.save(&record) {
            Ok(id) => id,
            Err(e) => {
                warn!("save of '{}' failed, discarding staged node", record.name);
                self.discard_staged(key, parent, parent_counters);
                return Err(e.into());
            }
        };
        self.store.assign_id(key, saved_id)?;

        // Phase 2: re-persist the parent so the relation is durable.
        if let Some(pkey) = parent {
            let parent_record = self.store.record(pkey)?;
            if let Err(e) = self.gateway.save(&parent_record) {
                warn!(
                    "parent update for '{}' failed, reverting the saved child",
                    parent_record.name
                );
                return match self.gateway.delete(saved_id) {
                    Ok(()) => {
                        self.discard_staged(key, parent, parent_counters);
                        Err(e.into())
                    }
                    Err(revert_err) => Err(TaxonomyError::PartialFailure {
                        node: record.name,
                        step: "reverting the saved child after the parent update failed",
                        source: revert_err,
                    }),
                };
            }
        }

        self.mark_modified();
        Ok(key)
    }

    fn discard_staged(
        &mut self,
        key: NodeKey,
        parent: Option<NodeKey>,
        parent_counters: Option<Counters>,
    ) {
        if let Err(e) = self.store.delete(key) {
            warn!("could not discard staged node: {e}");
        }
        if let (Some(pkey), Some(counters)) = (parent, parent_counters) {
            self.store.set_counters(pkey, counters);
        }
    }

    /// Renames a node and persists it. A successful rename only requires a
    /// re-sort of its siblings, not a structural refresh.
    pub fn rename(&mut self, key: NodeKey, new_name: &str) -> Result<()> {
        let node = self.store.node(key)?;
        let old_name = node.name.clone();
        let old_modified = node.modified_at;

        self.store.rename(key, new_name)?;

        let record = self.store.record(key)?;
        if record.id.is_none() {
            // Never persisted: nothing durable to update.
            self.mark_modified();
            return Ok(());
        }
        if let Err(e) = self.gateway.save(&record) {
            warn!("rename of '{old_name}' failed, restoring the previous name");
            self.store.revert_name(key, old_name, old_modified);
            return Err(e.into());
        }

        self.mark_modified();
        Ok(())
    }

    /// Deletes tags and empty categories.
    ///
    /// Tags are detached from every referencing tour before the node itself
    /// is removed; a failure there aborts with no mutation. Categories must
    /// already be empty; there is no implicit cascade, relocating or
    /// deleting children first is a deliberate choice at the call site.
    ///
    /// A committed delete cannot be undone, so a gateway failure after the
    /// first node of the batch has been deleted surfaces as a
    /// [`TaxonomyError::PartialFailure`] and the caller must force a reload.
    pub fn delete(&mut self, keys: &[NodeKey]) -> Result<DeleteResult> {
        // Validate the whole batch before the first gateway call.
        for &key in keys {
            let node = self.store.node(key)?;
            if let Some(data) = node.category() {
                if !data.children.is_empty() {
                    return Err(TaxonomyError::Validation(format!(
                        "Category '{}' still contains children; move or delete them first",
                        node.name
                    )));
                }
            }
        }

        let mut affected = Vec::new();
        let mut committed = false;
        for &key in keys {
            let node = self.store.node(key)?;
            let node_id = node.id;
            let is_tag = node.is_tag();
            let parent = node.parent;
            let name = node.name.clone();

            if let Some(id) = node_id {
                if is_tag {
                    if let Err(e) = self.gateway.clear_tour_references(id) {
                        return Err(Self::batch_failure(
                            committed,
                            name,
                            "detaching tours midway through a delete batch",
                            e,
                        ));
                    }
                }
                if let Err(e) = self.gateway.delete(id) {
                    return Err(Self::batch_failure(
                        committed,
                        name,
                        "deleting a node midway through a delete batch",
                        e,
                    ));
                }
                committed = true;
            }
            let removed = self.store.delete(key)?;

            // The backing store no longer knows the child; record the
            // parent's shrunk relation set.
            if let Some(pkey) = parent {
                let parent_record = self.store.record(pkey)?;
                if let Err(e) = self.gateway.save(&parent_record) {
                    return Err(TaxonomyError::PartialFailure {
                        node: removed.name,
                        step: "updating the parent after a delete",
                        source: e,
                    });
                }
            }

            if let Some(id) = node_id {
                affected.push(id);
            }
            self.mark_modified();
        }

        Ok(DeleteResult {
            deleted_count: keys.len(),
            affected_ids: affected,
        })
    }

    /// A plain persist error while nothing of the batch has been committed
    /// yet; once a delete went through it cannot be compensated and the
    /// failure is partial.
    fn batch_failure(
        committed: bool,
        node: String,
        step: &'static str,
        source: PersistError,
    ) -> TaxonomyError {
        if committed {
            TaxonomyError::PartialFailure { node, step, source }
        } else {
            source.into()
        }
    }

    /// Boolean drag-over feedback; delegates to the move validator.
    pub fn can_move(&self, dragged: NodeKey, target: NodeKey, location: DropLocation) -> bool {
        crate::core::moves::can_move(&self.store, dragged, target, location)
    }

    /// Performs a validated drag-and-drop move.
    ///
    /// Validate-then-apply: an illegal move is refused before anything
    /// changes. A legal move reparents in memory and then persists the
    /// dragged node and both affected parents in dependency order. Any
    /// persistence failure restores the pre-move linkage and re-saves the
    /// already-written nodes; if that compensation fails the error is a
    /// [`TaxonomyError::PartialFailure`].
    pub fn move_node(
        &mut self,
        dragged: NodeKey,
        target: NodeKey,
        location: DropLocation,
    ) -> Result<()> {
        check_move(&self.store, dragged, target, location)?;
        let new_parent = effective_parent(&self.store, target, location)?;
        let old_parent = self.store.parent_of(dragged)?;
        if new_parent == old_parent {
            return Ok(());
        }

        let dragged_node = self.store.node(dragged)?;
        let snapshot = MoveSnapshot {
            dragged,
            name: dragged_node.name.clone(),
            old_modified: dragged_node.modified_at,
            old_parent,
            old_counters: self.capture_counters(old_parent)?,
            new_parent,
            new_counters: self.capture_counters(new_parent)?,
        };

        self.store.reparent(dragged, new_parent)?;

        // Dependency order: the dragged node first, then both parents whose
        // relation sets and counters changed.
        let chain: Vec<NodeKey> = std::iter::once(Some(dragged))
            .chain([old_parent, new_parent])
            .flatten()
            .collect();

        for (completed, &key) in chain.iter().enumerate() {
            let record = self.store.record(key)?;
            if let Err(e) = self.gateway.save(&record) {
                warn!(
                    "move of '{}' failed while saving '{}', rolling back",
                    snapshot.name, record.name
                );
                return self.rollback_move(snapshot, &chain[..completed], e);
            }
        }

        self.mark_modified();
        Ok(())
    }

    fn rollback_move(
        &mut self,
        snapshot: MoveSnapshot,
        committed: &[NodeKey],
        cause: PersistError,
    ) -> Result<()> {
        // Restore the pre-move linkage and counters in memory.
        if let Err(e) = self.store.reparent(snapshot.dragged, snapshot.old_parent) {
            warn!("in-memory rollback of move failed: {e}");
        }
        if let (Some(pkey), Some(counters)) = (snapshot.old_parent, snapshot.old_counters) {
            self.store.set_counters(pkey, counters);
        }
        if let (Some(pkey), Some(counters)) = (snapshot.new_parent, snapshot.new_counters) {
            self.store.set_counters(pkey, counters);
        }
        let name = match self.store.node(snapshot.dragged) {
            Ok(node) => node.name.clone(),
            Err(_) => snapshot.name.clone(),
        };
        self.store
            .revert_name(snapshot.dragged, name, snapshot.old_modified);

        // Re-save whatever already reached the gateway with its restored
        // pre-move state.
        for &key in committed {
            let record = self.store.record(key)?;
            if let Err(revert_err) = self.gateway.save(&record) {
                return Err(TaxonomyError::PartialFailure {
                    node: snapshot.name,
                    step: "re-saving the pre-move state after a failed move",
                    source: revert_err,
                });
            }
        }

        Err(cause.into())
    }

    /// Flattens the whole taxonomy: every tag and category becomes a root
    /// node and the forest is rebuilt from the gateway. Long-running; the
    /// caller is expected to wrap this in a busy indicator.
    pub fn reset_structure(&mut self) -> Result<()> {
        self.gateway.reset_structure()?;
        self.reload()?;
        self.mark_modified();
        Ok(())
    }
}
