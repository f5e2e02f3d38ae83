//! In-memory arena holding the canonical taxonomy forest.
//!
//! The [`NodeStore`] owns every [`Node`] and its parent/child linkage. All
//! structural mutation (create, rename, delete, reparent) and counter
//! bookkeeping happens here; persistence is the orchestrator's business and
//! no method of this type performs I/O.
//!
//! Nodes are addressed by session-local [`NodeKey`]s; the persistent
//! [`NodeId`] assigned by the gateway is carried alongside and indexed for
//! lookups, which keeps parent back references and child lists free of
//! reference cycles.

use crate::{CategoryData, Node, NodeId, NodeKey, NodeKind, NodeRecord, Result, TaxonomyError};
use log::warn;
use std::collections::HashMap;

const NO_CHILDREN: &[NodeKey] = &[];

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The canonical set of tag and category nodes for one preference session.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: HashMap<NodeKey, Node>,
    /// Index of persisted ids, rebuilt on load and kept current by
    /// [`NodeStore::assign_id`] and [`NodeStore::delete`].
    ids: HashMap<NodeId, NodeKey>,
    /// Keys of all nodes without a parent, in insertion order. Display order
    /// is recomputed by the sibling comparator, never stored.
    roots: Vec<NodeKey>,
    next_key: u64,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a forest from the flat records returned by the gateway.
    ///
    /// Parent links are resolved by persisted id. A record whose parent id
    /// cannot be resolved, or resolves to a tag, is relinked to the root with
    /// a warning rather than dropped. Category counters start uncounted.
    pub fn from_records(records: &[NodeRecord]) -> Self {
        let mut store = Self::new();

        for record in records {
            let Some(id) = record.id else {
                warn!("skipping unsaved record '{}' from gateway", record.name);
                continue;
            };
            let key = store.alloc_key();
            let kind = match record.kind {
                crate::RecordKind::Tag => NodeKind::Tag,
                crate::RecordKind::Category => NodeKind::Category(CategoryData::default()),
            };
            store.nodes.insert(
                key,
                Node {
                    key,
                    id: Some(id),
                    name: record.name.clone(),
                    notes: record.notes.clone(),
                    parent: None,
                    created_at: record.created_at,
                    modified_at: record.modified_at,
                    kind,
                },
            );
            store.ids.insert(id, key);
        }

        // Second pass: resolve parent links now that every id is indexed.
        for record in records {
            let Some(id) = record.id else { continue };
            let key = store.ids[&id];
            let parent_key = match record.parent_id {
                None => None,
                Some(pid) => match store.ids.get(&pid).copied() {
                    Some(pkey) if store.nodes[&pkey].is_category() => Some(pkey),
                    Some(_) => {
                        warn!("node {id} has tag {pid} as parent, relinking to root");
                        None
                    }
                    None => {
                        warn!("node {id} has unknown parent {pid}, relinking to root");
                        None
                    }
                },
            };
            match parent_key {
                Some(pkey) => {
                    if let Some(node) = store.nodes.get_mut(&key) {
                        node.parent = Some(pkey);
                    }
                    if let Some(data) = store.nodes.get_mut(&pkey).and_then(Node::category_mut) {
                        data.children.push(key);
                    }
                }
                None => store.roots.push(key),
            }
        }

        store
    }

    fn alloc_key(&mut self) -> NodeKey {
        self.next_key += 1;
        NodeKey(self.next_key)
    }

    /// Builds an unsaved tag and links it under `parent`, or under the forest
    /// root when `parent` is `None`. Returns its key for staging.
    pub fn create_tag(
        &mut self,
        parent: Option<NodeKey>,
        name: &str,
        notes: &str,
    ) -> Result<NodeKey> {
        self.insert_node(parent, name, notes, NodeKind::Tag)
    }

    /// Builds an unsaved category with zero counted children and links it
    /// under `parent`, or under the forest root when `parent` is `None`.
    pub fn create_category(&mut self, parent: Option<NodeKey>, name: &str) -> Result<NodeKey> {
        self.insert_node(
            parent,
            name,
            "",
            NodeKind::Category(CategoryData {
                children: Vec::new(),
                tag_count: Some(0),
                category_count: Some(0),
            }),
        )
    }

    fn insert_node(
        &mut self,
        parent: Option<NodeKey>,
        name: &str,
        notes: &str,
        kind: NodeKind,
    ) -> Result<NodeKey> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaxonomyError::Validation(
                "Name must not be empty".to_string(),
            ));
        }
        if let Some(pkey) = parent {
            let parent_node = self.node(pkey)?;
            if !parent_node.is_category() {
                return Err(TaxonomyError::Validation(format!(
                    "'{}' is a tag and cannot contain children",
                    parent_node.name
                )));
            }
        }

        let key = self.alloc_key();
        let timestamp = now();
        self.nodes.insert(
            key,
            Node {
                key,
                id: None,
                name: name.to_string(),
                notes: notes.to_string(),
                parent,
                created_at: timestamp,
                modified_at: timestamp,
                kind,
            },
        );

        match parent {
            Some(pkey) => {
                if let Some(data) = self.nodes.get_mut(&pkey).and_then(Node::category_mut) {
                    data.children.push(key);
                }
                self.recount(pkey);
            }
            None => self.roots.push(key),
        }

        Ok(key)
    }

    /// Renames a node in place. The trimmed name must be non-empty.
    pub fn rename(&mut self, key: NodeKey, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(TaxonomyError::Validation(
                "Name must not be empty".to_string(),
            ));
        }
        let node = self.node_mut(key)?;
        node.name = new_name.to_string();
        node.modified_at = now();
        Ok(())
    }

    /// Restores name and modification time captured before a failed persist.
    pub(crate) fn revert_name(&mut self, key: NodeKey, name: String, modified_at: i64) {
        if let Some(node) = self.nodes.get_mut(&key) {
            node.name = name;
            node.modified_at = modified_at;
        }
    }

    /// Removes a node from the forest and returns it.
    ///
    /// Categories must be empty: the store never cascade-deletes children
    /// implicitly, relocating or removing them first is the caller's
    /// responsibility.
    pub fn delete(&mut self, key: NodeKey) -> Result<Node> {
        let node = self.node(key)?;
        if let Some(data) = node.category() {
            if !data.children.is_empty() {
                return Err(TaxonomyError::Validation(format!(
                    "Category '{}' still contains children; move or delete them first",
                    node.name
                )));
            }
        }

        let parent = node.parent;
        match parent {
            Some(pkey) => {
                if let Some(data) = self.nodes.get_mut(&pkey).and_then(Node::category_mut) {
                    data.children.retain(|&c| c != key);
                }
                self.recount(pkey);
            }
            None => self.roots.retain(|&r| r != key),
        }

        // Unreachable: existence was checked above.
        let node = self
            .nodes
            .remove(&key)
            .ok_or_else(|| TaxonomyError::NodeNotFound(format!("{key:?}")))?;
        if let Some(id) = node.id {
            self.ids.remove(&id);
        }
        Ok(node)
    }

    /// Relinks `key` under `new_parent` (or the forest root), updating the
    /// counters of both old and new parent.
    pub fn reparent(&mut self, key: NodeKey, new_parent: Option<NodeKey>) -> Result<()> {
        self.node(key)?;
        if let Some(pkey) = new_parent {
            if pkey == key {
                return Err(TaxonomyError::Validation(
                    "A node cannot be its own parent".to_string(),
                ));
            }
            let parent_node = self.node(pkey)?;
            if !parent_node.is_category() {
                return Err(TaxonomyError::Validation(format!(
                    "'{}' is a tag and cannot contain children",
                    parent_node.name
                )));
            }
        }

        let old_parent = self.nodes[&key].parent;
        if old_parent == new_parent {
            return Ok(());
        }

        // Unlink from the old owner.
        match old_parent {
            Some(pkey) => {
                if let Some(data) = self.nodes.get_mut(&pkey).and_then(Node::category_mut) {
                    data.children.retain(|&c| c != key);
                }
                self.recount(pkey);
            }
            None => self.roots.retain(|&r| r != key),
        }

        // Link under the new owner.
        match new_parent {
            Some(pkey) => {
                if let Some(data) = self.nodes.get_mut(&pkey).and_then(Node::category_mut) {
                    data.children.push(key);
                }
                self.recount(pkey);
            }
            None => self.roots.push(key),
        }

        if let Some(node) = self.nodes.get_mut(&key) {
            node.parent = new_parent;
            node.modified_at = now();
        }
        Ok(())
    }

    /// Recomputes both counters of a category from its live child list.
    fn recount(&mut self, key: NodeKey) {
        let Some(data) = self.nodes.get(&key).and_then(Node::category) else {
            return;
        };
        let mut tags = 0u32;
        let mut categories = 0u32;
        for child in &data.children {
            match self.nodes.get(child).map(Node::is_category) {
                Some(true) => categories += 1,
                Some(false) => tags += 1,
                None => {}
            }
        }
        if let Some(data) = self.nodes.get_mut(&key).and_then(Node::category_mut) {
            data.tag_count = Some(tags);
            data.category_count = Some(categories);
        }
    }

    /// Returns `(tag_count, category_count)` of a category. `None` values
    /// mean "not yet counted" and are distinct from zero.
    pub fn counters(&self, key: NodeKey) -> Result<(Option<u32>, Option<u32>)> {
        let node = self.node(key)?;
        match node.category() {
            Some(data) => Ok((data.tag_count, data.category_count)),
            None => Err(TaxonomyError::Validation(format!(
                "'{}' is a tag and has no child counters",
                node.name
            ))),
        }
    }

    /// Counts the children of a category now, caches the result and returns
    /// it. Used when a lazily loaded category is first displayed.
    pub fn refresh_counters(&mut self, key: NodeKey) -> Result<(u32, u32)> {
        self.counters(key)?;
        self.recount(key);
        let (tags, categories) = self.counters(key)?;
        Ok((tags.unwrap_or(0), categories.unwrap_or(0)))
    }

    /// Overwrites cached counters, including back to the uncounted state.
    /// Rollback helper for the orchestrator; not part of the public contract.
    pub(crate) fn set_counters(
        &mut self,
        key: NodeKey,
        (tag_count, category_count): (Option<u32>, Option<u32>),
    ) {
        if let Some(data) = self.nodes.get_mut(&key).and_then(Node::category_mut) {
            data.tag_count = tag_count;
            data.category_count = category_count;
        }
    }

    pub fn node(&self, key: NodeKey) -> Result<&Node> {
        self.nodes
            .get(&key)
            .ok_or_else(|| TaxonomyError::NodeNotFound(format!("{key:?}")))
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node> {
        self.nodes
            .get_mut(&key)
            .ok_or_else(|| TaxonomyError::NodeNotFound(format!("{key:?}")))
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub fn parent_of(&self, key: NodeKey) -> Result<Option<NodeKey>> {
        Ok(self.node(key)?.parent)
    }

    /// Direct children of `key`; empty for tags.
    pub fn children_of(&self, key: NodeKey) -> Result<&[NodeKey]> {
        Ok(self
            .node(key)?
            .category()
            .map_or(NO_CHILDREN, |data| &data.children))
    }

    /// Keys of all root nodes, in insertion order.
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.keys().copied()
    }

    /// Resolves a persisted id to its current arena key.
    pub fn find_by_id(&self, id: NodeId) -> Option<NodeKey> {
        self.ids.get(&id).copied()
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.ids.contains_key(&id)
    }

    /// `true` when `candidate` lies strictly below `ancestor`, determined by
    /// walking `candidate`'s parent chain up to the forest root.
    pub fn is_descendant(&self, candidate: NodeKey, ancestor: NodeKey) -> bool {
        let mut current = self.nodes.get(&candidate).and_then(|n| n.parent);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.nodes.get(&key).and_then(|n| n.parent);
        }
        false
    }

    /// Ancestors of `key`, nearest first, excluding `key` itself.
    pub fn ancestor_chain(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&key).and_then(|n| n.parent);
        while let Some(pkey) = current {
            chain.push(pkey);
            current = self.nodes.get(&pkey).and_then(|n| n.parent);
        }
        chain
    }

    /// Produces the flat persisted form of a node for the gateway.
    ///
    /// Fails when the parent has never been saved: an unsaved node must not
    /// be referenced by another node's persisted relation.
    pub fn record(&self, key: NodeKey) -> Result<NodeRecord> {
        let node = self.node(key)?;
        let parent_id = match node.parent {
            None => None,
            Some(pkey) => {
                let parent = self.node(pkey)?;
                Some(parent.id.ok_or_else(|| {
                    TaxonomyError::Validation(format!(
                        "Parent category '{}' has not been saved yet",
                        parent.name
                    ))
                })?)
            }
        };
        Ok(NodeRecord {
            id: node.id,
            kind: node.record_kind(),
            name: node.name.clone(),
            notes: node.notes.clone(),
            parent_id,
            created_at: node.created_at,
            modified_at: node.modified_at,
        })
    }

    /// Stores the id assigned by the gateway on first save. Ids are immutable
    /// once assigned.
    pub fn assign_id(&mut self, key: NodeKey, id: NodeId) -> Result<()> {
        let node = self.node(key)?;
        match node.id {
            Some(existing) if existing != id => Err(TaxonomyError::Validation(format!(
                "Node '{}' already has id {existing}, cannot reassign {id}",
                node.name
            ))),
            Some(_) => Ok(()),
            None => {
                self.node_mut(key)?.id = Some(id);
                self.ids.insert(id, key);
                Ok(())
            }
        }
    }

    /// Verifies the structural invariants: bidirectional parent/child
    /// consistency, root bookkeeping and counted counters matching live
    /// child counts. Test support.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        for (key, node) in &self.nodes {
            match node.parent {
                Some(pkey) => {
                    let parent = self
                        .nodes
                        .get(&pkey)
                        .ok_or_else(|| format!("{key:?} has dangling parent {pkey:?}"))?;
                    let children = parent
                        .category()
                        .ok_or_else(|| format!("{key:?} has a tag parent"))?;
                    if !children.children.contains(key) {
                        return Err(format!("{key:?} missing from parent child list"));
                    }
                    if self.roots.contains(key) {
                        return Err(format!("{key:?} has a parent but is listed as root"));
                    }
                }
                None => {
                    if !self.roots.contains(key) {
                        return Err(format!("{key:?} is parentless but not listed as root"));
                    }
                }
            }
            if let Some(data) = node.category() {
                let mut tags = 0u32;
                let mut categories = 0u32;
                for child in &data.children {
                    let child_node = self
                        .nodes
                        .get(child)
                        .ok_or_else(|| format!("{key:?} has dangling child {child:?}"))?;
                    if child_node.parent != Some(*key) {
                        return Err(format!("{child:?} does not point back to parent {key:?}"));
                    }
                    if child_node.is_category() {
                        categories += 1;
                    } else {
                        tags += 1;
                    }
                }
                if let Some(count) = data.tag_count {
                    if count != tags {
                        return Err(format!("{key:?} tag counter {count} != live {tags}"));
                    }
                }
                if let Some(count) = data.category_count {
                    if count != categories {
                        return Err(format!(
                            "{key:?} category counter {count} != live {categories}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordKind;

    fn record(id: i64, kind: RecordKind, name: &str, parent: Option<i64>) -> NodeRecord {
        NodeRecord {
            id: Some(NodeId(id)),
            kind,
            name: name.to_string(),
            notes: String::new(),
            parent_id: parent.map(NodeId),
            created_at: 0,
            modified_at: 0,
        }
    }

    #[test]
    fn test_create_tag_under_category_updates_counters() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        assert_eq!(store.counters(sport).unwrap(), (Some(0), Some(0)));

        let running = store.create_tag(Some(sport), "Running", "").unwrap();

        assert_eq!(store.counters(sport).unwrap(), (Some(1), Some(0)));
        assert_eq!(store.parent_of(running).unwrap(), Some(sport));
        assert_eq!(store.children_of(sport).unwrap(), &[running]);
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_create_tag_at_root() {
        let mut store = NodeStore::new();
        let key = store.create_tag(None, "Solo", "free text").unwrap();
        let node = store.node(key).unwrap();
        assert!(node.is_root());
        assert!(node.is_tag());
        assert_eq!(node.notes, "free text");
        assert_eq!(store.roots(), &[key]);
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_create_with_empty_name_fails() {
        let mut store = NodeStore::new();
        assert!(matches!(
            store.create_tag(None, "   ", ""),
            Err(TaxonomyError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_under_tag_fails() {
        let mut store = NodeStore::new();
        let tag = store.create_tag(None, "Running", "").unwrap();
        assert!(matches!(
            store.create_tag(Some(tag), "Nested", ""),
            Err(TaxonomyError::Validation(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rename_trims_and_validates() {
        let mut store = NodeStore::new();
        let key = store.create_tag(None, "Old", "").unwrap();

        store.rename(key, "  New  ").unwrap();
        assert_eq!(store.node(key).unwrap().name, "New");

        assert!(matches!(
            store.rename(key, "  "),
            Err(TaxonomyError::Validation(_))
        ));
        assert_eq!(store.node(key).unwrap().name, "New");
    }

    #[test]
    fn test_delete_leaf_updates_parent_counters() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        let running = store.create_tag(Some(sport), "Running", "").unwrap();

        let removed = store.delete(running).unwrap();
        assert_eq!(removed.name, "Running");
        assert_eq!(store.counters(sport).unwrap(), (Some(0), Some(0)));
        assert!(store.get(running).is_none());
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_category_with_children_is_refused() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        store.create_tag(Some(sport), "Running", "").unwrap();

        assert!(matches!(
            store.delete(sport),
            Err(TaxonomyError::Validation(_))
        ));
        assert_eq!(store.len(), 2);
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_reparent_moves_between_categories() {
        let mut store = NodeStore::new();
        let indoor = store.create_category(None, "Indoor").unwrap();
        let outdoor = store.create_category(None, "Outdoor").unwrap();
        let running = store.create_tag(Some(indoor), "Running", "").unwrap();

        store.reparent(running, Some(outdoor)).unwrap();

        assert_eq!(store.parent_of(running).unwrap(), Some(outdoor));
        assert_eq!(store.counters(indoor).unwrap(), (Some(0), Some(0)));
        assert_eq!(store.counters(outdoor).unwrap(), (Some(1), Some(0)));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_reparent_to_root_sets_is_root() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        let running = store.create_tag(Some(sport), "Running", "").unwrap();

        store.reparent(running, None).unwrap();

        assert!(store.node(running).unwrap().is_root());
        assert!(store.roots().contains(&running));
        assert_eq!(store.counters(sport).unwrap(), (Some(0), Some(0)));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_is_descendant_walks_parent_chain() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        let indoor = store.create_category(Some(sport), "Indoor").unwrap();
        let running = store.create_tag(Some(indoor), "Running", "").unwrap();

        assert!(store.is_descendant(running, sport));
        assert!(store.is_descendant(indoor, sport));
        assert!(!store.is_descendant(sport, indoor));
        assert!(!store.is_descendant(sport, sport));
        assert_eq!(store.ancestor_chain(running), vec![indoor, sport]);
    }

    #[test]
    fn test_record_refuses_unsaved_parent() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        let running = store.create_tag(Some(sport), "Running", "").unwrap();

        // Parent has no id yet.
        assert!(matches!(
            store.record(running),
            Err(TaxonomyError::Validation(_))
        ));

        store.assign_id(sport, NodeId(7)).unwrap();
        let record = store.record(running).unwrap();
        assert_eq!(record.parent_id, Some(NodeId(7)));
        assert_eq!(record.id, None);
    }

    #[test]
    fn test_assign_id_is_immutable() {
        let mut store = NodeStore::new();
        let key = store.create_tag(None, "Running", "").unwrap();

        store.assign_id(key, NodeId(3)).unwrap();
        assert_eq!(store.find_by_id(NodeId(3)), Some(key));

        // Re-assigning the same id is a no-op, a different id is refused.
        store.assign_id(key, NodeId(3)).unwrap();
        assert!(matches!(
            store.assign_id(key, NodeId(4)),
            Err(TaxonomyError::Validation(_))
        ));
    }

    #[test]
    fn test_from_records_rebuilds_forest_with_uncounted_categories() {
        let records = vec![
            record(1, RecordKind::Category, "Sport", None),
            record(2, RecordKind::Tag, "Running", Some(1)),
            record(3, RecordKind::Tag, "Loose", None),
        ];
        let store = NodeStore::from_records(&records);

        assert_eq!(store.len(), 3);
        let sport = store.find_by_id(NodeId(1)).unwrap();
        let running = store.find_by_id(NodeId(2)).unwrap();
        assert_eq!(store.parent_of(running).unwrap(), Some(sport));

        // Lazy-load deferral: counters are unknown until counted, not zero.
        assert_eq!(store.counters(sport).unwrap(), (None, None));
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_from_records_relinks_orphans_to_root() {
        let records = vec![record(2, RecordKind::Tag, "Running", Some(99))];
        let store = NodeStore::from_records(&records);
        let running = store.find_by_id(NodeId(2)).unwrap();
        assert!(store.node(running).unwrap().is_root());
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_refresh_counters_counts_lazily_loaded_category() {
        let records = vec![
            record(1, RecordKind::Category, "Sport", None),
            record(2, RecordKind::Tag, "Running", Some(1)),
            record(3, RecordKind::Category, "Indoor", Some(1)),
        ];
        let mut store = NodeStore::from_records(&records);
        let sport = store.find_by_id(NodeId(1)).unwrap();

        assert_eq!(store.counters(sport).unwrap(), (None, None));
        assert_eq!(store.refresh_counters(sport).unwrap(), (1, 1));
        assert_eq!(store.counters(sport).unwrap(), (Some(1), Some(1)));
    }
}
