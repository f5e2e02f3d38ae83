//! Display order of sibling nodes.
//!
//! Categories always sort before tags, then siblings compare by name
//! (case-sensitive). Because the name is the only sort key there is no cheap
//! way to know whether a given edit affects ordering, so every property
//! change is declared sort-relevant: a rename always triggers a re-sort.

use crate::{Node, NodeKey, NodeStore};
use std::cmp::Ordering;

/// Total order over siblings of one category (or of the forest root).
pub struct SiblingComparator;

impl SiblingComparator {
    /// Compares two siblings: category before tag, then by name. Equal names
    /// fall back to the arena key so that the order stays strict even though
    /// sibling names are not required to be unique.
    pub fn compare(a: &Node, b: &Node) -> Ordering {
        match (a.is_category(), b.is_category()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.cmp(&b.name).then_with(|| a.key.cmp(&b.key)),
        }
    }

    /// Whether a change to `_property` can affect sibling order. Always true:
    /// names are the sole sort key, so any edit forces a re-sort.
    pub fn is_sorter_property(_property: &str) -> bool {
        true
    }
}

/// Children of `parent` (or the root nodes when `None`) in display order.
pub fn sorted_children(store: &NodeStore, parent: Option<NodeKey>) -> Vec<NodeKey> {
    let mut keys: Vec<NodeKey> = match parent {
        Some(pkey) => store.children_of(pkey).map(<[_]>::to_vec).unwrap_or_default(),
        None => store.roots().to_vec(),
    };
    keys.sort_by(|&a, &b| {
        match (store.get(a), store.get(b)) {
            (Some(na), Some(nb)) => SiblingComparator::compare(na, nb),
            _ => Ordering::Equal,
        }
    });
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_sorts_before_tag_regardless_of_name() {
        let mut store = NodeStore::new();
        let tag = store.create_tag(None, "Aardvark", "").unwrap();
        let category = store.create_category(None, "Zebra").unwrap();

        let order = sorted_children(&store, None);
        assert_eq!(order, vec![category, tag]);
    }

    #[test]
    fn test_siblings_sort_by_name_case_sensitive() {
        let mut store = NodeStore::new();
        let b = store.create_tag(None, "beta", "").unwrap();
        let a = store.create_tag(None, "Alpha", "").unwrap();
        let z = store.create_tag(None, "Zulu", "").unwrap();

        // Uppercase sorts before lowercase in a case-sensitive comparison.
        assert_eq!(sorted_children(&store, None), vec![a, z, b]);
    }

    #[test]
    fn test_order_is_strict_for_distinct_siblings() {
        let mut store = NodeStore::new();
        let first = store.create_tag(None, "Running", "").unwrap();
        let second = store.create_tag(None, "Running", "").unwrap();

        let na = store.node(first).unwrap();
        let nb = store.node(second).unwrap();
        let ab = SiblingComparator::compare(na, nb);
        let ba = SiblingComparator::compare(nb, na);
        assert_ne!(ab, std::cmp::Ordering::Equal);
        assert_eq!(ab, ba.reverse());
    }

    #[test]
    fn test_rename_is_always_sort_relevant() {
        assert!(SiblingComparator::is_sorter_property("name"));
        assert!(SiblingComparator::is_sorter_property("notes"));
    }

    #[test]
    fn test_sorted_children_of_category() {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        let run = store.create_tag(Some(sport), "Running", "").unwrap();
        let bike = store.create_tag(Some(sport), "Biking", "").unwrap();
        let indoor = store.create_category(Some(sport), "Indoor").unwrap();

        assert_eq!(sorted_children(&store, Some(sport)), vec![indoor, bike, run]);
    }
}
