//! Validation of drag-and-drop moves.
//!
//! A move is checked completely before anything is touched: a rejected move
//! leaves both the store and the view projection exactly as they were.

use crate::{NodeKey, NodeStore, Result, TaxonomyError};

/// Where the dragged node is dropped relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropLocation {
    /// Drop as a sibling in front of the target.
    Before,
    /// Drop as a sibling behind the target.
    After,
    /// Drop into the target, which must be a category.
    On,
}

/// Decides whether dropping `dragged` at `location` relative to `target` is
/// legal. Rules are applied in order:
///
/// 1. no self-drop,
/// 2. the target must not be a descendant of the dragged node (cycle),
/// 3. dropping `On` requires a category target,
/// 4. for `Before`/`After` the effective new parent is the target's parent,
///    which is re-validated against rule 2 only when it differs from the
///    dragged node's current parent.
pub fn check_move(
    store: &NodeStore,
    dragged: NodeKey,
    target: NodeKey,
    location: DropLocation,
) -> Result<()> {
    let dragged_node = store.node(dragged)?;
    let target_node = store.node(target)?;

    if dragged == target {
        return Err(TaxonomyError::InvalidMove(
            "A node cannot be dropped onto itself".to_string(),
        ));
    }

    if store.is_descendant(target, dragged) {
        return Err(TaxonomyError::InvalidMove(format!(
            "Moving '{}' into its own subtree would create a cycle",
            dragged_node.name
        )));
    }

    match location {
        DropLocation::On => {
            if !target_node.is_category() {
                return Err(TaxonomyError::InvalidMove(format!(
                    "'{}' is a tag and cannot accept children",
                    target_node.name
                )));
            }
        }
        DropLocation::Before | DropLocation::After => {
            let new_parent = target_node.parent;
            if new_parent != dragged_node.parent {
                // A target whose parent is the dragged node itself is a
                // descendant and was already rejected above.
                if let Some(pkey) = new_parent {
                    if store.is_descendant(pkey, dragged) {
                        return Err(TaxonomyError::InvalidMove(format!(
                            "Moving '{}' into its own subtree would create a cycle",
                            dragged_node.name
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Boolean convenience over [`check_move`] for drag-over feedback.
pub fn can_move(
    store: &NodeStore,
    dragged: NodeKey,
    target: NodeKey,
    location: DropLocation,
) -> bool {
    check_move(store, dragged, target, location).is_ok()
}

/// The parent the dragged node ends up under when the drop is performed:
/// the target itself for `On`, the target's parent otherwise.
pub fn effective_parent(
    store: &NodeStore,
    target: NodeKey,
    location: DropLocation,
) -> Result<Option<NodeKey>> {
    match location {
        DropLocation::On => Ok(Some(target)),
        DropLocation::Before | DropLocation::After => store.parent_of(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_forest() -> (NodeStore, NodeKey, NodeKey, NodeKey, NodeKey) {
        let mut store = NodeStore::new();
        let sport = store.create_category(None, "Sport").unwrap();
        let indoor = store.create_category(Some(sport), "Indoor").unwrap();
        let running = store.create_tag(Some(indoor), "Running", "").unwrap();
        let loose = store.create_tag(None, "Loose", "").unwrap();
        (store, sport, indoor, running, loose)
    }

    #[test]
    fn test_self_drop_is_rejected() {
        let (store, sport, ..) = sample_forest();
        assert!(!can_move(&store, sport, sport, DropLocation::On));
        assert!(!can_move(&store, sport, sport, DropLocation::Before));
    }

    #[test]
    fn test_drop_on_own_descendant_is_rejected() {
        let (store, sport, indoor, running, _) = sample_forest();

        // "Indoor" is a descendant of "Sport": refusing prevents the cycle.
        assert!(!can_move(&store, sport, indoor, DropLocation::On));
        assert!(!can_move(&store, sport, running, DropLocation::On));
        assert!(matches!(
            check_move(&store, sport, indoor, DropLocation::On),
            Err(TaxonomyError::InvalidMove(_))
        ));
    }

    #[test]
    fn test_drop_on_tag_is_rejected() {
        let (store, _, _, running, loose) = sample_forest();
        assert!(!can_move(&store, loose, running, DropLocation::On));
        // But dropping next to a tag is fine.
        assert!(can_move(&store, loose, running, DropLocation::Before));
    }

    #[test]
    fn test_sibling_drop_validates_effective_parent() {
        let (store, sport, indoor, running, _) = sample_forest();

        // Before/after "Running" means into "Indoor", a descendant of "Sport".
        assert!(!can_move(&store, sport, running, DropLocation::Before));
        assert!(!can_move(&store, sport, running, DropLocation::After));

        // Moving "Indoor" next to "Running" keeps its current parent; legal
        // even though that parent is "Indoor"-adjacent.
        assert!(can_move(&store, running, indoor, DropLocation::After));
    }

    #[test]
    fn test_drop_next_to_own_child_is_rejected() {
        let (store, _, indoor, running, _) = sample_forest();

        // "Running" is a child of "Indoor": landing next to it would make
        // "Indoor" its own parent.
        assert!(!can_move(&store, indoor, running, DropLocation::Before));
        assert!(!can_move(&store, indoor, running, DropLocation::After));
        assert!(matches!(
            check_move(&store, indoor, running, DropLocation::Before),
            Err(TaxonomyError::InvalidMove(_))
        ));
    }

    #[test]
    fn test_legal_drop_into_category() {
        let (store, sport, _, _, loose) = sample_forest();
        assert!(can_move(&store, loose, sport, DropLocation::On));
    }

    #[test]
    fn test_effective_parent_resolution() {
        let (store, sport, indoor, running, _) = sample_forest();
        assert_eq!(
            effective_parent(&store, sport, DropLocation::On).unwrap(),
            Some(sport)
        );
        assert_eq!(
            effective_parent(&store, running, DropLocation::Before).unwrap(),
            Some(indoor)
        );
        assert_eq!(
            effective_parent(&store, sport, DropLocation::After).unwrap(),
            None
        );
    }

    #[test]
    fn test_rejected_move_leaves_store_untouched() {
        let (store, sport, indoor, _, _) = sample_forest();
        let before: Vec<_> = {
            let mut keys: Vec<_> = store.keys().collect();
            keys.sort();
            keys.iter().map(|&k| store.node(k).unwrap().clone()).collect()
        };

        assert!(check_move(&store, sport, indoor, DropLocation::On).is_err());

        let after: Vec<_> = {
            let mut keys: Vec<_> = store.keys().collect();
            keys.sort();
            keys.iter().map(|&k| store.node(k).unwrap().clone()).collect()
        };
        assert_eq!(before, after);
        store.check_invariants().unwrap();
    }
}
