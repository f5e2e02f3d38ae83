//! Synchronisation between the taxonomy forest and a displayed tree.
//!
//! A [`TreeProjection`] tracks what the tree widget shows: which categories
//! are expanded, the current selection and the checked tag set. Expansion is
//! keyed by persistent [`NodeId`], not by arena key, because node instances
//! are replaced when the forest is reloaded.
//!
//! Selection-driven auto expand/collapse is reentrancy-prone: expanding a
//! category makes the widget fire another selection-changed event. Instead
//! of a cluster of ad hoc booleans this module runs a small explicit state
//! machine; any selection event arriving while a programmatic expansion is
//! outstanding is dropped, not queued.

use crate::core::order::sorted_children;
use crate::{NodeId, NodeKey, NodeStore};
use log::debug;
use std::collections::HashSet;

/// Current phase of the synchroniser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Ready to process widget events.
    Idle,
    /// A structural refresh is replacing the tree input.
    Refreshing,
    /// A selection-driven expansion has been handed to the widget and not
    /// yet confirmed via [`TreeProjection::expansion_applied`].
    ExpandingReentrant,
}

/// One expansion change the widget must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandChange {
    pub id: NodeId,
    pub expanded: bool,
}

/// How a selection-changed event was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Reentrant event, suppressed without touching any state.
    Dropped,
    /// Selection recorded; nothing for the widget to do.
    Selected,
    /// A tag was clicked; its checked state flipped to the contained value.
    CheckToggled(bool),
    /// Apply these expansion changes to the widget, then call
    /// [`TreeProjection::expansion_applied`].
    Toggle(Vec<ExpandChange>),
}

/// Live projection of one tree widget over a [`NodeStore`].
#[derive(Debug)]
pub struct TreeProjection {
    expanded: HashSet<NodeId>,
    checked: HashSet<NodeId>,
    selected: Option<NodeId>,
    state: SyncState,
    /// One-shot: set on arrow-key press, consumed by the next processed
    /// selection-changed event.
    navigation_key_pressed: bool,
    /// When a category is selected, collapse every other branch and expand
    /// only the selected path.
    single_expand: bool,
    /// Selecting a category expands it (or collapses it when already open).
    auto_expand_collapse: bool,
}

impl Default for TreeProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeProjection {
    pub fn new() -> Self {
        Self::with_policies(true, true)
    }

    pub fn with_policies(single_expand: bool, auto_expand_collapse: bool) -> Self {
        Self {
            expanded: HashSet::new(),
            checked: HashSet::new(),
            selected: None,
            state: SyncState::Idle,
            navigation_key_pressed: false,
            single_expand,
            auto_expand_collapse,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    /// Ids of all expanded categories, sorted for stable persistence.
    pub fn expanded_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.expanded.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Direct expand/collapse from the widget (triangle click, expand-all).
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if expanded {
            self.expanded.insert(id);
        } else {
            self.expanded.remove(&id);
        }
    }

    pub fn is_checked(&self, id: NodeId) -> bool {
        self.checked.contains(&id)
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        if checked {
            self.checked.insert(id);
        } else {
            self.checked.remove(&id);
        }
    }

    /// Ids of all checked tags, sorted for stable persistence.
    pub fn checked_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.checked.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Called from the widget's key listener for arrow-key navigation. The
    /// flag is one-shot: the next processed selection-changed event consumes
    /// it and skips the expand/collapse-on-select behaviour.
    pub fn note_navigation_key(&mut self) {
        self.navigation_key_pressed = true;
    }

    /// Replays the captured expansion/check/selection state after a
    /// structural change replaced the tree input. Ids that no longer resolve
    /// in the store are silently dropped; new nodes start collapsed.
    pub fn refresh(&mut self, store: &NodeStore) {
        self.state = SyncState::Refreshing;

        self.expanded.retain(|&id| {
            store
                .find_by_id(id)
                .and_then(|key| store.get(key))
                .is_some_and(|node| node.is_category())
        });
        self.checked.retain(|&id| {
            store
                .find_by_id(id)
                .and_then(|key| store.get(key))
                .is_some_and(|node| node.is_tag())
        });
        if let Some(id) = self.selected {
            if store.find_by_id(id).is_none() {
                self.selected = None;
            }
        }
        debug!(
            "tree refresh reapplied {} expanded branches",
            self.expanded.len()
        );

        self.state = SyncState::Idle;
    }

    /// Handles a selection-changed event from the widget.
    ///
    /// Keyboard-driven selections only record the selection. Pointer or API
    /// selection of a tag toggles its checked state; of a category it runs
    /// the auto expand/collapse policies and returns the expansion changes
    /// for the widget. While those are outstanding the state is
    /// [`SyncState::ExpandingReentrant`] and further events are dropped.
    pub fn on_selection_changed(
        &mut self,
        store: &NodeStore,
        selected: Option<NodeId>,
    ) -> SelectionOutcome {
        if self.state == SyncState::ExpandingReentrant {
            return SelectionOutcome::Dropped;
        }

        let navigated = self.navigation_key_pressed;
        self.navigation_key_pressed = false;

        self.selected = selected;
        let Some(id) = selected else {
            return SelectionOutcome::Selected;
        };
        let Some(node) = store.find_by_id(id).and_then(|key| store.get(key)) else {
            return SelectionOutcome::Selected;
        };

        if navigated {
            // Arrow-key navigation never expands or toggles.
            return SelectionOutcome::Selected;
        }

        if node.is_tag() {
            let now_checked = !self.is_checked(id);
            self.set_checked(id, now_checked);
            return SelectionOutcome::CheckToggled(now_checked);
        }

        if !self.auto_expand_collapse && !self.single_expand {
            return SelectionOutcome::Selected;
        }

        let changes = self.category_select_changes(store, node.key, id);
        if changes.is_empty() {
            return SelectionOutcome::Selected;
        }
        for change in &changes {
            self.set_expanded(change.id, change.expanded);
        }
        self.state = SyncState::ExpandingReentrant;
        SelectionOutcome::Toggle(changes)
    }

    /// The widget finished applying a [`SelectionOutcome::Toggle`]; selection
    /// events are processed again.
    pub fn expansion_applied(&mut self) {
        if self.state == SyncState::ExpandingReentrant {
            self.state = SyncState::Idle;
        }
    }

    fn category_select_changes(
        &self,
        store: &NodeStore,
        key: NodeKey,
        id: NodeId,
    ) -> Vec<ExpandChange> {
        let was_expanded = self.is_expanded(id);
        let mut changes = Vec::new();

        if self.single_expand {
            // Keep only the selected path expanded; everything else collapses.
            let mut keep: HashSet<NodeId> = store
                .ancestor_chain(key)
                .iter()
                .filter_map(|&a| store.get(a).and_then(|n| n.id))
                .collect();
            let expand_self = !(was_expanded && self.auto_expand_collapse);
            if expand_self {
                keep.insert(id);
            }

            for &open in &self.expanded {
                if !keep.contains(&open) {
                    changes.push(ExpandChange {
                        id: open,
                        expanded: false,
                    });
                }
            }
            for &wanted in &keep {
                if !self.is_expanded(wanted) {
                    changes.push(ExpandChange {
                        id: wanted,
                        expanded: true,
                    });
                }
            }
        } else if self.auto_expand_collapse {
            changes.push(ExpandChange {
                id,
                expanded: !was_expanded,
            });
        }

        changes
    }

    /// Children of one node (or the forest roots) in display order. Fetched
    /// per node on demand; the projection never materialises the whole
    /// forest at once.
    pub fn visible_children(&self, store: &NodeStore, parent: Option<NodeKey>) -> Vec<NodeKey> {
        sorted_children(store, parent)
    }

    /// The rows the widget currently shows, depth first: roots plus the
    /// children of every expanded category.
    pub fn visible_rows(&self, store: &NodeStore) -> Vec<NodeKey> {
        let mut rows = Vec::new();
        let mut stack: Vec<NodeKey> = sorted_children(store, None);
        stack.reverse();
        while let Some(key) = stack.pop() {
            rows.push(key);
            let expanded = store
                .get(key)
                .and_then(|node| node.id)
                .is_some_and(|id| self.is_expanded(id));
            if expanded {
                let mut children = sorted_children(store, Some(key));
                children.reverse();
                stack.extend(children);
            }
        }
        rows
    }
}
