//! Node model for the tag taxonomy: tags, categories and their persisted form.

use serde::{Deserialize, Serialize};

/// Persistent identity of a node, assigned by the persistence gateway on the
/// first successful save. A node without a `NodeId` exists only in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-local handle into the [`NodeStore`](super::store::NodeStore) arena.
///
/// Keys are stable for the lifetime of one store and are never reused, so a
/// stale key after a delete resolves to "not found" rather than to a
/// different node. Unlike [`NodeId`], a key exists before the node has ever
/// been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub(crate) u64);

/// Discriminates tag and category rows in persisted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Tag,
    Category,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Tag => "tag",
            RecordKind::Category => "category",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tag" => Some(RecordKind::Tag),
            "category" => Some(RecordKind::Category),
            _ => None,
        }
    }
}

/// Category payload: the ordered child list plus cached child counters.
///
/// `tag_count` / `category_count` are `None` until they have been counted
/// (lazy-load deferral). `None` is "not yet known" and must never be treated
/// as zero; once the store mutates or counts the children the counters are
/// kept in sync with the live child list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryData {
    pub children: Vec<NodeKey>,
    pub tag_count: Option<u32>,
    pub category_count: Option<u32>,
}

/// Tag or category payload of a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Tag,
    Category(CategoryData),
}

/// One node of the taxonomy forest.
///
/// The child list of a category owns its children structurally; `parent` is
/// the back reference. A node is a root exactly when `parent` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub key: NodeKey,
    /// Persistent id, `None` until the first successful save.
    pub id: Option<NodeId>,
    pub name: String,
    pub notes: String,
    pub parent: Option<NodeKey>,
    pub created_at: i64,
    pub modified_at: i64,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.kind, NodeKind::Tag)
    }

    pub fn is_category(&self) -> bool {
        matches!(self.kind, NodeKind::Category(_))
    }

    pub fn record_kind(&self) -> RecordKind {
        match self.kind {
            NodeKind::Tag => RecordKind::Tag,
            NodeKind::Category(_) => RecordKind::Category,
        }
    }

    /// Category payload, or `None` for tags.
    pub fn category(&self) -> Option<&CategoryData> {
        match &self.kind {
            NodeKind::Category(data) => Some(data),
            NodeKind::Tag => None,
        }
    }

    pub(crate) fn category_mut(&mut self) -> Option<&mut CategoryData> {
        match &mut self.kind {
            NodeKind::Category(data) => Some(data),
            NodeKind::Tag => None,
        }
    }
}

/// Flat persisted form of a node, exchanged with the persistence gateway.
///
/// The parent relation is carried by id, never by arena key, so a record can
/// outlive the in-memory store instance it was produced from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Option<NodeId>,
    pub kind: RecordKind,
    pub name: String,
    pub notes: String,
    pub parent_id: Option<NodeId>,
    pub created_at: i64,
    pub modified_at: i64,
}
