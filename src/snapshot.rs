//! Point-in-time export of a tree's shape.
//!
//! A [`TreeSnapshot`] is what external renderers consume: one descriptor per
//! node plus the edges between them. The serialized field names (`id`, `keys`,
//! `is_leaf`, `values`, `source`, `target`, `type`) are a stable wire format.
//!
//! ```
//! use mv_bptree::{BPTreeMultimap, LinkKind};
//!
//! let mut tree = BPTreeMultimap::with_order(3).unwrap();
//! tree.insert(1, 10);
//! tree.insert(2, 20);
//! tree.insert(3, 30);
//!
//! let snapshot = tree.snapshot();
//! assert_eq!(snapshot.nodes.len(), 3);
//! assert_eq!(snapshot.links.iter().filter(|l| l.kind == LinkKind::LeafLink).count(), 1);
//!
//! let json = snapshot.to_json().unwrap();
//! assert!(json.contains(r#""type":"parent-child""#));
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stable identity of a tree node.
///
/// Ids are handed out from a per-tree counter when a node is created and are
/// never reused, even after the node has been merged away.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable description of a tree, in breadth-first order from the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot<K, V> {
    pub nodes: Vec<NodeSnapshot<K, V>>,
    pub links: Vec<LinkSnapshot>,
}

/// One node of a [`TreeSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot<K, V> {
    pub id: NodeId,
    pub keys: Vec<K>,
    pub is_leaf: bool,
    /// Value sets parallel to `keys`; present for leaves only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Vec<V>>>,
}

/// A directed edge between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    /// Internal node to one of its children.
    ParentChild,
    /// Leaf to the next leaf in key order.
    LeafLink,
}

impl<K: Serialize, V: Serialize> TreeSnapshot<K, V> {
    /// Serializes the snapshot as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if a key or
    /// value fails to serialize (for example a map key that is not a string).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes the snapshot as indented JSON.
    ///
    /// # Errors
    ///
    /// See [`TreeSnapshot::to_json`].
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<K, V> TreeSnapshot<K, V> {
    /// Returns the descriptor with the given id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot<K, V>> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Ids of `id`'s children, in order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.links
            .iter()
            .filter(move |link| link.kind == LinkKind::ParentChild && link.source == id)
            .map(|link| link.target)
    }

    /// The leaf `id` links to, if any.
    #[must_use]
    pub fn next_leaf(&self, id: NodeId) -> Option<NodeId> {
        self.links
            .iter()
            .find(|link| link.kind == LinkKind::LeafLink && link.source == id)
            .map(|link| link.target)
    }
}
