use core::borrow::Borrow;
use std::collections::VecDeque;

use log::{debug, trace};
use smallvec::SmallVec;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, LeafNode, Node, SearchResult, ValueSet};
use crate::order::Order;
use crate::snapshot::{LinkKind, LinkSnapshot, NodeId, NodeSnapshot, TreeSnapshot};

/// The B+Tree engine backing `BPTreeMultimap`.
///
/// Every node lives in `nodes`. Children, `parent` back-references and the
/// leaf `next` chain are all handles into that arena, so replacing the root
/// never fights with a dangling or cyclic reference.
pub(crate) struct RawBPTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Handle to the root. An empty tree is a root leaf with no entries.
    root: Handle,
    /// Handle to the leftmost leaf, where the leaf chain starts.
    first_leaf: Handle,
    order: Order,
    /// Id handed to the next node created. Never decreases.
    next_id: u64,
    /// Number of distinct keys.
    key_count: usize,
    /// Number of (key, value) pairs.
    len: usize,
}

impl<K, V> RawBPTree<K, V> {
    /// Creates an empty tree: a single root leaf.
    pub(crate) fn new(order: Order) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new(NodeId(0))));
        Self {
            nodes,
            root,
            first_leaf: root,
            order,
            next_id: 1,
            key_count: 0,
            len: 0,
        }
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn key_count(&self) -> usize {
        self.key_count
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live nodes.
    pub(crate) const fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn first_leaf(&self) -> Handle {
        self.first_leaf
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    /// Number of levels, counting the root and the leaves.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(0);
            height += 1;
        }
        height
    }

    /// The rightmost leaf, reached by descending along last children.
    pub(crate) fn last_leaf(&self) -> Handle {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.child_count() - 1);
        }
        current
    }

    /// Drops every node and starts over with a fresh root leaf.
    ///
    /// Node ids keep counting from where they were.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        let id = self.next_node_id();
        self.root = self.nodes.alloc(Node::Leaf(LeafNode::new(id)));
        self.first_leaf = self.root;
        self.key_count = 0;
        self.len = 0;
    }

    fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Points every child of `parent` back at it.
    fn adopt_children(&mut self, parent: Handle) {
        let children: SmallVec<[Handle; 16]> = self.nodes.get(parent).as_internal().children().iter().copied().collect();
        for child in children {
            self.nodes.get_mut(child).set_parent(Some(parent));
        }
    }

    /// Returns the parent of a non-root node and the node's position in it.
    fn parent_slot(&self, handle: Handle) -> (Handle, usize) {
        let node = self.nodes.get(handle);
        let parent = node
            .parent()
            .unwrap_or_else(|| panic!("non-root node {} has no parent", node.id()));
        let index = self
            .nodes
            .get(parent)
            .as_internal()
            .child_index(handle)
            .unwrap_or_else(|| panic!("node {} is missing from its parent's children", node.id()));
        (parent, index)
    }
}

impl<K: Ord, V> RawBPTree<K, V> {
    /// Descends from the root to the only leaf that may hold `key`.
    pub(crate) fn locate_leaf<Q>(&self, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.search_child(key));
        }
        current
    }

    /// Returns the leaf handle and index of `key`, if present.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf_handle = self.locate_leaf(key);
        match self.nodes.get(leaf_handle).as_leaf().search(key) {
            SearchResult::Found(idx) => Some((leaf_handle, idx)),
            SearchResult::NotFound(_) => None,
        }
    }

    /// Returns the ascending values stored under `key`; empty if the key is absent.
    pub(crate) fn find<Q>(&self, key: &Q) -> &[V]
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.search(key) {
            Some((leaf_handle, idx)) => self.nodes.get(leaf_handle).as_leaf().values(idx).as_slice(),
            None => &[],
        }
    }
}

impl<K: Ord, V: Ord> RawBPTree<K, V> {
    pub(crate) fn contains<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(key)
            .is_some_and(|(leaf_handle, idx)| self.nodes.get(leaf_handle).as_leaf().values(idx).contains(value))
    }
}

impl<K: Ord + Clone, V: Ord> RawBPTree<K, V> {
    /// Adds `value` to the set under `key`.
    /// Returns false if the pair was already present.
    pub(crate) fn insert(&mut self, key: K, value: V) -> bool {
        let order = self.order;
        let leaf_handle = self.locate_leaf(&key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();

        match leaf.search(&key) {
            SearchResult::Found(idx) => {
                if !leaf.values_mut(idx).insert(value) {
                    return false;
                }
                self.len += 1;
            }
            SearchResult::NotFound(idx) => {
                leaf.insert(idx, key, ValueSet::single(value));
                let overfull = leaf.is_overfull(order);
                self.len += 1;
                self.key_count += 1;

                if overfull {
                    self.split_leaf(leaf_handle);
                }
            }
        }
        true
    }

    /// Splits an overfull leaf and pushes the new leaf's first key into the parent.
    fn split_leaf(&mut self, leaf_handle: Handle) {
        let id = self.next_node_id();
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let right_leaf = leaf.split(id);
        let separator = right_leaf.first_key().expect("split leaf has an upper half").clone();
        let left_id = leaf.id();

        let right_handle = self.nodes.alloc(Node::Leaf(right_leaf));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));
        trace!("split leaf {left_id} into {left_id} and {id}");

        self.insert_into_parent(leaf_handle, separator, right_handle);
    }

    /// Inserts `separator` and `right` directly after `left` in `left`'s parent,
    /// splitting upward as needed.
    fn insert_into_parent(&mut self, left: Handle, separator: K, right: Handle) {
        let Some(parent_handle) = self.nodes.get(left).parent() else {
            self.grow_root(left, separator, right);
            return;
        };

        let parent = self.nodes.get_mut(parent_handle).as_internal_mut();
        let index = parent
            .child_index(left)
            .unwrap_or_else(|| panic!("split node is missing from parent {}", parent.id()));
        parent.insert_child(index, separator, right);
        let overfull = parent.is_overfull(self.order);
        self.nodes.get_mut(right).set_parent(Some(parent_handle));

        if overfull {
            self.split_internal(parent_handle);
        }
    }

    /// Splits an overfull internal node around its middle key.
    fn split_internal(&mut self, handle: Handle) {
        let id = self.next_node_id();
        let node = self.nodes.get_mut(handle).as_internal_mut();
        let (median, right) = node.split(id);
        let left_id = node.id();

        let right_handle = self.nodes.alloc(Node::Internal(right));
        self.adopt_children(right_handle);
        trace!("split internal {left_id} into {left_id} and {id}");

        self.insert_into_parent(handle, median, right_handle);
    }

    /// Puts a fresh internal root above the two halves of a split root.
    fn grow_root(&mut self, left: Handle, separator: K, right: Handle) {
        let id = self.next_node_id();
        let root = self.nodes.alloc(Node::Internal(InternalNode::new_root(id, left, separator, right)));
        self.nodes.get_mut(left).set_parent(Some(root));
        self.nodes.get_mut(right).set_parent(Some(root));
        self.root = root;
        debug!("root split; new root {id}, height {}", self.height());
    }

    /// Removes `value` from the set under `key`, dropping the key once its set is empty.
    /// Returns false if the pair was not present.
    pub(crate) fn delete<Q>(&mut self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let order = self.order;
        let leaf_handle = self.locate_leaf(key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();

        let SearchResult::Found(idx) = leaf.search(key) else {
            return false;
        };
        if !leaf.values_mut(idx).remove(value) {
            return false;
        }
        self.len -= 1;
        if !leaf.values(idx).is_empty() {
            return true;
        }

        leaf.remove(idx);
        self.key_count -= 1;
        let underfull = leaf.is_underfull(order);

        if underfull && leaf_handle != self.root {
            self.rebalance_leaf(leaf_handle);
        }
        true
    }

    /// Restores minimum occupancy of a non-root leaf by borrowing or merging.
    fn rebalance_leaf(&mut self, leaf_handle: Handle) {
        let (parent_handle, child_idx) = self.parent_slot(leaf_handle);
        let parent = self.nodes.get(parent_handle).as_internal();
        let left = (child_idx > 0).then(|| parent.child(child_idx - 1));
        let right = (child_idx + 1 < parent.child_count()).then(|| parent.child(child_idx + 1));

        if let Some(left) = left
            && self.nodes.get(left).as_leaf().can_lend(self.order)
        {
            self.borrow_from_left_leaf(leaf_handle, left, parent_handle, child_idx);
            return;
        }

        if let Some(right) = right
            && self.nodes.get(right).as_leaf().can_lend(self.order)
        {
            self.borrow_from_right_leaf(leaf_handle, right, parent_handle, child_idx);
            return;
        }

        match (left, right) {
            (Some(left), _) => self.merge_leaves(left, leaf_handle, parent_handle, child_idx - 1),
            (None, Some(right)) => self.merge_leaves(leaf_handle, right, parent_handle, child_idx),
            (None, None) => panic!("leaf under parent {} has no siblings", self.nodes.get(parent_handle).id()),
        }
    }

    /// Moves the left sibling's last entry to the front of this leaf.
    fn borrow_from_left_leaf(&mut self, leaf_handle: Handle, left_handle: Handle, parent_handle: Handle, child_idx: usize) {
        let left = self.nodes.get_mut(left_handle).as_leaf_mut();
        let (key, values) = left.pop().expect("lending leaf is not empty");

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        leaf.push_front(key.clone(), values);
        trace!("leaf {} borrowed from left sibling", leaf.id());

        // The moved key is now the smallest key right of the separator.
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx - 1, key);
    }

    /// Moves the right sibling's first entry to the end of this leaf.
    fn borrow_from_right_leaf(&mut self, leaf_handle: Handle, right_handle: Handle, parent_handle: Handle, child_idx: usize) {
        let right = self.nodes.get_mut(right_handle).as_leaf_mut();
        let (key, values) = right.pop_front().expect("lending leaf is not empty");
        let new_first = right.first_key().expect("lending leaf keeps its minimum").clone();

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        leaf.push(key, values);
        trace!("leaf {} borrowed from right sibling", leaf.id());

        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx, new_first);
    }

    /// Folds `right_handle` into its left sibling and drops their separator.
    fn merge_leaves(&mut self, left_handle: Handle, right_handle: Handle, parent_handle: Handle, separator_idx: usize) {
        // The leftmost leaf is always the surviving side of a merge.
        debug_assert_ne!(right_handle, self.first_leaf);

        let right = self.nodes.take(right_handle).into_leaf();
        let right_id = right.id();
        let left = self.nodes.get_mut(left_handle).as_leaf_mut();
        left.merge_with_right(right);
        trace!("merged leaf {right_id} into {}", left.id());

        self.remove_from_parent(parent_handle, separator_idx, right_handle);
    }

    /// Removes `keys[separator_idx]` and the absorbed child after it, then repairs the parent.
    fn remove_from_parent(&mut self, parent_handle: Handle, separator_idx: usize, absorbed: Handle) {
        let parent = self.nodes.get_mut(parent_handle).as_internal_mut();
        let (_separator, removed) = parent.remove_child(separator_idx);
        debug_assert_eq!(removed, absorbed);

        if parent_handle == self.root {
            if parent.key_count() == 0 {
                self.collapse_root();
            }
            return;
        }

        if parent.is_underfull(self.order) {
            self.rebalance_internal(parent_handle);
        }
    }

    /// Replaces an internal root that has no keys left with its only child.
    fn collapse_root(&mut self) {
        let old_root = self.nodes.take(self.root).into_internal();
        let new_root = old_root.child(0);
        self.nodes.get_mut(new_root).set_parent(None);
        self.root = new_root;
        debug!(
            "root {} collapsed; new root {}, height {}",
            old_root.id(),
            self.nodes.get(new_root).id(),
            self.height()
        );
    }

    /// Restores minimum occupancy of a non-root internal node by borrowing or merging.
    fn rebalance_internal(&mut self, node_handle: Handle) {
        let (parent_handle, child_idx) = self.parent_slot(node_handle);
        let parent = self.nodes.get(parent_handle).as_internal();
        let left = (child_idx > 0).then(|| parent.child(child_idx - 1));
        let right = (child_idx + 1 < parent.child_count()).then(|| parent.child(child_idx + 1));

        if let Some(left) = left
            && self.nodes.get(left).as_internal().can_lend(self.order)
        {
            self.borrow_from_left_internal(node_handle, left, parent_handle, child_idx);
            return;
        }

        if let Some(right) = right
            && self.nodes.get(right).as_internal().can_lend(self.order)
        {
            self.borrow_from_right_internal(node_handle, right, parent_handle, child_idx);
            return;
        }

        match (left, right) {
            (Some(left), _) => self.merge_internals(left, node_handle, parent_handle, child_idx - 1),
            (None, Some(right)) => self.merge_internals(node_handle, right, parent_handle, child_idx),
            (None, None) => panic!("internal node under {} has no siblings", self.nodes.get(parent_handle).id()),
        }
    }

    /// Rotates the left sibling's last child through the parent separator.
    fn borrow_from_left_internal(&mut self, node_handle: Handle, left_handle: Handle, parent_handle: Handle, child_idx: usize) {
        let parent_sep = self.nodes.get(parent_handle).as_internal().key(child_idx - 1).clone();

        let left = self.nodes.get_mut(left_handle).as_internal_mut();
        let (left_key, moved_child) = left.pop_child().expect("lending node has keys");

        let node = self.nodes.get_mut(node_handle).as_internal_mut();
        node.push_child_front(parent_sep, moved_child);
        trace!("internal {} borrowed from left sibling", node.id());

        self.nodes.get_mut(moved_child).set_parent(Some(node_handle));
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx - 1, left_key);
    }

    /// Rotates the right sibling's first child through the parent separator.
    fn borrow_from_right_internal(&mut self, node_handle: Handle, right_handle: Handle, parent_handle: Handle, child_idx: usize) {
        let parent_sep = self.nodes.get(parent_handle).as_internal().key(child_idx).clone();

        let right = self.nodes.get_mut(right_handle).as_internal_mut();
        let (right_key, moved_child) = right.pop_child_front().expect("lending node has keys");

        let node = self.nodes.get_mut(node_handle).as_internal_mut();
        node.push_child(parent_sep, moved_child);
        trace!("internal {} borrowed from right sibling", node.id());

        self.nodes.get_mut(moved_child).set_parent(Some(node_handle));
        self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_idx, right_key);
    }

    /// Folds `right_handle` into its left sibling, pulling their separator down.
    fn merge_internals(&mut self, left_handle: Handle, right_handle: Handle, parent_handle: Handle, separator_idx: usize) {
        let separator = self.nodes.get(parent_handle).as_internal().key(separator_idx).clone();

        let right = self.nodes.take(right_handle).into_internal();
        let right_id = right.id();
        let left = self.nodes.get_mut(left_handle).as_internal_mut();
        left.merge_with_right(separator, right);
        trace!("merged internal {right_id} into {}", left.id());

        self.adopt_children(left_handle);
        self.remove_from_parent(parent_handle, separator_idx, right_handle);
    }
}

impl<K: Clone, V: Clone> RawBPTree<K, V> {
    /// Breadth-first export of every node reachable from the root.
    pub(crate) fn snapshot(&self) -> TreeSnapshot<K, V> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut links = Vec::new();
        let mut queue = VecDeque::from([self.root]);

        while let Some(handle) = queue.pop_front() {
            let node = self.nodes.get(handle);
            let id = node.id();
            let mut snapshot = NodeSnapshot {
                id,
                keys: node.keys().to_vec(),
                is_leaf: false,
                values: None,
            };

            match node {
                Node::Internal(internal) => {
                    for &child in internal.children() {
                        links.push(LinkSnapshot {
                            source: id,
                            target: self.nodes.get(child).id(),
                            kind: LinkKind::ParentChild,
                        });
                        queue.push_back(child);
                    }
                }
                Node::Leaf(leaf) => {
                    snapshot.is_leaf = true;
                    snapshot.values = Some(leaf.value_sets().iter().map(|set| set.as_slice().to_vec()).collect());
                    if let Some(next) = leaf.next() {
                        links.push(LinkSnapshot {
                            source: id,
                            target: self.nodes.get(next).id(),
                            kind: LinkKind::LeafLink,
                        });
                    }
                }
            }
            nodes.push(snapshot);
        }

        TreeSnapshot { nodes, links }
    }
}

impl<K: Clone, V: Clone> Clone for RawBPTree<K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            root: self.root,
            first_leaf: self.first_leaf,
            order: self.order,
            next_id: self.next_id,
            key_count: self.key_count,
            len: self.len,
        }
    }
}
