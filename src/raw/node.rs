use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::order::Order;
use crate::snapshot::NodeId;

/// Inline capacity of a [`ValueSet`]; most keys carry only a handful of values.
const INLINE_VALUES: usize = 4;

pub(crate) enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

// B+Tree: internal nodes hold separator keys and child handles.
// Subtree children[i] covers [keys[i - 1], keys[i]).
pub(crate) struct InternalNode<K> {
    id: NodeId,
    parent: Option<Handle>,
    keys: Vec<K>,
    children: Vec<Handle>,
}

// B+Tree: leaves hold every key, each with its set of values.
pub(crate) struct LeafNode<K, V> {
    id: NodeId,
    parent: Option<Handle>,
    next: Option<Handle>,
    keys: Vec<K>,
    values: Vec<ValueSet<V>>,
}

/// Sorted, duplicate-free values stored under one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ValueSet<V>(SmallVec<[V; INLINE_VALUES]>);

/// Result of searching for a key in a leaf.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

impl<K, V> Node<K, V> {
    pub(crate) fn id(&self) -> NodeId {
        match self {
            Node::Internal(internal) => internal.id,
            Node::Leaf(leaf) => leaf.id,
        }
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        match self {
            Node::Internal(internal) => internal.parent,
            Node::Leaf(leaf) => leaf.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Handle>) {
        match self {
            Node::Internal(internal) => internal.parent = parent,
            Node::Leaf(leaf) => leaf.parent = parent,
        }
    }

    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn into_leaf(self) -> LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    pub(crate) fn into_internal(self) -> InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Internal(internal) => internal.keys(),
            Node::Leaf(leaf) => leaf.keys(),
        }
    }
}

impl<K> InternalNode<K> {
    /// Creates a root with a single separator between two children.
    pub(crate) fn new_root(id: NodeId, left: Handle, separator: K, right: Handle) -> Self {
        Self {
            id,
            parent: None,
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn is_overfull(&self, order: Order) -> bool {
        self.keys.len() >= order.get()
    }

    pub(crate) fn is_underfull(&self, order: Order) -> bool {
        self.keys.len() < order.min_internal_keys()
    }

    /// Returns true if this node can give a key to a sibling and stay at minimum.
    pub(crate) fn can_lend(&self, order: Order) -> bool {
        self.keys.len() > order.min_internal_keys()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Index of the child to descend into: the number of separators `<= key`.
    /// Equal keys go right, matching the first-key-of-right-leaf separators.
    #[inline]
    pub(crate) fn search_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() <= key)
    }

    /// Position of `child` among this node's children.
    pub(crate) fn child_index(&self, child: Handle) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Inserts `key` at `index` and `child` right after `children[index]`.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes `keys[index]` and `children[index + 1]`.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Prepends `child` as the new first child, with `key` separating it from the old one.
    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Pops the last key and the child to its right.
    pub(crate) fn pop_child(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop().expect("internal node has one more child than keys");
        Some((key, child))
    }

    /// Pops the first child and the key to its right.
    pub(crate) fn pop_child_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Some((key, child))
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Splits around the middle key. Returns (`median_key`, `new_node`).
    ///
    /// The median moves up and is kept in neither half; the new node holds the
    /// keys and children to its right and shares this node's parent.
    pub(crate) fn split(&mut self, id: NodeId) -> (K, InternalNode<K>) {
        let mid = self.keys.len() / 2;

        let right = InternalNode {
            id,
            parent: self.parent,
            keys: self.keys.drain(mid + 1..).collect(),
            children: self.children.drain(mid + 1..).collect(),
        };
        let median = self.keys.pop().expect("split of an internal node with no keys");

        (median, right)
    }

    /// Merges with a right sibling, pulling the parent separator down between them.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            next: None,
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn is_overfull(&self, order: Order) -> bool {
        self.keys.len() >= order.get()
    }

    pub(crate) fn is_underfull(&self, order: Order) -> bool {
        self.keys.len() < order.min_leaf_keys()
    }

    /// Returns true if this leaf can give an entry to a sibling and stay at minimum.
    pub(crate) fn can_lend(&self, order: Order) -> bool {
        self.keys.len() > order.min_leaf_keys()
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    pub(crate) fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    pub(crate) fn last_key(&self) -> Option<&K> {
        self.keys.last()
    }

    #[inline]
    pub(crate) fn values(&self, index: usize) -> &ValueSet<V> {
        &self.values[index]
    }

    #[inline]
    pub(crate) fn values_mut(&mut self, index: usize) -> &mut ValueSet<V> {
        &mut self.values[index]
    }

    pub(crate) fn value_sets(&self) -> &[ValueSet<V>] {
        &self.values
    }

    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    pub(crate) fn insert(&mut self, index: usize, key: K, values: ValueSet<V>) {
        self.keys.insert(index, key);
        self.values.insert(index, values);
    }

    pub(crate) fn remove(&mut self, index: usize) -> (K, ValueSet<V>) {
        let key = self.keys.remove(index);
        let values = self.values.remove(index);
        (key, values)
    }

    pub(crate) fn push(&mut self, key: K, values: ValueSet<V>) {
        self.keys.push(key);
        self.values.push(values);
    }

    pub(crate) fn push_front(&mut self, key: K, values: ValueSet<V>) {
        self.keys.insert(0, key);
        self.values.insert(0, values);
    }

    pub(crate) fn pop(&mut self) -> Option<(K, ValueSet<V>)> {
        let key = self.keys.pop()?;
        let values = self.values.pop().expect("leaf keys and value sets are parallel");
        Some((key, values))
    }

    pub(crate) fn pop_front(&mut self) -> Option<(K, ValueSet<V>)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.values.remove(0)))
    }

    /// Moves the upper half of the entries into a new leaf.
    ///
    /// The lower `floor(count / 2)` entries stay here. The new leaf inherits
    /// this leaf's parent and `next`; the caller links this leaf to it once
    /// the new leaf has a handle.
    pub(crate) fn split(&mut self, id: NodeId) -> LeafNode<K, V> {
        let mid = self.keys.len() / 2;

        LeafNode {
            id,
            parent: self.parent,
            next: self.next,
            keys: self.keys.drain(mid..).collect(),
            values: self.values.drain(mid..).collect(),
        }
    }

    /// Absorbs a right sibling, taking over its `next` link.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K, V>) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }
}

impl<V: Ord> ValueSet<V> {
    pub(crate) fn single(value: V) -> Self {
        let mut values = SmallVec::new();
        values.push(value);
        Self(values)
    }

    /// Adds `value` at its sorted position. Returns false if it was already present.
    pub(crate) fn insert(&mut self, value: V) -> bool {
        match self.0.binary_search(&value) {
            Ok(_) => false,
            Err(idx) => {
                self.0.insert(idx, value);
                true
            }
        }
    }

    /// Returns false if `value` was not present.
    pub(crate) fn remove(&mut self, value: &V) -> bool {
        match self.0.binary_search(value) {
            Ok(idx) => {
                self.0.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn contains(&self, value: &V) -> bool {
        self.0.binary_search(value).is_ok()
    }
}

impl<V> ValueSet<V> {
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn as_slice(&self) -> &[V] {
        &self.0
    }
}

impl<K: Clone, V: Clone> Clone for Node<K, V> {
    fn clone(&self) -> Self {
        match self {
            Node::Internal(internal) => Node::Internal(InternalNode {
                id: internal.id,
                parent: internal.parent,
                keys: internal.keys.clone(),
                children: internal.children.clone(),
            }),
            Node::Leaf(leaf) => Node::Leaf(LeafNode {
                id: leaf.id,
                parent: leaf.parent,
                next: leaf.next,
                keys: leaf.keys.clone(),
                values: leaf.values.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(id: u64, keys: &[i32]) -> LeafNode<i32, i32> {
        let mut leaf = LeafNode::new(NodeId(id));
        for &k in keys {
            leaf.push(k, ValueSet::single(k * 10));
        }
        leaf
    }

    #[test]
    fn value_set_stays_sorted_and_unique() {
        let mut set = ValueSet::single(5);
        assert!(set.insert(1));
        assert!(set.insert(9));
        assert!(!set.insert(5));
        assert_eq!(set.as_slice(), &[1, 5, 9]);

        assert!(set.remove(&5));
        assert!(!set.remove(&5));
        assert!(!set.contains(&5));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn search_child_descends_right_on_ties() {
        let mut node = InternalNode::new_root(NodeId(0), Handle::from_index(0), 10, Handle::from_index(1));
        node.insert_child(1, 20, Handle::from_index(2));

        assert_eq!(node.search_child(&5), 0);
        assert_eq!(node.search_child(&10), 1);
        assert_eq!(node.search_child(&15), 1);
        assert_eq!(node.search_child(&20), 2);
        assert_eq!(node.search_child(&99), 2);
    }

    #[test]
    fn leaf_split_keeps_lower_half() {
        let mut leaf = leaf_with(0, &[1, 2, 3]);
        let right = leaf.split(NodeId(1));

        assert_eq!(leaf.keys(), &[1]);
        assert_eq!(right.keys(), &[2, 3]);
        assert_eq!(right.values(0).as_slice(), &[20]);
        assert_eq!(right.id(), NodeId(1));
    }

    #[test]
    fn internal_split_moves_median_up() {
        let h = Handle::from_index;
        let mut node = InternalNode::new_root(NodeId(0), h(0), 10, h(1));
        node.insert_child(1, 20, h(2));
        node.insert_child(2, 30, h(3));
        node.insert_child(3, 40, h(4));

        let (median, right) = node.split(NodeId(1));
        assert_eq!(median, 30);
        assert_eq!(node.keys(), &[10, 20]);
        assert_eq!(node.children(), &[h(0), h(1), h(2)]);
        assert_eq!(right.keys(), &[40]);
        assert_eq!(right.children(), &[h(3), h(4)]);
    }

    #[test]
    fn internal_merge_pulls_separator_down() {
        let h = Handle::from_index;
        let mut left = InternalNode::new_root(NodeId(0), h(0), 10, h(1));
        let right = InternalNode::new_root(NodeId(1), h(2), 30, h(3));
        left.merge_with_right(20, right);

        assert_eq!(left.keys(), &[10, 20, 30]);
        assert_eq!(left.child_count(), 4);
        assert_eq!(left.child_index(h(2)), Some(2));
    }

    #[test]
    fn occupancy_limits_follow_order() {
        let order = Order::new(4).unwrap();
        let leaf = leaf_with(0, &[1]);
        assert!(leaf.is_underfull(order));
        let leaf = leaf_with(0, &[1, 2, 3]);
        assert!(leaf.can_lend(order));
        assert!(!leaf.is_overfull(order));
        let leaf = leaf_with(0, &[1, 2, 3, 4]);
        assert!(leaf.is_overfull(order));
    }
}
