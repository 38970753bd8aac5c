//! The [`BPTreeMultimap`] collection and its iterators.

use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::error::Result;
use crate::order::Order;
use crate::raw::{Handle, RawBPTree};
use crate::snapshot::TreeSnapshot;

/// An ordered multi-valued index based on a [B+Tree].
///
/// Each key maps to a non-empty set of values kept in ascending order, with no
/// duplicates. Inserting a `(key, value)` pair that is already present does
/// nothing; removing the last value of a key removes the key.
///
/// All entries live in the leaves, which are chained in key order. Internal
/// nodes hold separator keys only. Nodes split when they reach
/// [`order`](Order) keys and borrow from or merge with a sibling when a
/// deletion leaves them below minimum occupancy, so every operation touches
/// `O(log n)` nodes.
///
/// Mutation takes `&mut self` and lookups take `&self`. To share a tree across
/// threads, wrap it in a `RwLock`.
///
/// It is a logic error for a key or value to be modified in such a way that
/// its ordering relative to any other key or value changes while it is in the
/// tree.
///
/// # Examples
///
/// ```
/// use mv_bptree::BPTreeMultimap;
///
/// let mut index = BPTreeMultimap::new();
/// index.insert("rust", 3);
/// index.insert("rust", 1);
/// index.insert("rust", 3); // already present
/// index.insert("zig", 7);
///
/// assert_eq!(index.find("rust"), &[1, 3]);
/// assert_eq!(index.len(), 3);
///
/// index.delete("zig", &7);
/// assert!(index.find("zig").is_empty());
/// assert_eq!(index.key_count(), 1);
/// ```
///
/// [B+Tree]: https://en.wikipedia.org/wiki/B%2B_tree
pub struct BPTreeMultimap<K, V> {
    raw: RawBPTree<K, V>,
}

impl<K, V> BPTreeMultimap<K, V> {
    /// Makes a new, empty tree with [`Order::DEFAULT`].
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::{BPTreeMultimap, Order};
    ///
    /// let mut tree = BPTreeMultimap::new();
    /// tree.insert(1, "a");
    /// assert_eq!(tree.order(), Order::DEFAULT);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Order::DEFAULT)
    }

    /// Makes a new, empty tree whose nodes split at `order` keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`](crate::Error::InvalidOrder) if `order < 3`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::BPTreeMultimap;
    ///
    /// let tree: BPTreeMultimap<u32, u32> = BPTreeMultimap::with_order(16).unwrap();
    /// assert_eq!(tree.order().get(), 16);
    ///
    /// assert!(BPTreeMultimap::<u32, u32>::with_order(2).is_err());
    /// ```
    pub fn with_order(order: usize) -> Result<Self> {
        Ok(Self::with_config(Order::new(order)?))
    }

    /// Makes a new, empty tree from an already validated [`Order`].
    #[must_use]
    pub fn with_config(order: Order) -> Self {
        BPTreeMultimap {
            raw: RawBPTree::new(order),
        }
    }

    #[must_use]
    pub fn order(&self) -> Order {
        self.raw.order()
    }

    /// Returns the number of `(key, value)` pairs.
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::BPTreeMultimap;
    ///
    /// let mut tree = BPTreeMultimap::new();
    /// tree.insert(1, 'a');
    /// tree.insert(1, 'b');
    /// assert_eq!(tree.len(), 2);
    /// assert_eq!(tree.key_count(), 1);
    /// ```
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns the number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.raw.key_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Number of levels from the root down to the leaves; 1 for a lone root leaf.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Number of nodes currently in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.raw.node_count()
    }

    /// Removes every entry. The order is kept.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Iterates over `(key, values)` in ascending key order by walking the leaf chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::BPTreeMultimap;
    ///
    /// let tree = BPTreeMultimap::from([(2, 'b'), (1, 'z'), (1, 'a')]);
    /// let entries: Vec<_> = tree.iter().collect();
    /// assert_eq!(entries, [(&1, &['a', 'z'][..]), (&2, &['b'][..])]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: &self.raw,
            leaf: Some(self.raw.first_leaf()),
            index: 0,
            remaining: self.raw.key_count(),
        }
    }

    /// Iterates over the distinct keys in ascending order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Smallest key, if any.
    #[must_use]
    pub fn first_key(&self) -> Option<&K> {
        self.raw.node(self.raw.first_leaf()).as_leaf().first_key()
    }

    /// Largest key, if any.
    #[must_use]
    pub fn last_key(&self) -> Option<&K> {
        self.raw.node(self.raw.last_leaf()).as_leaf().last_key()
    }
}

impl<K: Ord, V> BPTreeMultimap<K, V> {
    /// Returns the values stored under `key` in ascending order, or an empty
    /// slice if the key is absent.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::BPTreeMultimap;
    ///
    /// let mut tree = BPTreeMultimap::new();
    /// tree.insert(5, 2);
    /// tree.insert(5, 1);
    /// assert_eq!(tree.find(&5), &[1, 2]);
    /// assert!(tree.find(&6).is_empty());
    /// ```
    pub fn find<Q>(&self, key: &Q) -> &[V]
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.find(key)
    }

    /// Returns true if at least one value is stored under `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.search(key).is_some()
    }

    /// Returns true if the `(key, value)` pair is present.
    pub fn contains<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        V: Ord,
    {
        self.raw.contains(key, value)
    }
}

impl<K: Ord + Clone, V: Ord> BPTreeMultimap<K, V> {
    /// Adds `value` to the set stored under `key`.
    ///
    /// Returns `true` if the pair was not present before. Inserting an existing
    /// pair leaves the tree unchanged.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::BPTreeMultimap;
    ///
    /// let mut tree = BPTreeMultimap::new();
    /// assert!(tree.insert(5, 1));
    /// assert!(tree.insert(5, 2));
    /// assert!(!tree.insert(5, 1));
    /// assert_eq!(tree.find(&5), &[1, 2]);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.raw.insert(key, value)
    }

    /// Removes `value` from the set stored under `key`, removing `key` once its
    /// set is empty.
    ///
    /// Returns `true` if the pair was present. Deleting an absent pair is a no-op.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use mv_bptree::BPTreeMultimap;
    ///
    /// let mut tree = BPTreeMultimap::new();
    /// tree.insert(1, 10);
    /// assert!(tree.delete(&1, &10));
    /// assert!(!tree.delete(&1, &10));
    /// assert!(!tree.contains_key(&1));
    /// ```
    pub fn delete<Q>(&mut self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.delete(key, value)
    }
}

impl<K: Clone, V: Clone> BPTreeMultimap<K, V> {
    /// Captures the current shape of the tree for an external renderer.
    ///
    /// Nodes are listed breadth-first from the root; see [`TreeSnapshot`].
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot<K, V> {
        self.raw.snapshot()
    }
}

impl<K: Clone, V: Clone> Clone for BPTreeMultimap<K, V> {
    fn clone(&self) -> Self {
        BPTreeMultimap { raw: self.raw.clone() }
    }
}

impl<K, V> Default for BPTreeMultimap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPTreeMultimap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V: Ord> Extend<(K, V)> for BPTreeMultimap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K: Ord + Clone, V: Ord> FromIterator<(K, V)> for BPTreeMultimap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = BPTreeMultimap::new();
        tree.extend(iter);
        tree
    }
}

impl<K: Ord + Clone, V: Ord, const N: usize> From<[(K, V); N]> for BPTreeMultimap<K, V> {
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, K, V> IntoIterator for &'a BPTreeMultimap<K, V> {
    type Item = (&'a K, &'a [V]);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// An iterator over the entries of a [`BPTreeMultimap`], in key order.
///
/// This `struct` is created by [`BPTreeMultimap::iter`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    tree: &'a RawBPTree<K, V>,
    leaf: Option<Handle>,
    index: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a [V]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let tree = self.tree;
        let leaf = tree.node(self.leaf?).as_leaf();
        let item = (leaf.key(self.index), leaf.values(self.index).as_slice());

        self.remaining -= 1;
        self.index += 1;

        if self.index >= leaf.key_count() {
            self.leaf = leaf.next();
            self.index = 0;
        }

        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter { ..*self }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// An iterator over the keys of a [`BPTreeMultimap`], in ascending order.
///
/// This `struct` is created by [`BPTreeMultimap::keys`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

impl<K, V> Clone for Keys<'_, K, V> {
    fn clone(&self) -> Self {
        Keys {
            inner: self.inner.clone(),
        }
    }
}
