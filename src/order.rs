use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fan-out of a [`BPTreeMultimap`](crate::BPTreeMultimap).
///
/// A node splits as soon as it holds `order` keys, so every node holds at most
/// `order - 1` keys once an operation returns. Orders below [`Order::MIN`]
/// leave no room to split or merge and are rejected.
///
/// Minimum occupancy for non-root nodes follows the split arithmetic:
///
/// - leaves keep at least `floor(order / 2)` keys,
/// - internal nodes keep at least `ceil(order / 2) - 1` keys.
///
/// # Examples
///
/// ```
/// use mv_bptree::Order;
///
/// let order = Order::new(5).unwrap();
/// assert_eq!(order.max_keys(), 4);
/// assert_eq!(order.min_leaf_keys(), 2);
/// assert_eq!(order.min_internal_keys(), 2);
///
/// assert!(Order::new(2).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Order(usize);

impl Order {
    /// Smallest order for which splitting and merging are well defined.
    pub const MIN: usize = 3;

    /// Order used by [`BPTreeMultimap::new`](crate::BPTreeMultimap::new).
    pub const DEFAULT: Order = Order(4);

    /// Validates `order`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order < Order::MIN`.
    pub fn new(order: usize) -> Result<Self> {
        if order < Self::MIN {
            return Err(Error::InvalidOrder { order, min: Self::MIN });
        }
        Ok(Order(order))
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Maximum number of keys any node holds between operations.
    #[must_use]
    pub const fn max_keys(self) -> usize {
        self.0 - 1
    }

    /// Minimum number of keys in a non-root leaf.
    #[must_use]
    pub const fn min_leaf_keys(self) -> usize {
        self.0 / 2
    }

    /// Minimum number of keys in a non-root internal node.
    #[must_use]
    pub const fn min_internal_keys(self) -> usize {
        self.0.div_ceil(2) - 1
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Order {
    type Error = Error;

    fn try_from(order: usize) -> Result<Self> {
        Order::new(order)
    }
}

impl From<Order> for usize {
    fn from(order: Order) -> usize {
        order.0
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
