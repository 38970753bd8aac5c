//! An in-memory, ordered, multi-valued index built on a B+tree.
//!
//! [`BPTreeMultimap`] maps each key to a non-empty set of values kept in
//! ascending order. It supports insertion, deletion of individual values and
//! exact-key lookup, all in O(log n):
//!
//! ```
//! use mv_bptree::BPTreeMultimap;
//!
//! let mut tree = BPTreeMultimap::with_order(3).unwrap();
//! tree.insert(1, 10);
//! tree.insert(2, 20);
//! tree.insert(3, 30);
//! tree.insert(2, 5);
//!
//! assert_eq!(tree.find(&2), &[5, 20]);
//! assert_eq!(tree.height(), 2);
//!
//! tree.delete(&2, &20);
//! tree.delete(&2, &5);
//! assert!(tree.find(&2).is_empty());
//! assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 3]);
//! ```
//!
//! # Features
//!
//! - **Multi-valued** - each key holds a sorted, duplicate-free set of values
//! - **Self-balancing** - nodes split on overflow and borrow or merge on underflow
//! - **Leaf chain** - leaves are linked in key order for full ordered traversal
//! - **Inspectable** - [`snapshot`](BPTreeMultimap::snapshot) exports the node
//!   structure as serializable data for renderers
//! - **Operation feed** - the [`command`] module parses and applies
//!   `insert`/`delete`/`find` text commands
//!
//! # Implementation
//!
//! Nodes live in an arena and refer to each other by index, including each
//! node's parent and each leaf's successor. Structural changes rewire those
//! indices in the same `&mut` operation, so the parent links and the leaf chain
//! never disagree with the tree once a call returns.

#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod raw;

mod error;
mod order;

pub mod command;
pub mod multimap;
pub mod snapshot;

pub use command::{Command, CommandOutput, FindResult};
pub use error::{Error, Result};
pub use multimap::BPTreeMultimap;
pub use order::Order;
pub use snapshot::{LinkKind, LinkSnapshot, NodeId, NodeSnapshot, TreeSnapshot};
