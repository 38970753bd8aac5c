use std::collections::{BTreeMap, BTreeSet};

use mv_bptree::{BPTreeMultimap, NodeId, Order, TreeSnapshot};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 4_000;

/// Narrow key range so keys collect several values and get deleted often.
fn key_strategy() -> impl Strategy<Value = i64> {
    -300i64..300i64
}

fn value_strategy() -> impl Strategy<Value = i64> {
    0i64..8i64
}

fn order_strategy() -> impl Strategy<Value = usize> {
    3usize..12
}

type Model = BTreeMap<i64, BTreeSet<i64>>;

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum TreeOp {
    Insert(i64, i64),
    Delete(i64, i64),
    Find(i64),
    Contains(i64, i64),
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        5 => (key_strategy(), value_strategy()).prop_map(|(k, v)| TreeOp::Insert(k, v)),
        4 => (key_strategy(), value_strategy()).prop_map(|(k, v)| TreeOp::Delete(k, v)),
        2 => key_strategy().prop_map(TreeOp::Find),
        1 => (key_strategy(), value_strategy()).prop_map(|(k, v)| TreeOp::Contains(k, v)),
    ]
}

fn model_insert(model: &mut Model, key: i64, value: i64) -> bool {
    model.entry(key).or_default().insert(value)
}

fn model_delete(model: &mut Model, key: i64, value: i64) -> bool {
    let Some(values) = model.get_mut(&key) else {
        return false;
    };
    let removed = values.remove(&value);
    if values.is_empty() {
        model.remove(&key);
    }
    removed
}

fn model_find(model: &Model, key: i64) -> Vec<i64> {
    model.get(&key).map(|values| values.iter().copied().collect()).unwrap_or_default()
}

// ─── Structural checks through the public snapshot ──────────────────────────

/// Checks balance, occupancy, separator placement and the leaf chain using
/// only what a renderer would see.
fn assert_well_formed(snapshot: &TreeSnapshot<i64, i64>, order: Order) {
    let root = snapshot.nodes.first().expect("snapshot always has a root");
    let mut leaf_depths = BTreeSet::new();
    let mut leaves_in_order = Vec::new();
    check_subtree(snapshot, root.id, order, true, 0, None, None, &mut leaf_depths, &mut leaves_in_order);
    assert!(leaf_depths.len() == 1, "leaves at different depths: {leaf_depths:?}");

    let mut chain = Vec::new();
    let mut cursor = leaves_in_order.first().copied();
    while let Some(id) = cursor {
        chain.push(id);
        cursor = snapshot.next_leaf(id);
    }
    assert_eq!(chain, leaves_in_order, "leaf chain disagrees with in-order traversal");
}

#[allow(clippy::too_many_arguments)]
fn check_subtree(
    snapshot: &TreeSnapshot<i64, i64>,
    id: NodeId,
    order: Order,
    is_root: bool,
    depth: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    leaf_depths: &mut BTreeSet<usize>,
    leaves: &mut Vec<NodeId>,
) {
    let node = snapshot.node(id).expect("linked node is listed");
    assert!(node.keys.windows(2).all(|w| w[0] < w[1]), "unsorted keys in {id}");
    assert!(node.keys.len() <= order.max_keys(), "{id} overfull");
    if let Some(lower) = lower {
        assert!(node.keys.iter().all(|k| *k >= lower), "{id} below its separator");
    }
    if let Some(upper) = upper {
        assert!(node.keys.iter().all(|k| *k < upper), "{id} above its separator");
    }

    if node.is_leaf {
        if !is_root {
            assert!(node.keys.len() >= order.min_leaf_keys(), "{id} underfull leaf");
        }
        let values = node.values.as_ref().expect("leaves carry values");
        assert_eq!(values.len(), node.keys.len());
        for set in values {
            assert!(!set.is_empty(), "empty value set in {id}");
            assert!(set.windows(2).all(|w| w[0] < w[1]), "unsorted values in {id}");
        }
        leaf_depths.insert(depth);
        leaves.push(id);
        return;
    }

    assert!(node.values.is_none());
    if is_root {
        assert!(!node.keys.is_empty(), "internal root without keys");
    } else {
        assert!(node.keys.len() >= order.min_internal_keys(), "{id} underfull internal node");
    }
    let children: Vec<NodeId> = snapshot.children(id).collect();
    assert_eq!(children.len(), node.keys.len() + 1, "{id} child count");
    for (i, child) in children.into_iter().enumerate() {
        let lo = if i == 0 { lower } else { Some(node.keys[i - 1]) };
        let hi = node.keys.get(i).copied().or(upper);
        check_subtree(snapshot, child, order, false, depth + 1, lo, hi, leaf_depths, leaves);
    }
}

fn contents(tree: &BPTreeMultimap<i64, i64>) -> Vec<(i64, Vec<i64>)> {
    tree.iter().map(|(k, vs)| (*k, vs.to_vec())).collect()
}

fn model_contents(model: &Model) -> Vec<(i64, Vec<i64>)> {
    model.iter().map(|(k, vs)| (*k, vs.iter().copied().collect())).collect()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn order_three_walkthrough() {
    let mut tree = BPTreeMultimap::with_order(3).unwrap();
    assert!(tree.insert(1, 10));
    assert!(tree.insert(2, 20));
    assert!(tree.insert(3, 30));

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.nodes.len(), 3);
    assert_eq!(snapshot.nodes[0].keys, [2]);
    assert!(!snapshot.nodes[0].is_leaf);
    assert_eq!(snapshot.nodes[1].keys, [1]);
    assert_eq!(snapshot.nodes[2].keys, [2, 3]);

    assert!(tree.insert(2, 5));
    assert_eq!(tree.find(&2), &[5, 20]);

    assert!(tree.delete(&2, &20));
    assert_eq!(tree.find(&2), &[5]);
    assert!(tree.delete(&2, &5));
    assert!(tree.find(&2).is_empty());
    assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 3]);
    assert_well_formed(&tree.snapshot(), tree.order());
}

#[test]
fn absent_deletes_leave_the_tree_alone() {
    let mut tree: BPTreeMultimap<i64, i64> = (0..50).map(|k| (k, k * 2)).collect();
    let before = tree.snapshot();

    assert!(!tree.delete(&7, &0));
    assert!(!tree.delete(&500, &1));
    assert_eq!(tree.snapshot(), before);
}

#[test]
fn duplicate_inserts_are_ignored() {
    let mut tree = BPTreeMultimap::new();
    assert!(tree.insert("k", 1));
    assert!(!tree.insert("k", 1));
    assert!(tree.insert("k", 0));
    assert_eq!(tree.find(&"k"), &[0, 1]);
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.key_count(), 1);
}

#[test]
fn draining_every_pair_leaves_an_empty_root_leaf() {
    let mut tree = BPTreeMultimap::with_order(4).unwrap();
    for k in 0..200 {
        tree.insert(k, k % 3);
        tree.insert(k, 10);
    }
    assert!(tree.height() > 2);

    for k in (0..200).rev() {
        assert!(tree.delete(&k, &10));
        assert!(tree.delete(&k, &(k % 3)));
        assert_well_formed(&tree.snapshot(), tree.order());
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    let snapshot = tree.snapshot();
    assert_eq!(snapshot.nodes.len(), 1);
    assert!(snapshot.nodes[0].is_leaf);
    assert!(snapshot.nodes[0].keys.is_empty());
    assert!(snapshot.links.is_empty());
}

#[test]
fn string_keys_order_lexicographically() {
    let tree: BPTreeMultimap<String, u32> = ["pear", "apple", "fig", "apple", "kiwi"]
        .into_iter()
        .enumerate()
        .map(|(i, k)| (k.to_owned(), u32::try_from(i).unwrap()))
        .collect();

    assert_eq!(tree.keys().map(String::as_str).collect::<Vec<_>>(), ["apple", "fig", "kiwi", "pear"]);
    assert_eq!(tree.find("apple"), &[1, 3]);
    assert_eq!(tree.first_key().map(String::as_str), Some("apple"));
    assert_eq!(tree.last_key().map(String::as_str), Some("pear"));
}

#[test]
fn repeated_value_under_one_key() {
    let mut tree = BPTreeMultimap::new();
    tree.insert(5, 1);
    tree.insert(5, 2);
    tree.insert(5, 1);
    assert_eq!(tree.find(&5), &[1, 2]);
}

static_assertions::assert_impl_all!(BPTreeMultimap<i64, String>: Send, Sync, Clone, Default);

#[test]
fn rejects_small_orders() {
    assert!(BPTreeMultimap::<i64, i64>::with_order(0).is_err());
    assert!(BPTreeMultimap::<i64, i64>::with_order(2).is_err());
    assert!(BPTreeMultimap::<i64, i64>::with_order(3).is_ok());
}

// ─── Randomized comparison against BTreeMap<_, BTreeSet<_>> ─────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Replays a random operation sequence on the tree and on a
    /// `BTreeMap<K, BTreeSet<V>>` model, asserting identical answers.
    #[test]
    fn ops_match_model(order in order_strategy(), ops in proptest::collection::vec(tree_op_strategy(), TEST_SIZE)) {
        let mut tree = BPTreeMultimap::with_order(order).unwrap();
        let mut model = Model::new();

        for op in &ops {
            match *op {
                TreeOp::Insert(k, v) => {
                    prop_assert_eq!(tree.insert(k, v), model_insert(&mut model, k, v), "insert({}, {})", k, v);
                }
                TreeOp::Delete(k, v) => {
                    prop_assert_eq!(tree.delete(&k, &v), model_delete(&mut model, k, v), "delete({}, {})", k, v);
                }
                TreeOp::Find(k) => {
                    prop_assert_eq!(tree.find(&k).to_vec(), model_find(&model, k), "find({})", k);
                }
                TreeOp::Contains(k, v) => {
                    let expected = model.get(&k).is_some_and(|values| values.contains(&v));
                    prop_assert_eq!(tree.contains(&k, &v), expected, "contains({}, {})", k, v);
                }
            }
        }

        prop_assert_eq!(tree.key_count(), model.len());
        prop_assert_eq!(tree.len(), model.values().map(BTreeSet::len).sum::<usize>());
        prop_assert_eq!(contents(&tree), model_contents(&model));
        assert_well_formed(&tree.snapshot(), tree.order());
    }

    /// The structure stays balanced after every single mutation.
    #[test]
    fn every_step_is_well_formed(order in order_strategy(), ops in proptest::collection::vec(tree_op_strategy(), 400)) {
        let mut tree = BPTreeMultimap::with_order(order).unwrap();
        for op in ops {
            match op {
                TreeOp::Insert(k, v) => {
                    tree.insert(k, v);
                }
                TreeOp::Delete(k, v) => {
                    tree.delete(&k, &v);
                }
                TreeOp::Find(_) | TreeOp::Contains(..) => continue,
            }
            assert_well_formed(&tree.snapshot(), tree.order());
        }
    }

    /// Inserting then deleting a fresh pair restores the same contents.
    #[test]
    fn insert_then_delete_restores_contents(
        entries in proptest::collection::vec((key_strategy(), value_strategy()), 0..500),
        key in key_strategy(),
        value in 100i64..200,
    ) {
        let mut tree: BPTreeMultimap<i64, i64> = entries.into_iter().collect();
        let before = contents(&tree);

        prop_assert!(tree.insert(key, value));
        prop_assert!(tree.find(&key).contains(&value));
        prop_assert!(tree.delete(&key, &value));
        prop_assert_eq!(contents(&tree), before);
    }

    #[test]
    fn iteration_is_sorted_and_sized(entries in proptest::collection::vec((key_strategy(), value_strategy()), 0..2_000)) {
        let tree: BPTreeMultimap<i64, i64> = entries.iter().copied().collect();
        let mut model = Model::new();
        for (k, v) in entries {
            model_insert(&mut model, k, v);
        }

        let iter = tree.iter();
        prop_assert_eq!(iter.len(), model.len());
        prop_assert_eq!(contents(&tree), model_contents(&model));
        prop_assert_eq!(tree.first_key(), model.keys().next());
        prop_assert_eq!(tree.last_key(), model.keys().next_back());
    }

    #[test]
    fn clone_is_independent(entries in proptest::collection::vec((key_strategy(), value_strategy()), 1..1_000)) {
        let original: BPTreeMultimap<i64, i64> = entries.iter().copied().collect();
        let mut copy = original.clone();
        prop_assert_eq!(copy.snapshot(), original.snapshot());

        let (k, v) = entries[0];
        copy.delete(&k, &v);
        prop_assert!(original.contains(&k, &v));
        prop_assert!(!copy.contains(&k, &v));
    }

    #[test]
    fn clear_empties_tree(entries in proptest::collection::vec((key_strategy(), value_strategy()), 0..1_000)) {
        let mut tree: BPTreeMultimap<i64, i64> = entries.into_iter().collect();
        tree.clear();
        prop_assert!(tree.is_empty());
        prop_assert_eq!(tree.height(), 1);
        prop_assert_eq!(tree.iter().count(), 0);
        tree.insert(1, 1);
        prop_assert_eq!(tree.find(&1), &[1]);
    }
}
