use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Checks every structural invariant over the whole tree: reachability,
/// parent/child link agreement, strictly decreasing critical bits, branch
/// polarity, key distinctness, and the inner/outer count relation.
fn validate_tree<K: IntKey + Debug, V>(t: &CritBitTree<K, V>) {
    let Some(root) = t.root else {
        assert!(
            t.inner.is_empty() && t.outer.is_empty(),
            "empty tree must have empty arenas"
        );
        return;
    };

    if t.outer.len() == 1 {
        assert!(t.inner.is_empty(), "a singleton holds no inner nodes");
    } else {
        assert_eq!(
            t.inner.len() + 1,
            t.outer.len(),
            "inner count must be one less than outer count"
        );
    }

    let mut keys = Vec::new();
    check_subtree(t, root, None, &mut keys);
    assert_eq!(
        keys.len(),
        t.outer.len(),
        "every outer node must be reachable from the root"
    );

    let mut sorted = keys.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), keys.len(), "keys must be pairwise distinct");
}

fn check_subtree<K: IntKey + Debug, V>(
    t: &CritBitTree<K, V>,
    node: NodeRef,
    parent: Option<u32>,
    keys: &mut Vec<K>,
) {
    let recorded = match node {
        NodeRef::Inner(i) => t.inner[i as usize].parent,
        NodeRef::Outer(i) => t.outer[i as usize].parent,
    };
    assert_eq!(recorded, parent, "parent link mismatch at {node:?}");

    match node {
        NodeRef::Outer(i) => keys.push(t.outer[i as usize].key),
        NodeRef::Inner(i) => {
            let n = &t.inner[i as usize];
            if let Some(p) = parent {
                assert!(
                    n.crit_bit < t.inner[p as usize].crit_bit,
                    "critical bits must strictly decrease toward the leaves"
                );
            }

            let mut left_keys = Vec::new();
            let mut right_keys = Vec::new();
            check_subtree(t, n.left, Some(i), &mut left_keys);
            check_subtree(t, n.right, Some(i), &mut right_keys);
            for &k in &left_keys {
                assert!(
                    !k.is_set(n.crit_bit),
                    "left keys must be unset at the critical bit"
                );
            }
            for &k in &right_keys {
                assert!(
                    k.is_set(n.crit_bit),
                    "right keys must be set at the critical bit"
                );
            }
            keys.extend_from_slice(&left_keys);
            keys.extend_from_slice(&right_keys);
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u64, u64),
    Remove(u64),
    Get(u64),
    MinMax,
}

fn key_strategy() -> impl Strategy<Value = u64> + Clone {
    // Mix narrow and full-range keys so collisions, deep splices, and
    // high-bit branches all occur.
    prop_oneof![
        3 => 0u64..64,
        2 => 0u64..10_000,
        1 => any::<u64>(),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        20 => key.clone().prop_map(Op::Get),
        5 => Just(Op::MinMax),
    ];
    prop::collection::vec(op, 0..=2000)
}

fn absent_key_error(m: &BTreeMap<u64, u64>) -> TreeError {
    if m.is_empty() {
        TreeError::EmptyTree
    } else {
        TreeError::KeyNotFound
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t: CritBitTree<u64, u64> = CritBitTree::new();
        let mut m: BTreeMap<u64, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    if m.contains_key(&key) {
                        prop_assert_eq!(t.insert(key, value), Err(TreeError::DuplicateKey));
                    } else {
                        prop_assert_eq!(t.insert(key, value), Ok(()));
                        m.insert(key, value);
                    }
                }
                Op::Remove(key) => {
                    match m.remove(&key) {
                        Some(v) => prop_assert_eq!(t.remove(key), Ok(v)),
                        None => prop_assert_eq!(t.remove(key), Err(absent_key_error(&m))),
                    }
                }
                Op::Get(key) => {
                    match m.get(&key) {
                        Some(v) => {
                            prop_assert_eq!(t.get(key), Ok(v));
                            prop_assert!(t.contains_key(key));
                        }
                        None => {
                            prop_assert_eq!(t.get(key), Err(absent_key_error(&m)));
                            prop_assert!(!t.contains_key(key));
                        }
                    }
                }
                Op::MinMax => {
                    match (m.keys().next(), m.keys().next_back()) {
                        (Some(&lo), Some(&hi)) => {
                            prop_assert_eq!(t.min_key(), Ok(lo));
                            prop_assert_eq!(t.max_key(), Ok(hi));
                        }
                        _ => {
                            prop_assert_eq!(t.min_key(), Err(TreeError::EmptyTree));
                            prop_assert_eq!(t.max_key(), Err(TreeError::EmptyTree));
                        }
                    }
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tree(&t);
        let got: Vec<(u64, u64)> = t.iter().map(|(k, v)| (k, *v)).collect();
        let expected: Vec<(u64, u64)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_cursor_traversal(keys in prop::collection::btree_set(any::<u64>(), 1..200usize)) {
        let mut t: CritBitTree<u64, u64> = CritBitTree::new();
        for &k in &keys {
            t.insert(k, !k).unwrap();
        }
        validate_tree(&t);

        let expected: Vec<u64> = keys.iter().copied().collect();

        let mut ascending = Vec::with_capacity(expected.len());
        let mut cur = t.traverse_init(Direction::Successor);
        loop {
            prop_assert_eq!(*t.cursor_value(cur), !t.cursor_key(cur));
            ascending.push(t.cursor_key(cur));
            if ascending.len() == expected.len() {
                break;
            }
            cur = t.traverse_step(cur, Direction::Successor);
        }
        prop_assert_eq!(&ascending, &expected);

        let mut descending = Vec::with_capacity(expected.len());
        let mut cur = t.traverse_init(Direction::Predecessor);
        loop {
            descending.push(t.cursor_key(cur));
            if descending.len() == expected.len() {
                break;
            }
            cur = t.traverse_step(cur, Direction::Predecessor);
        }
        descending.reverse();
        prop_assert_eq!(&descending, &expected);
    }

    #[test]
    fn prop_traverse_pop_drains_in_order(
        keys in prop::collection::btree_set(any::<u64>(), 1..200usize),
        dir in prop_oneof![Just(Direction::Successor), Just(Direction::Predecessor)],
    ) {
        let mut t: CritBitTree<u64, u64> = CritBitTree::new();
        for &k in &keys {
            t.insert(k, k ^ 0xABCD).unwrap();
        }

        let mut drained = Vec::with_capacity(keys.len());
        let mut cur = t.traverse_init(dir);
        while t.len() > 1 {
            let key = t.cursor_key(cur);
            let (value, next) = t.traverse_pop(cur, dir);
            prop_assert_eq!(value, key ^ 0xABCD);
            drained.push(key);
            cur = next;
            validate_tree(&t);
        }
        drained.push(t.cursor_key(cur));
        t.traverse_end_pop(cur);
        validate_tree(&t);

        prop_assert!(t.is_empty());
        let mut expected: Vec<u64> = keys.iter().copied().collect();
        if dir == Direction::Predecessor {
            expected.reverse();
        }
        prop_assert_eq!(drained, expected);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(&[T])) {
    // Heap's algorithm.
    fn rec<T>(items: &mut [T], k: usize, f: &mut impl FnMut(&[T])) {
        if k <= 1 {
            f(items);
            return;
        }
        for i in 0..k - 1 {
            rec(items, k - 1, f);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
        rec(items, k - 1, f);
    }

    let mut items = items.to_vec();
    let k = items.len();
    rec(&mut items, k, &mut f);
}

#[test]
fn exhaustive_insert_order_small_set() {
    // Bit patterns forcing splices below a leaf's parent, above it, and at
    // the root.
    let keys: [u64; 6] = [0b000, 0b001, 0b011, 0b100, 0b110, 0b111];

    for_each_permutation(&keys, |perm| {
        let mut t: CritBitTree<u64, u64> = CritBitTree::new();
        let mut m: BTreeMap<u64, u64> = BTreeMap::new();

        for (i, &k) in perm.iter().enumerate() {
            let v = i as u64;
            assert_eq!(t.insert(k, v), Ok(()));
            m.insert(k, v);
        }

        validate_tree(&t);
        let got: Vec<(u64, u64)> = t.iter().map(|(k, v)| (k, *v)).collect();
        let expected: Vec<(u64, u64)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys: [u64; 6] = [0b000, 0b001, 0b011, 0b100, 0b110, 0b111];

    // Insert in a fixed order, then remove in all permutations.
    let mut base: CritBitTree<u64, u64> = CritBitTree::new();
    for (i, &k) in keys.iter().enumerate() {
        base.insert(k, i as u64).unwrap();
    }

    for_each_permutation(&keys, |perm| {
        let mut t = base.clone();
        for (n, &k) in perm.iter().enumerate() {
            let v = keys.iter().position(|&x| x == k).unwrap() as u64;
            assert_eq!(t.remove(k), Ok(v));
            assert_eq!(t.len(), keys.len() - n - 1);
            validate_tree(&t);
        }
        assert!(t.is_empty());
    });
}
