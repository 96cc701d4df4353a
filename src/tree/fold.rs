//! Chain folding: materializing the effective state of a delta chain.
//!
//! A chain is a log with the newest mutation at the head. Folding collects
//! the deltas head-to-base and replays them oldest-to-newest on top of the
//! cloned base page, which reproduces exactly the state the serialized
//! mutation history built. Both reads and consolidation use the same fold,
//! so a consolidated page is observationally identical to the chain it
//! replaces.
//!
//! A Split delta replays as "drop everything at or above the split key and
//! re-target the sibling link": deltas newer than the split only ever touch
//! the retained range (writers route by the split), and entries older than
//! it were copied into the sibling when the split materialized.
//!
//! Base sibling links and high keys are write-once, so a fold always pairs
//! keys with the link that described them at construction: a snapshot taken
//! before a Split delta landed folds the full key set with the pre-split
//! link, and one taken after folds the truncated set with the sibling. The
//! two states a reader can capture are both internally consistent.

use seize::LocalGuard;

use crate::comparator::KeyComparator;
use crate::node::{Node, NodeVariant, Pid};
use crate::tree::BwTree;

// ============================================================================
//  Fold results
// ============================================================================

/// Materialized view of a leaf chain.
pub(crate) struct FoldedLeaf<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) slots: Vec<Vec<V>>,

    /// Logical right sibling: the newest split's side pointer when the
    /// chain holds a Split delta, the base link otherwise.
    pub(crate) next: Pid,

    /// Exclusive upper bound of the folded key range.
    pub(crate) high_key: Option<K>,
}

/// Materialized view of an inner chain.
pub(crate) struct FoldedInner<K> {
    pub(crate) keys: Vec<K>,

    /// Always `keys.len() + 1`.
    pub(crate) children: Vec<Pid>,

    pub(crate) next: Pid,
    pub(crate) high_key: Option<K>,
}

// ============================================================================
//  Search helpers
// ============================================================================

/// First index whose key is `>= key`, and whether it is an exact match.
pub(crate) fn lower_bound<K, C: KeyComparator<K>>(keys: &[K], key: &K, cmp: &C) -> (usize, bool) {
    let mut lo: usize = 0;
    let mut hi: usize = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp.compare(&keys[mid], key) == std::cmp::Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    let found = lo < keys.len() && cmp.equal(&keys[lo], key);
    (lo, found)
}

/// First index whose key is strictly `> key` (routing bound: the child at
/// this index covers `key`).
pub(crate) fn upper_bound<K, C: KeyComparator<K>>(keys: &[K], key: &K, cmp: &C) -> usize {
    let mut lo: usize = 0;
    let mut hi: usize = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp.compare(&keys[mid], key) == std::cmp::Ordering::Greater {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

// ============================================================================
//  Folding
// ============================================================================

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
    C: KeyComparator<K>,
{
    /// Fold a leaf chain into its effective slot set.
    ///
    /// `head` must have been observed through the mapping table while the
    /// caller's guard was live; every node of the chain is then valid even
    /// if the chain has since been replaced and retired.
    pub(crate) fn fold_leaf(&self, head: *mut Node<K, V>, _guard: &LocalGuard<'_>) -> FoldedLeaf<K, V> {
        // Collect deltas newest-first.
        let mut deltas: Vec<&Node<K, V>> = Vec::new();
        // SAFETY: head is guard-protected per the contract above.
        let mut cur: &Node<K, V> = unsafe { &*head };
        while cur.is_delta() {
            deltas.push(cur);
            // SAFETY: a delta's base is valid as long as the delta is.
            cur = unsafe { &*cur.base };
        }

        let NodeVariant::Leaf(base) = &cur.variant else {
            unreachable!("leaf chain must bottom out at a Leaf page");
        };

        let mut keys: Vec<K> = base.keys.clone();
        let mut slots: Vec<Vec<V>> = base.slots.clone();
        let mut next: Pid = base.next_leaf;
        let mut high_key: Option<K> = base.high_key.clone();

        // Replay oldest-to-newest.
        for delta in deltas.iter().rev() {
            match &delta.variant {
                NodeVariant::Insert { key, value } => {
                    let (idx, found) = lower_bound(&keys, key, &self.comparator);
                    if found {
                        slots[idx].push(*value);
                    } else {
                        keys.insert(idx, key.clone());
                        slots.insert(idx, vec![*value]);
                    }
                }

                NodeVariant::Delete { key, value: None } => {
                    let (idx, found) = lower_bound(&keys, key, &self.comparator);
                    if found {
                        keys.remove(idx);
                        slots.remove(idx);
                    }
                }

                NodeVariant::Delete {
                    key,
                    value: Some(target),
                } => {
                    let (idx, found) = lower_bound(&keys, key, &self.comparator);
                    if found {
                        if let Some(pos) = slots[idx].iter().position(|v| v == target) {
                            slots[idx].remove(pos);
                        }
                        if slots[idx].is_empty() {
                            keys.remove(idx);
                            slots.remove(idx);
                        }
                    }
                }

                NodeVariant::Update { key, value } => {
                    let (idx, found) = lower_bound(&keys, key, &self.comparator);
                    if found {
                        slots[idx].clear();
                        slots[idx].push(*value);
                    }
                }

                NodeVariant::Split { split_key, side } => {
                    let (idx, _) = lower_bound(&keys, split_key, &self.comparator);
                    keys.truncate(idx);
                    slots.truncate(idx);
                    next = *side;
                    high_key = Some(split_key.clone());
                }

                NodeVariant::Leaf(_) | NodeVariant::Inner(_) | NodeVariant::Separator { .. } => {
                    unreachable!("structural page or separator inside a leaf chain");
                }
            }
        }

        FoldedLeaf {
            keys,
            slots,
            next,
            high_key,
        }
    }

    /// Fold an inner chain into its effective separator/child set.
    ///
    /// Same validity contract as [`Self::fold_leaf`].
    pub(crate) fn fold_inner(&self, head: *mut Node<K, V>, _guard: &LocalGuard<'_>) -> FoldedInner<K> {
        let mut deltas: Vec<&Node<K, V>> = Vec::new();
        // SAFETY: head is guard-protected per the contract above.
        let mut cur: &Node<K, V> = unsafe { &*head };
        while cur.is_delta() {
            deltas.push(cur);
            // SAFETY: a delta's base is valid as long as the delta is.
            cur = unsafe { &*cur.base };
        }

        let NodeVariant::Inner(base) = &cur.variant else {
            unreachable!("inner chain must bottom out at an Inner page");
        };

        let mut keys: Vec<K> = base.keys.clone();
        let mut children: Vec<Pid> = base.children.clone();
        let mut next: Pid = base.next;
        let mut high_key: Option<K> = base.high_key.clone();

        for delta in deltas.iter().rev() {
            match &delta.variant {
                NodeVariant::Separator {
                    left_key, child, ..
                } => {
                    let (idx, found) = lower_bound(&keys, left_key, &self.comparator);
                    debug_assert!(!found, "separator left key already routed");
                    keys.insert(idx, left_key.clone());
                    children.insert(idx + 1, *child);
                }

                NodeVariant::Split { split_key, side } => {
                    let (idx, _) = lower_bound(&keys, split_key, &self.comparator);
                    keys.truncate(idx);
                    children.truncate(idx + 1);
                    next = *side;
                    high_key = Some(split_key.clone());
                }

                _ => unreachable!("data delta inside an inner chain"),
            }
        }

        debug_assert_eq!(children.len(), keys.len() + 1);
        FoldedInner {
            keys,
            children,
            next,
            high_key,
        }
    }

    /// Partial fold: the effective value list of one key in a leaf chain.
    ///
    /// This is the read path of `lookup` and the pre-image every mutation
    /// inspects to compute `slot_use` and count adjustments. Same validity
    /// contract as [`Self::fold_leaf`]; the caller must already have
    /// verified that the chain covers `key` (no Split bound excludes it).
    pub(crate) fn values_in_chain(&self, head: *mut Node<K, V>, key: &K) -> Vec<V> {
        enum ChainOp<V> {
            Push(V),
            Clear,
            RemoveFirst(V),
            Overwrite(V),
        }

        let mut ops: Vec<ChainOp<V>> = Vec::new();
        // SAFETY: head is guard-protected per the module contract.
        let mut cur: &Node<K, V> = unsafe { &*head };
        while cur.is_delta() {
            match &cur.variant {
                NodeVariant::Insert { key: k, value } if self.comparator.equal(k, key) => {
                    ops.push(ChainOp::Push(*value));
                }
                NodeVariant::Delete { key: k, value } if self.comparator.equal(k, key) => {
                    ops.push(match value {
                        None => ChainOp::Clear,
                        Some(v) => ChainOp::RemoveFirst(*v),
                    });
                }
                NodeVariant::Update { key: k, value } if self.comparator.equal(k, key) => {
                    ops.push(ChainOp::Overwrite(*value));
                }
                NodeVariant::Split { split_key, .. } => {
                    debug_assert!(
                        self.comparator.compare(key, split_key) == std::cmp::Ordering::Less,
                        "coverage must be verified before walking the chain"
                    );
                }
                _ => {}
            }
            // SAFETY: a delta's base is valid as long as the delta is.
            cur = unsafe { &*cur.base };
        }

        let NodeVariant::Leaf(base) = &cur.variant else {
            unreachable!("leaf chain must bottom out at a Leaf page");
        };

        let (idx, found) = lower_bound(&base.keys, key, &self.comparator);
        let mut list: Vec<V> = if found {
            base.slots[idx].clone()
        } else {
            Vec::new()
        };

        for op in ops.iter().rev() {
            match op {
                ChainOp::Push(v) => list.push(*v),
                ChainOp::Clear => list.clear(),
                ChainOp::RemoveFirst(v) => {
                    if let Some(pos) = list.iter().position(|x| x == v) {
                        list.remove(pos);
                    }
                }
                ChainOp::Overwrite(v) => {
                    if !list.is_empty() {
                        list.clear();
                        list.push(*v);
                    }
                }
            }
        }

        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::OrdComparator;

    #[test]
    fn lower_bound_positions() {
        let cmp = OrdComparator;
        let keys = vec![10u64, 20, 30];
        assert_eq!(lower_bound(&keys, &5, &cmp), (0, false));
        assert_eq!(lower_bound(&keys, &10, &cmp), (0, true));
        assert_eq!(lower_bound(&keys, &15, &cmp), (1, false));
        assert_eq!(lower_bound(&keys, &30, &cmp), (2, true));
        assert_eq!(lower_bound(&keys, &35, &cmp), (3, false));
        assert_eq!(lower_bound(&Vec::<u64>::new(), &1, &cmp), (0, false));
    }

    #[test]
    fn upper_bound_positions() {
        let cmp = OrdComparator;
        let keys = vec![10u64, 20, 30];
        assert_eq!(upper_bound(&keys, &5, &cmp), 0);
        assert_eq!(upper_bound(&keys, &10, &cmp), 1);
        assert_eq!(upper_bound(&keys, &25, &cmp), 2);
        assert_eq!(upper_bound(&keys, &30, &cmp), 3);
        assert_eq!(upper_bound(&keys, &99, &cmp), 3);
    }
}
