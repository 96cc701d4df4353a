//! Root-to-leaf descent and the read API.
//!
//! Traversal is read-only on the mapping table and never blocks. At each
//! inner level the delta chain is folded *virtually*: separators and splits
//! are consulted in chain order (newest first) and only the base page is
//! binary-searched. Two move-right rules keep routing correct under
//! in-flight splits:
//!
//! 1. A Split delta whose key bounds the search key re-targets the sibling
//!    (the window before the parent's Separator exists).
//! 2. A base page whose `high_key` bounds the search key re-targets its
//!    sibling link (the same window after consolidation folded the Split
//!    delta away).
//!
//! Pages never shed their low range (there is no merging), so a descent can
//! overshoot only to the left neighbor of the target, never past it, and
//! move-right always converges.

use std::cmp::Ordering;

use seize::LocalGuard;

use crate::comparator::KeyComparator;
use crate::node::{Node, NodeVariant, Pid, NULL_PID};
use crate::tree::fold::upper_bound;
use crate::tree::BwTree;

/// Outcome of one routing step at an inner page.
enum RouteStep {
    /// Descend into this child.
    Child(Pid),

    /// The page's range no longer covers the key; continue at its right
    /// sibling on the same level.
    MoveRight(Pid),
}

/// A completed descent: the leaf whose range covers the search key, the
/// head observed there, and the inner PIDs visited on the way down (root
/// first). The path seeds separator installation on split.
pub(crate) struct Descent<K, V> {
    pub(crate) pid: Pid,
    pub(crate) head: *mut Node<K, V>,
    pub(crate) path: Vec<Pid>,
}

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
    C: KeyComparator<K>,
{
    // ========================================================================
    //  Public read API
    // ========================================================================

    /// Return the full value list for `key`, in insertion order, or empty.
    #[must_use]
    pub fn lookup(&self, key: &K) -> Vec<V> {
        let guard = self.guard();
        self.lookup_with_guard(key, &guard)
    }

    /// [`Self::lookup`] under a caller-supplied guard.
    #[must_use]
    pub fn lookup_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> Vec<V> {
        if self.load_root() == NULL_PID {
            return Vec::new();
        }
        let descent = self.descend(key, guard);
        self.values_in_chain(descent.head, key)
    }

    /// Whether `key` has at least one value.
    #[must_use]
    pub fn exists(&self, key: &K) -> bool {
        let guard = self.guard();
        self.exists_with_guard(key, &guard)
    }

    /// [`Self::exists`] under a caller-supplied guard.
    #[must_use]
    pub fn exists_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> bool {
        !self.lookup_with_guard(key, guard).is_empty()
    }

    /// Every (key, value) pair in ascending key order, values within a key
    /// in insertion order.
    #[must_use]
    pub fn scan_all(&self) -> Vec<(K, V)> {
        let guard = self.guard();
        self.scan_all_with_guard(&guard)
    }

    /// [`Self::scan_all`] under a caller-supplied guard.
    #[must_use]
    pub fn scan_all_with_guard(&self, guard: &LocalGuard<'_>) -> Vec<(K, V)> {
        let mut out: Vec<(K, V)> = Vec::new();
        let mut pid = self.scan_start(guard);
        while pid != NULL_PID {
            let head = self.mapping.get(pid);
            self.maybe_consolidate(pid, head, guard);
            let folded = self.fold_leaf(head, guard);
            for (key, list) in folded.keys.iter().zip(folded.slots.iter()) {
                for value in list {
                    out.push((key.clone(), *value));
                }
            }
            pid = folded.next;
        }
        out
    }

    // ========================================================================
    //  Descent
    // ========================================================================

    /// Descend from the root to the leaf covering `key`.
    ///
    /// The root must exist. Long chains encountered on the way volunteer
    /// for consolidation (the snapshot head stays valid under the guard
    /// either way).
    pub(crate) fn descend(&self, key: &K, guard: &LocalGuard<'_>) -> Descent<K, V> {
        let mut path: Vec<Pid> = Vec::new();
        let mut pid = self.load_root();
        debug_assert_ne!(pid, NULL_PID, "descend requires a bootstrapped root");

        loop {
            let head = self.mapping.get(pid);
            debug_assert!(!head.is_null(), "allocated PID without an installed head");
            // SAFETY: head observed under `guard`.
            let node: &Node<K, V> = unsafe { &*head };

            self.maybe_consolidate(pid, head, guard);

            if node.is_leaf_level() {
                match self.shed_target(node, key) {
                    Some(side) => pid = side,
                    None => return Descent { pid, head, path },
                }
                continue;
            }

            match self.route_step(node, key) {
                RouteStep::Child(child) => {
                    path.push(pid);
                    pid = child;
                }
                RouteStep::MoveRight(side) => pid = side,
            }
        }
    }

    /// One routing decision at an inner chain head: fold separators and
    /// splits virtually, fall through to binary search of the base.
    fn route_step(&self, head: &Node<K, V>, key: &K) -> RouteStep {
        let mut cur: &Node<K, V> = head;
        loop {
            match &cur.variant {
                NodeVariant::Separator {
                    left_key,
                    right_key,
                    child,
                    right_most,
                } => {
                    if self.comparator.compare(key, left_key) != Ordering::Less
                        && (*right_most
                            || self.comparator.compare(key, right_key) == Ordering::Less)
                    {
                        return RouteStep::Child(*child);
                    }
                }

                NodeVariant::Split { split_key, side } => {
                    if self.comparator.compare(key, split_key) != Ordering::Less {
                        return RouteStep::MoveRight(*side);
                    }
                }

                NodeVariant::Inner(page) => {
                    if let Some(high) = &page.high_key {
                        if self.comparator.compare(key, high) != Ordering::Less {
                            return RouteStep::MoveRight(page.next);
                        }
                    }
                    let idx = upper_bound(&page.keys, key, &self.comparator);
                    return RouteStep::Child(page.children[idx]);
                }

                _ => unreachable!("data delta inside an inner chain"),
            }

            // SAFETY: a delta's base is valid as long as the delta is.
            cur = unsafe { &*cur.base };
        }
    }

    /// Whether a chain head's key range has shed `key` to the right, and
    /// where to. Checks the newest Split delta (tightest bound) first, the
    /// base page's `high_key` otherwise. `None` means the page covers
    /// `key`.
    pub(crate) fn shed_target(&self, head: &Node<K, V>, key: &K) -> Option<Pid> {
        let mut cur: &Node<K, V> = head;
        loop {
            match &cur.variant {
                NodeVariant::Split { split_key, side } => {
                    return (self.comparator.compare(key, split_key) != Ordering::Less)
                        .then_some(*side);
                }

                NodeVariant::Leaf(page) => {
                    return match &page.high_key {
                        Some(high) if self.comparator.compare(key, high) != Ordering::Less => {
                            Some(page.next_leaf)
                        }
                        _ => None,
                    };
                }

                NodeVariant::Inner(page) => {
                    return match &page.high_key {
                        Some(high) if self.comparator.compare(key, high) != Ordering::Less => {
                            Some(page.next)
                        }
                        _ => None,
                    };
                }

                // SAFETY: a delta's base is valid as long as the delta is.
                _ => cur = unsafe { &*cur.base },
            }
        }
    }

    /// Find the current parent (level `child_level + 1`) whose range covers
    /// `key`, by partial descent from the root. Promotes the root first if
    /// the tree is not tall enough (a lost root-promotion race leaves the
    /// winner's root in place; a stalled winner is helped along here).
    pub(crate) fn locate_parent(
        &self,
        key: &K,
        child_level: u16,
        guard: &LocalGuard<'_>,
    ) -> crate::error::TreeResult<Pid> {
        loop {
            let root_pid = self.load_root();
            let head = self.mapping.get(root_pid);
            // SAFETY: head observed under `guard`.
            let node: &Node<K, V> = unsafe { &*head };

            if node.level <= child_level {
                self.try_promote_root(root_pid, node.level, guard)?;
                continue;
            }

            let mut pid = root_pid;
            loop {
                let head = self.mapping.get(pid);
                // SAFETY: head observed under `guard`.
                let node: &Node<K, V> = unsafe { &*head };

                if node.level == child_level + 1 {
                    match self.shed_target(node, key) {
                        Some(side) => pid = side,
                        None => return Ok(pid),
                    }
                    continue;
                }

                match self.route_step(node, key) {
                    RouteStep::Child(child) => pid = child,
                    RouteStep::MoveRight(side) => pid = side,
                }
            }
        }
    }

    /// Starting leaf for a scan: the recorded head leaf, or a leftmost
    /// descent during the bootstrap window in which the root exists but the
    /// head-leaf field is not yet published.
    fn scan_start(&self, _guard: &LocalGuard<'_>) -> Pid {
        let recorded = self.head_leaf.load(std::sync::atomic::Ordering::Acquire);
        if recorded != NULL_PID {
            return recorded;
        }

        let mut pid = self.load_root();
        if pid == NULL_PID {
            return NULL_PID;
        }
        loop {
            // SAFETY: head observed under the caller's guard.
            let node: &Node<K, V> = unsafe { &*self.mapping.get(pid) };
            if node.is_leaf_level() {
                return pid;
            }
            // Separators only add ranges at or above their split key, so
            // the leftmost child is always the base page's first child.
            // SAFETY: chain valid under the caller's guard.
            pid = unsafe { node.base_inner() }.children[0];
        }
    }
}
