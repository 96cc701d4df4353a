//! Consolidation: collapsing a long delta chain into a fresh base page.
//!
//! Purely a read-path optimization; correctness never depends on it. Any
//! traversal that observes a chain past the configured threshold folds the
//! chain, builds a compact base, and tries to swing the mapping slot. The
//! loser of the CAS simply drops its draft: some other thread either
//! consolidated or mutated the page, and either outcome makes this attempt
//! moot.
//!
//! The replaced chain is retired as a unit; the reclaimer walks its `base`
//! pointers once every guard that could have observed the old head is gone.

use seize::{Guard, LocalGuard};

use crate::comparator::KeyComparator;
use crate::node::{Node, Pid};
use crate::reclaim::reclaim_chain;
use crate::trace::trace_log;
use crate::tree::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
    C: KeyComparator<K>,
{
    /// Consolidate the chain at `pid` if `head` exceeds the threshold.
    ///
    /// Idempotent and opportunistic: losing the install is not an error,
    /// and the caller keeps using its `head` snapshot either way.
    pub(crate) fn maybe_consolidate(
        &self,
        pid: Pid,
        head: *mut Node<K, V>,
        guard: &LocalGuard<'_>,
    ) {
        // SAFETY: head observed under `guard`.
        let node: &Node<K, V> = unsafe { &*head };
        if node.chain_length <= self.config.delta_threshold {
            return;
        }

        let draft: Box<Node<K, V>> = if node.is_leaf_level() {
            let folded = self.fold_leaf(head, guard);
            // SAFETY: chain valid under `guard`.
            let base = unsafe { node.base_leaf() };
            Node::new_leaf(
                folded.keys,
                folded.slots,
                base.prev_leaf.load(std::sync::atomic::Ordering::Acquire),
                folded.next,
                folded.high_key,
                node.parent.load(std::sync::atomic::Ordering::Relaxed),
            )
        } else {
            let folded = self.fold_inner(head, guard);
            Node::new_inner(
                node.level,
                folded.keys,
                folded.children,
                folded.next,
                folded.high_key,
                node.parent.load(std::sync::atomic::Ordering::Relaxed),
            )
        };

        let raw = Box::into_raw(draft);
        match self.mapping.install(pid, raw, head) {
            Ok(()) => {
                trace_log!(pid, chain = node.chain_length, "chain consolidated");
                // SAFETY: the old chain is now unreachable from the table
                // and owned by the reclaimer; it is freed only after every
                // guard that could hold it exits.
                unsafe { guard.defer_retire(head, reclaim_chain::<K, V>) };
            }
            Err(_) => {
                // SAFETY: the draft never became reachable; we own it.
                unsafe { drop(Box::from_raw(raw)) };
            }
        }
    }
}
