//! Reclaim callbacks for seize-based deferred reclamation.
//!
//! Retired chains are handed to the collector and freed only after every
//! guard that could have observed them has been dropped. Delta `base`
//! pointers are borrows, so dropping a `Node` never frees its chain; these
//! helpers walk the chain explicitly.

use seize::Collector;

use crate::node::Node;

/// Drop a single boxed node (seize callback).
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and not have been freed.
/// - Must only run once seize determines no reader can hold it.
pub(crate) unsafe fn reclaim_node_boxed<K, V>(ptr: *mut Node<K, V>, _collector: &Collector) {
    // SAFETY: caller guarantees provenance and quiescence.
    unsafe { drop(Box::from_raw(ptr)) };
}

/// Drop an entire chain: the node at `ptr` and every node reachable
/// through `base` pointers below it.
///
/// # Safety
///
/// - `ptr` must be a chain head detached from its mapping slot, with every
///   node on the chain allocated via `Box::into_raw` and owned exclusively
///   by this chain (nothing else retires chain interiors).
/// - Must only run once no traversal can observe any node of the chain.
pub(crate) unsafe fn reclaim_chain_impl<K, V>(ptr: *mut Node<K, V>) {
    let mut node = ptr;
    while !node.is_null() {
        // SAFETY: node is a live, exclusively owned chain member.
        let next = unsafe { (*node).base };
        // SAFETY: per the contract above.
        unsafe { drop(Box::from_raw(node)) };
        node = next;
    }
}

/// Seize-compatible wrapper for [`reclaim_chain_impl`], the callback used
/// when consolidation retires a replaced chain.
///
/// # Safety
///
/// Same contract as [`reclaim_chain_impl`].
pub(crate) unsafe fn reclaim_chain<K, V>(ptr: *mut Node<K, V>, _collector: &Collector) {
    // SAFETY: propagated from caller through seize.
    unsafe { reclaim_chain_impl(ptr) };
}
