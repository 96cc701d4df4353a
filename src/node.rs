//! Node representation: base pages and delta records.
//!
//! Every page visible through the mapping table is a [`Node`]: a common
//! header plus a tagged payload. Base pages (`Leaf`, `Inner`) materialize a
//! key set; delta records (`Insert`, `Delete`, `Update`, `Split`,
//! `Separator`) express one mutation or structural event atop the node they
//! shadow via a raw `base` pointer.
//!
//! Ownership model: the mapping-table slot owns its chain head; the head
//! transitively borrows the rest of the chain through `base`; retired
//! chains are owned by the reclaimer until safe to free. Nothing here is
//! reference counted.
//!
//! Header fields (`slot_use`, `chain_length`) are computed by the mutation
//! engine *before* a delta is installed, so any reader of a head observes
//! consistent counts without walking the chain.

use std::sync::atomic::{AtomicU64, Ordering};

/// Logical page identifier indexing into the mapping table.
pub type Pid = u64;

/// Reserved PID meaning "no page". PID allocation starts at 1.
pub const NULL_PID: Pid = 0;

// ============================================================================
//  Payloads
// ============================================================================

/// Materialized leaf page: sorted keys with one ordered value list per key,
/// plus the sibling links of the leaf chain.
///
/// `next_leaf` and `high_key` are written once at construction and always
/// describe the same state as `keys`: a page that later splits keeps its
/// pre-split link, and the post-split link lives in the Split delta until
/// consolidation builds a fresh base carrying both the truncated keys and
/// the sibling. Readers that fold a snapshot therefore never mix pre-split
/// keys with a post-split link. Only the advisory `prev_leaf` is mutated
/// after publication.
pub(crate) struct LeafPage<K, V> {
    /// Sorted by the tree's comparator, strictly increasing.
    pub(crate) keys: Vec<K>,

    /// Parallel to `keys`: the ordered multiset of locators per key.
    /// Never empty; a key whose list drains is removed outright.
    pub(crate) slots: Vec<Vec<V>>,

    /// Left sibling (advisory; nothing reads it, the split protocol
    /// maintains it racily after publication).
    pub(crate) prev_leaf: AtomicU64,

    /// Right sibling as of this page's construction, forming the globally
    /// ascending leaf sequence. Write-once.
    pub(crate) next_leaf: Pid,

    /// Exclusive upper bound of this page's key range, recorded when a
    /// Split delta is folded into a fresh base. `None` means unbounded.
    /// Readers treat `k >= high_key` as "follow `next_leaf`". Write-once.
    pub(crate) high_key: Option<K>,
}

/// Materialized inner page: sorted separators and `keys.len() + 1` child
/// PIDs. `children[i]` routes keys in `[keys[i-1], keys[i])` with open ends
/// at the extremes. `next` and `high_key` are write-once, as on leaves.
pub(crate) struct InnerPage<K> {
    pub(crate) keys: Vec<K>,

    /// Always `keys.len() + 1` entries.
    pub(crate) children: Vec<Pid>,

    /// Right sibling as of this page's construction.
    pub(crate) next: Pid,

    /// Exclusive upper bound, as on leaves.
    pub(crate) high_key: Option<K>,
}

/// Tagged payload of a [`Node`].
pub(crate) enum NodeVariant<K, V> {
    Leaf(LeafPage<K, V>),
    Inner(InnerPage<K>),

    /// Append `value` to `key`'s list (creating the entry if new).
    Insert { key: K, value: V },

    /// `value: None` removes the whole key; `Some(v)` removes the first
    /// matching locator only.
    Delete { key: K, value: Option<V> },

    /// Overwrite `key`'s list with `[value]`. Only installed when the key
    /// exists at install time.
    Update { key: K, value: V },

    /// Keys `>= split_key` have moved to the sibling at `side`.
    Split { split_key: K, side: Pid },

    /// Announce a new child range at a parent: route `[left_key,
    /// right_key)` (or `[left_key, +inf)` when `right_most`) to `child`.
    Separator {
        left_key: K,
        right_key: K,
        child: Pid,
        right_most: bool,
    },
}

// ============================================================================
//  Node
// ============================================================================

/// One page or delta record. See the module docs for the ownership rules.
pub(crate) struct Node<K, V> {
    /// 0 for leaves and deltas over leaves, > 0 for inner pages and theirs.
    pub(crate) level: u16,

    /// Logical key count visible through this chain head (post-fold size).
    pub(crate) slot_use: usize,

    /// 0 for base pages; `base.chain_length + 1` for deltas.
    pub(crate) chain_length: usize,

    /// Parent PID hint. Advisory: may be stale, updated racily.
    pub(crate) parent: AtomicU64,

    /// Immediately underlying node; null for base pages. A raw pointer:
    /// the chain below is shared with the reclaimer's retirement list, so
    /// the delta borrows rather than owns it.
    pub(crate) base: *mut Node<K, V>,

    pub(crate) variant: NodeVariant<K, V>,
}

impl<K, V> Node<K, V> {
    /// Fresh empty leaf, used for root bootstrap.
    pub(crate) fn new_empty_leaf() -> Box<Self> {
        Self::new_leaf(Vec::new(), Vec::new(), NULL_PID, NULL_PID, None, NULL_PID)
    }

    /// Base leaf from materialized slots.
    pub(crate) fn new_leaf(
        keys: Vec<K>,
        slots: Vec<Vec<V>>,
        prev_leaf: Pid,
        next_leaf: Pid,
        high_key: Option<K>,
        parent: Pid,
    ) -> Box<Self> {
        debug_assert_eq!(keys.len(), slots.len());
        let slot_use = keys.len();
        Box::new(Self {
            level: 0,
            slot_use,
            chain_length: 0,
            parent: AtomicU64::new(parent),
            base: std::ptr::null_mut(),
            variant: NodeVariant::Leaf(LeafPage {
                keys,
                slots,
                prev_leaf: AtomicU64::new(prev_leaf),
                next_leaf,
                high_key,
            }),
        })
    }

    /// Base inner page from separators and children.
    pub(crate) fn new_inner(
        level: u16,
        keys: Vec<K>,
        children: Vec<Pid>,
        next: Pid,
        high_key: Option<K>,
        parent: Pid,
    ) -> Box<Self> {
        debug_assert!(level > 0);
        debug_assert_eq!(children.len(), keys.len() + 1);
        let slot_use = keys.len();
        Box::new(Self {
            level,
            slot_use,
            chain_length: 0,
            parent: AtomicU64::new(parent),
            base: std::ptr::null_mut(),
            variant: NodeVariant::Inner(InnerPage {
                keys,
                children,
                next,
                high_key,
            }),
        })
    }

    /// Insert delta atop `head`.
    ///
    /// `key_is_new` is whether the key is absent from the folded pre-image;
    /// it determines the published `slot_use`.
    ///
    /// # Safety
    ///
    /// `head` must point to a valid node protected by the caller's guard.
    pub(crate) unsafe fn new_insert(
        key: K,
        value: V,
        head: *mut Node<K, V>,
        key_is_new: bool,
    ) -> Box<Self> {
        // SAFETY: caller guarantees head validity.
        let h = unsafe { &*head };
        Box::new(Self {
            level: h.level,
            slot_use: h.slot_use + usize::from(key_is_new),
            chain_length: h.chain_length + 1,
            parent: AtomicU64::new(h.parent.load(Ordering::Relaxed)),
            base: head,
            variant: NodeVariant::Insert { key, value },
        })
    }

    /// Delete delta atop `head`. `removes_slot` is whether the operation
    /// drains the key's last locator (always true for whole-key deletes of
    /// a present key).
    ///
    /// # Safety
    ///
    /// `head` must point to a valid node protected by the caller's guard.
    pub(crate) unsafe fn new_delete(
        key: K,
        value: Option<V>,
        head: *mut Node<K, V>,
        removes_slot: bool,
    ) -> Box<Self> {
        // SAFETY: caller guarantees head validity.
        let h = unsafe { &*head };
        Box::new(Self {
            level: h.level,
            slot_use: h.slot_use - usize::from(removes_slot),
            chain_length: h.chain_length + 1,
            parent: AtomicU64::new(h.parent.load(Ordering::Relaxed)),
            base: head,
            variant: NodeVariant::Delete { key, value },
        })
    }

    /// Update delta atop `head`. Slot count is unchanged: updates are only
    /// installed for present keys.
    ///
    /// # Safety
    ///
    /// `head` must point to a valid node protected by the caller's guard.
    pub(crate) unsafe fn new_update(key: K, value: V, head: *mut Node<K, V>) -> Box<Self> {
        // SAFETY: caller guarantees head validity.
        let h = unsafe { &*head };
        Box::new(Self {
            level: h.level,
            slot_use: h.slot_use,
            chain_length: h.chain_length + 1,
            parent: AtomicU64::new(h.parent.load(Ordering::Relaxed)),
            base: head,
            variant: NodeVariant::Update { key, value },
        })
    }

    /// Split delta atop `head`; `left_size` is the key count retained by
    /// this page (the post-split half size).
    ///
    /// # Safety
    ///
    /// `head` must point to a valid node protected by the caller's guard.
    pub(crate) unsafe fn new_split(
        split_key: K,
        side: Pid,
        head: *mut Node<K, V>,
        left_size: usize,
    ) -> Box<Self> {
        // SAFETY: caller guarantees head validity.
        let h = unsafe { &*head };
        Box::new(Self {
            level: h.level,
            slot_use: left_size,
            chain_length: h.chain_length + 1,
            parent: AtomicU64::new(h.parent.load(Ordering::Relaxed)),
            base: head,
            variant: NodeVariant::Split { split_key, side },
        })
    }

    /// Separator delta atop a parent `head`.
    ///
    /// # Safety
    ///
    /// `head` must point to a valid node protected by the caller's guard.
    pub(crate) unsafe fn new_separator(
        left_key: K,
        right_key: K,
        child: Pid,
        right_most: bool,
        head: *mut Node<K, V>,
    ) -> Box<Self> {
        // SAFETY: caller guarantees head validity.
        let h = unsafe { &*head };
        Box::new(Self {
            level: h.level,
            slot_use: h.slot_use + 1,
            chain_length: h.chain_length + 1,
            parent: AtomicU64::new(h.parent.load(Ordering::Relaxed)),
            base: head,
            variant: NodeVariant::Separator {
                left_key,
                right_key,
                child,
                right_most,
            },
        })
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    #[inline]
    pub(crate) fn is_delta(&self) -> bool {
        !self.base.is_null()
    }

    /// True for leaf pages and any delta whose base is a leaf.
    #[inline]
    pub(crate) fn is_leaf_level(&self) -> bool {
        self.level == 0
    }

    /// Walk `base` pointers to the base page of this chain.
    ///
    /// # Safety
    ///
    /// Every node on the chain must still be valid (caller holds a guard
    /// covering the head's observation).
    pub(crate) unsafe fn base_page(&self) -> &Node<K, V> {
        let mut node: &Node<K, V> = self;
        while node.is_delta() {
            // SAFETY: a delta's base is valid for as long as the delta is.
            node = unsafe { &*node.base };
        }
        node
    }

    /// The leaf payload of this chain's base page.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Node::base_page`]; the chain must be at leaf
    /// level.
    pub(crate) unsafe fn base_leaf(&self) -> &LeafPage<K, V> {
        debug_assert!(self.is_leaf_level());
        // SAFETY: propagated to caller.
        match unsafe { &self.base_page().variant } {
            NodeVariant::Leaf(page) => page,
            _ => unreachable!("leaf-level chain must bottom out at a Leaf"),
        }
    }

    /// The inner payload of this chain's base page.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Node::base_page`]; the chain must be at inner
    /// level.
    pub(crate) unsafe fn base_inner(&self) -> &InnerPage<K> {
        debug_assert!(!self.is_leaf_level());
        // SAFETY: propagated to caller.
        match unsafe { &self.base_page().variant } {
            NodeVariant::Inner(page) => page,
            _ => unreachable!("inner-level chain must bottom out at an Inner"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: Vec<u64>) -> Box<Node<u64, u64>> {
        let slots = keys.iter().map(|k| vec![*k]).collect();
        Node::new_leaf(keys, slots, NULL_PID, NULL_PID, None, NULL_PID)
    }

    #[test]
    fn base_pages_have_zero_chain_length() {
        let leaf = leaf_with(vec![1, 2, 3]);
        assert_eq!(leaf.chain_length, 0);
        assert_eq!(leaf.slot_use, 3);
        assert!(matches!(leaf.variant, NodeVariant::Leaf(_)));
        assert!(!leaf.is_delta());
        assert!(leaf.is_leaf_level());
    }

    #[test]
    fn delta_counters_stack() {
        let leaf = Box::into_raw(leaf_with(vec![10]));
        // SAFETY: leaf is live for the duration of the test.
        let d1 = Box::into_raw(unsafe { Node::new_insert(20, 200, leaf, true) });
        let d2 = unsafe { Node::new_delete(10, None, d1, true) };

        unsafe {
            assert_eq!((*d1).chain_length, 1);
            assert_eq!((*d1).slot_use, 2);
        }
        assert_eq!(d2.chain_length, 2);
        assert_eq!(d2.slot_use, 1);
        assert!(matches!(d2.variant, NodeVariant::Delete { .. }));
        assert!(d2.is_delta());

        // SAFETY: base_page walks d2 -> d1 -> leaf, all live.
        let base = unsafe { d2.base_page() };
        assert!(!base.is_delta());

        drop(d2);
        unsafe {
            drop(Box::from_raw(d1));
            drop(Box::from_raw(leaf));
        }
    }

    #[test]
    fn insert_of_existing_key_keeps_slot_use() {
        let leaf = Box::into_raw(leaf_with(vec![5]));
        // SAFETY: leaf stays live below.
        let d = unsafe { Node::new_insert(5, 500, leaf, false) };
        assert_eq!(d.slot_use, 1);
        drop(d);
        unsafe { drop(Box::from_raw(leaf)) };
    }

    #[test]
    fn split_records_post_split_size() {
        let leaf = Box::into_raw(leaf_with(vec![1, 2, 3, 4]));
        // SAFETY: leaf stays live below.
        let d = unsafe { Node::new_split(3, 7, leaf, 2) };
        assert_eq!(d.slot_use, 2);
        match &d.variant {
            NodeVariant::Split { split_key, side } => {
                assert_eq!(*split_key, 3);
                assert_eq!(*side, 7);
            }
            _ => unreachable!(),
        }
        drop(d);
        unsafe { drop(Box::from_raw(leaf)) };
    }
}
