//! `BwTree` - a lock-free, in-memory, ordered multi-map index.
//!
//! The tree maps keys to ordered multisets of record locators. All
//! concurrency control goes through one device: per-PID delta chains whose
//! heads live in an atomic mapping table and change only by CAS. Readers
//! never block; writers retry on CAS loss.
//!
//! ## Structure
//!
//! - `crate::node` - base pages and delta records
//! - `crate::mapping` - the PID -> head table and its single CAS point
//! - `traverse` - root-to-leaf descent and the read API
//! - `mutate` + `fold` - the write protocols and chain folding
//! - `split` - half-splits with separator installation
//! - `consolidate` - chain compaction and retirement

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use seize::{Collector, LocalGuard};

use crate::comparator::{KeyComparator, OrdComparator};
use crate::config::TreeConfig;
use crate::mapping::MappingTable;
use crate::node::{Pid, NULL_PID};
use crate::reclaim::reclaim_chain_impl;

mod consolidate;
mod fold;
mod mutate;
mod split;
mod traverse;



/// A lock-free ordered multi-map from keys to record locators.
///
/// # Type Parameters
///
/// * `K` - Key type; ordered by the comparator `C`
/// * `V` - Record-locator type; trivially copyable and equality-comparable
/// * `C` - Comparator supplying the strict total order (default:
///   [`OrdComparator`] for `K: Ord`)
///
/// # Concurrency
///
/// All operations take `&self` and may run from any number of threads.
/// Mutations are lock-free; lookups are wait-free unless they volunteer for
/// consolidation. Memory reclamation is deferred through a per-tree
/// [`Collector`]: retired chains are freed only once every guard that could
/// have observed them is gone.
///
/// # Example
///
/// ```
/// use bwtree::BwTree;
///
/// let tree: BwTree<u64, u64> = BwTree::new();
/// tree.insert(5, 500).unwrap();
/// tree.insert(5, 501).unwrap();
/// assert_eq!(tree.lookup(&5), vec![500, 501]);
/// ```
pub struct BwTree<K, V, C = OrdComparator> {
    /// Deferred-reclamation domain for this tree's nodes.
    collector: Collector,

    /// PID -> head-of-chain; the only mutation serialization point.
    mapping: MappingTable<K, V>,

    comparator: C,
    config: TreeConfig,

    /// Root PID; [`NULL_PID`] until the first mutation bootstraps a leaf.
    root: AtomicU64,

    /// Leftmost leaf PID, set once at bootstrap. With no merges the
    /// leftmost leaf is stable, so scans start here.
    head_leaf: AtomicU64,

    /// Live (key, value) pair count.
    pairs: AtomicUsize,

    /// The tree logically owns nodes holding `K` and `V` through raw
    /// pointers; tell dropck.
    _own: PhantomData<Box<(K, V)>>,
}

// SAFETY: the raw node pointers are published only through acquire/release
// mapping-table slots and reclaimed through the collector; sharing the tree
// is sound whenever the carried key/value/comparator types are shareable.
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync> Send for BwTree<K, V, C> {}
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync> Sync for BwTree<K, V, C> {}

impl<K, V> BwTree<K, V, OrdComparator>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
{
    /// Create an empty tree with the default configuration and `Ord`-based
    /// comparator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with a custom configuration.
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self::with_comparator(OrdComparator, config)
    }
}

impl<K, V> Default for BwTree<K, V, OrdComparator>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
    C: KeyComparator<K>,
{
    /// Create an empty tree with an explicit comparator and configuration.
    #[must_use]
    pub fn with_comparator(comparator: C, config: TreeConfig) -> Self {
        Self {
            collector: Collector::new(),
            mapping: MappingTable::with_capacity(config.mapping_capacity),
            comparator,
            config,
            root: AtomicU64::new(NULL_PID),
            head_leaf: AtomicU64::new(NULL_PID),
            pairs: AtomicUsize::new(0),
            _own: PhantomData,
        }
    }

    /// Enter a protected region and return a guard.
    ///
    /// Use the `*_with_guard` operation variants to amortize guard cost
    /// over a batch; reclamation of anything observed through the guard is
    /// deferred until it drops.
    #[must_use]
    #[inline(always)]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Number of live (key, value) pairs. O(1); tracked incrementally.
    #[must_use]
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.pairs.load(AtomicOrdering::Relaxed)
    }

    /// Whether the tree holds no pairs.
    #[must_use]
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// This instance's tuning parameters.
    #[must_use]
    #[inline(always)]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ========================================================================
    //  Internal shared-state accessors
    // ========================================================================

    #[inline(always)]
    pub(crate) fn load_root(&self) -> Pid {
        self.root.load(AtomicOrdering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn cas_root(&self, expected: Pid, new: Pid) -> Result<(), Pid> {
        self.root
            .compare_exchange(
                expected,
                new,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .map(|_| ())
    }
}

impl<K, V, C> Drop for BwTree<K, V, C> {
    fn drop(&mut self) {
        // Exclusive access: detach and free every chain still owned by a
        // slot. Chains retired earlier belong to the collector and are
        // freed when it drops right after.
        let bound = self.mapping.allocated_bound();
        for pid in 1..bound {
            let head = self.mapping.take(pid);
            if !head.is_null() {
                // SAFETY: `&mut self` means no guards are live; every slot
                // exclusively owns its current chain.
                unsafe { reclaim_chain_impl(head) };
            }
        }
    }
}

impl<K, V, C> StdFmt::Debug for BwTree<K, V, C> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BwTree")
            .field("pairs", &self.pairs.load(AtomicOrdering::Relaxed))
            .field("root", &self.root.load(AtomicOrdering::Relaxed))
            .field("capacity", &self.mapping.capacity())
            .finish_non_exhaustive()
    }
}
