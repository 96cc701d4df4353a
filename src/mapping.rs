//! Logical-to-physical mapping table.
//!
//! A fixed-capacity array of atomic head pointers indexed by PID. Every
//! observable change to a page is the effect of exactly one successful CAS
//! on its slot; losers re-read and retry. This is the single mutation
//! serialization point of the whole index.

use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::error::{TreeError, TreeResult};
use crate::node::{Node, Pid, NULL_PID};

/// Fixed-capacity PID -> head-of-chain table.
///
/// Slot 0 backs [`NULL_PID`] and is never allocated; the PID counter starts
/// at 1 and is monotonic for the lifetime of the tree (PIDs are never
/// reused, so ABA on slot contents cannot arise from PID recycling).
pub(crate) struct MappingTable<K, V> {
    slots: Box<[AtomicPtr<Node<K, V>>]>,
    next_pid: AtomicU64,
}

impl<K, V> MappingTable<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity >= 2, "capacity must cover NULL_PID plus one page");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || AtomicPtr::new(std::ptr::null_mut()));
        Self {
            slots: slots.into_boxed_slice(),
            next_pid: AtomicU64::new(1),
        }
    }

    /// Reserve a fresh PID. Fails when the table is full; the counter is
    /// burned either way (monotonicity over thrift).
    pub(crate) fn allocate(&self) -> TreeResult<Pid> {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        if pid as usize >= self.slots.len() {
            return Err(TreeError::CapacityExhausted);
        }
        Ok(pid)
    }

    /// Current head for `pid`, or null if the slot was never installed.
    ///
    /// The acquire load pairs with the release half of [`Self::install`]:
    /// it publishes every field of the node the pointer leads to.
    #[inline]
    pub(crate) fn get(&self, pid: Pid) -> *mut Node<K, V> {
        debug_assert_ne!(pid, NULL_PID);
        self.slots[pid as usize].load(Ordering::Acquire)
    }

    /// Single CAS install of `new` at `pid`, expecting `expected`.
    ///
    /// On failure returns the observed head; the caller re-reads and
    /// retries (or abandons the draft).
    #[inline]
    pub(crate) fn install(
        &self,
        pid: Pid,
        new: *mut Node<K, V>,
        expected: *mut Node<K, V>,
    ) -> Result<(), *mut Node<K, V>> {
        debug_assert_ne!(pid, NULL_PID);
        self.slots[pid as usize]
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Detach and return the head for `pid`. Used only by teardown, when no
    /// concurrent access exists.
    pub(crate) fn take(&self, pid: Pid) -> *mut Node<K, V> {
        self.slots[pid as usize].swap(std::ptr::null_mut(), Ordering::AcqRel)
    }

    /// Highest PID allocated so far plus one (exclusive scan bound for
    /// teardown).
    pub(crate) fn allocated_bound(&self) -> Pid {
        self.next_pid
            .load(Ordering::Acquire)
            .min(self.slots.len() as u64)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}
