//! Write protocols: insert, update, delete.
//!
//! Every mutation follows the same skeleton: ensure a root exists, descend
//! to the covering leaf, read the key's pre-image off the observed head,
//! build a delta whose header already reflects the post-fold state, and
//! CAS-install it. A CAS loss means another writer got there first; the
//! draft's key and value are taken back and the whole protocol retries
//! against the new head.
//!
//! No-ops (deleting an absent key or value, updating an absent key) return
//! before building a delta, so chains never carry dead mutations.

use seize::LocalGuard;

use crate::comparator::KeyComparator;
use crate::error::TreeResult;
use crate::node::{Node, NodeVariant, NULL_PID};
use crate::trace::trace_log;
use crate::tree::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
    C: KeyComparator<K>,
{
    // ========================================================================
    //  Public write API
    // ========================================================================

    /// Append `value` to `key`'s list, creating the entry if absent.
    ///
    /// Duplicate values are kept: the list is an ordered multiset.
    ///
    /// # Errors
    ///
    /// [`crate::TreeError::CapacityExhausted`] when the PID space is gone.
    /// A split triggered by this insert can hit the same limit after the
    /// pair is already visible; the pair stays, the error reports that the
    /// index can no longer restructure.
    pub fn insert(&self, key: K, value: V) -> TreeResult<()> {
        let guard = self.guard();
        self.insert_with_guard(key, value, &guard)
    }

    /// [`Self::insert`] under a caller-supplied guard.
    pub fn insert_with_guard(
        &self,
        key: K,
        value: V,
        guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        self.ensure_root(guard)?;

        let mut key = key;
        let mut value = value;
        loop {
            let mut descent = self.descend(&key, guard);
            let head = descent.head;
            let key_is_new = self.values_in_chain(head, &key).is_empty();

            // SAFETY: head observed under `guard`.
            let delta = unsafe { Node::new_insert(key, value, head, key_is_new) };
            let new_slot_use = delta.slot_use;
            let raw = Box::into_raw(delta);

            match self.mapping.install(descent.pid, raw, head) {
                Ok(()) => {
                    self.pairs
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    if new_slot_use >= self.config.leaf_slot_max {
                        self.split_leaf(descent.pid, &mut descent.path, guard)?;
                    }
                    return Ok(());
                }
                Err(_) => {
                    // SAFETY: the draft never became reachable; we own it.
                    let draft = unsafe { Box::from_raw(raw) };
                    let Node { variant, .. } = *draft;
                    match variant {
                        NodeVariant::Insert { key: k, value: v } => {
                            key = k;
                            value = v;
                        }
                        _ => unreachable!("insert draft must carry an Insert variant"),
                    }
                }
            }
        }
    }

    /// Overwrite `key`'s list with `[value]`. Silent no-op when `key` is
    /// absent (the surrounding engine layers upsert on top if it wants it).
    pub fn update(&self, key: K, value: V) -> TreeResult<()> {
        let guard = self.guard();
        self.update_with_guard(key, value, &guard)
    }

    /// [`Self::update`] under a caller-supplied guard.
    pub fn update_with_guard(
        &self,
        key: K,
        value: V,
        guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        if self.load_root() == NULL_PID {
            return Ok(());
        }

        let mut key = key;
        loop {
            let descent = self.descend(&key, guard);
            let head = descent.head;
            let old_len = self.values_in_chain(head, &key).len();
            if old_len == 0 {
                return Ok(());
            }

            // SAFETY: head observed under `guard`.
            let delta = unsafe { Node::new_update(key, value, head) };
            let raw = Box::into_raw(delta);

            match self.mapping.install(descent.pid, raw, head) {
                Ok(()) => {
                    self.pairs
                        .fetch_sub(old_len - 1, std::sync::atomic::Ordering::Relaxed);
                    return Ok(());
                }
                Err(_) => {
                    // SAFETY: the draft never became reachable; we own it.
                    let draft = unsafe { Box::from_raw(raw) };
                    let Node { variant, .. } = *draft;
                    match variant {
                        NodeVariant::Update { key: k, .. } => key = k,
                        _ => unreachable!("update draft must carry an Update variant"),
                    }
                }
            }
        }
    }

    /// Remove `key` entirely (whole value list). No-op when absent.
    pub fn delete_key(&self, key: K) -> TreeResult<()> {
        let guard = self.guard();
        self.delete_key_with_guard(key, &guard)
    }

    /// [`Self::delete_key`] under a caller-supplied guard.
    pub fn delete_key_with_guard(&self, key: K, guard: &LocalGuard<'_>) -> TreeResult<()> {
        if self.load_root() == NULL_PID {
            return Ok(());
        }

        let mut key = key;
        loop {
            let descent = self.descend(&key, guard);
            let head = descent.head;
            let old_len = self.values_in_chain(head, &key).len();
            if old_len == 0 {
                return Ok(());
            }

            // SAFETY: head observed under `guard`.
            let delta = unsafe { Node::new_delete(key, None, head, true) };
            let raw = Box::into_raw(delta);

            match self.mapping.install(descent.pid, raw, head) {
                Ok(()) => {
                    self.pairs
                        .fetch_sub(old_len, std::sync::atomic::Ordering::Relaxed);
                    return Ok(());
                }
                Err(_) => {
                    // SAFETY: the draft never became reachable; we own it.
                    let draft = unsafe { Box::from_raw(raw) };
                    let Node { variant, .. } = *draft;
                    match variant {
                        NodeVariant::Delete { key: k, .. } => key = k,
                        _ => unreachable!("delete draft must carry a Delete variant"),
                    }
                }
            }
        }
    }

    /// Remove the first value equal to `value` from `key`'s list. No-op
    /// when the pair is absent.
    pub fn delete_value(&self, key: K, value: V) -> TreeResult<()> {
        let guard = self.guard();
        self.delete_value_with_guard(key, value, &guard)
    }

    /// [`Self::delete_value`] under a caller-supplied guard.
    pub fn delete_value_with_guard(
        &self,
        key: K,
        value: V,
        guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        if self.load_root() == NULL_PID {
            return Ok(());
        }

        let mut key = key;
        loop {
            let descent = self.descend(&key, guard);
            let head = descent.head;
            let list = self.values_in_chain(head, &key);
            if !list.contains(&value) {
                return Ok(());
            }
            let removes_slot = list.len() == 1;

            // SAFETY: head observed under `guard`.
            let delta = unsafe { Node::new_delete(key, Some(value), head, removes_slot) };
            let raw = Box::into_raw(delta);

            match self.mapping.install(descent.pid, raw, head) {
                Ok(()) => {
                    self.pairs
                        .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                    return Ok(());
                }
                Err(_) => {
                    // SAFETY: the draft never became reachable; we own it.
                    let draft = unsafe { Box::from_raw(raw) };
                    let Node { variant, .. } = *draft;
                    match variant {
                        NodeVariant::Delete { key: k, .. } => key = k,
                        _ => unreachable!("delete draft must carry a Delete variant"),
                    }
                }
            }
        }
    }

    // ========================================================================
    //  Root bootstrap
    // ========================================================================

    /// Make sure a root leaf exists: allocate an empty leaf and a PID,
    /// publish the PID, then CAS the root field from [`NULL_PID`]. The
    /// loser unpublishes its draft; the winner also records the head leaf
    /// for scans (the leftmost leaf never changes afterwards).
    pub(crate) fn ensure_root(&self, _guard: &LocalGuard<'_>) -> TreeResult<()> {
        if self.load_root() != NULL_PID {
            return Ok(());
        }

        let pid = self.mapping.allocate()?;
        let raw = Box::into_raw(Node::new_empty_leaf());
        self.mapping
            .install(pid, raw, std::ptr::null_mut())
            .unwrap_or_else(|_| unreachable!("fresh PID slot must be empty"));

        match self.cas_root(NULL_PID, pid) {
            Ok(()) => {
                self.head_leaf
                    .store(pid, std::sync::atomic::Ordering::Release);
                trace_log!(pid, "bootstrapped root leaf");
                Ok(())
            }
            Err(_) => {
                // Another thread bootstrapped first. Nobody can have seen
                // this PID, so the draft is freed directly.
                self.mapping.install(pid, std::ptr::null_mut(), raw).ok();
                // SAFETY: the draft was only ever reachable through a PID
                // no other thread knows.
                unsafe { drop(Box::from_raw(raw)) };
                Ok(())
            }
        }
    }
}
