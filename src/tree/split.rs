//! Structure modification: half-splits.
//!
//! A split is two CAS installs plus advisory pointer wiring:
//!
//! 1. Publish the new right sibling at a fresh PID (invisible until
//!    referenced).
//! 2. CAS a Split delta onto the overflowing page. From this instant the
//!    split is logically done: readers bound by the split key follow the
//!    side pointer. The splitting base itself is never touched - its keys
//!    and sibling link keep describing the pre-split state, so snapshots
//!    taken before this CAS stay internally consistent. The truncated key
//!    set and the sibling link reach a base page together, when
//!    consolidation folds the Split delta.
//! 3. Update the old right neighbor's advisory `prev` back-link (the one
//!    post-install write the design permits; nothing routes through it).
//! 4. CAS a Separator delta onto the parent so descents route directly.
//!    The window between 2 and 4 is covered by move-right.
//!
//! Separator installation cascades: a parent filled to its slot maximum
//! splits in turn, up to and including promotion of a new root.

use std::cmp::Ordering;

use seize::LocalGuard;

use crate::comparator::KeyComparator;
use crate::error::TreeResult;
use crate::node::{Node, Pid, NULL_PID};
use crate::trace::{debug_log, warn_log};
use crate::tree::BwTree;

impl<K, V, C> BwTree<K, V, C>
where
    K: Clone + Send + Sync + 'static,
    V: Copy + Eq + Send + Sync + 'static,
    C: KeyComparator<K>,
{
    // ========================================================================
    //  Leaf split
    // ========================================================================

    /// Split the leaf at `pid` if it is still full. `path` holds the inner
    /// PIDs of the descent that found it (root first) and is consumed from
    /// the back for separator installation.
    pub(crate) fn split_leaf(
        &self,
        pid: Pid,
        path: &mut Vec<Pid>,
        guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        loop {
            let head = self.mapping.get(pid);
            // SAFETY: head observed under `guard`.
            let node: &Node<K, V> = unsafe { &*head };

            // A competing split or a racing consolidation may already have
            // brought the page back under its bound; fullness is re-checked
            // against the live head every attempt.
            if node.slot_use < self.config.leaf_slot_max {
                return Ok(());
            }

            let folded = self.fold_leaf(head, guard);
            debug_assert_eq!(folded.keys.len(), node.slot_use);

            let pos = folded.keys.len() / 2;
            let split_key = folded.keys[pos].clone();

            // Upper half goes to the sibling; it inherits the old page's
            // bound and right link, and points back at the splitting page.
            let sibling = Node::new_leaf(
                folded.keys[pos..].to_vec(),
                folded.slots[pos..].to_vec(),
                pid,
                folded.next,
                folded.high_key.clone(),
                node.parent.load(std::sync::atomic::Ordering::Relaxed),
            );
            let sibling_pid = self.mapping.allocate()?;
            let sibling_raw = Box::into_raw(sibling);
            self.mapping
                .install(sibling_pid, sibling_raw, std::ptr::null_mut())
                .unwrap_or_else(|_| unreachable!("fresh PID slot must be empty"));

            // SAFETY: head observed under `guard`.
            let delta = unsafe { Node::new_split(split_key.clone(), sibling_pid, head, pos) };
            let delta_raw = Box::into_raw(delta);

            match self.mapping.install(pid, delta_raw, head) {
                Ok(()) => {
                    debug_log!(pid, sibling_pid, left = pos, "leaf split installed");

                    // Advisory back-link only; forward routing reaches the
                    // sibling through the Split delta (and, once folded,
                    // through the consolidated base's own link).
                    if folded.next != NULL_PID {
                        // SAFETY: neighbor head observed under `guard`.
                        let neighbor = unsafe { (*self.mapping.get(folded.next)).base_leaf() };
                        neighbor
                            .prev_leaf
                            .store(sibling_pid, std::sync::atomic::Ordering::Relaxed);
                    }

                    return self.install_separator(split_key, sibling_pid, 0, path, guard);
                }
                Err(_) => {
                    // Lost the install: free both drafts and re-examine.
                    // SAFETY: neither draft ever became reachable.
                    unsafe { drop(Box::from_raw(delta_raw)) };
                    self.mapping
                        .install(sibling_pid, std::ptr::null_mut(), sibling_raw)
                        .ok();
                    // SAFETY: sibling was published only under a PID no
                    // reader has been handed.
                    unsafe { drop(Box::from_raw(sibling_raw)) };
                }
            }
        }
    }

    // ========================================================================
    //  Inner split
    // ========================================================================

    /// Split the inner page at `pid` if it is still full. Symmetric to the
    /// leaf split except that the bisecting separator moves up rather than
    /// being duplicated: the sibling starts at the child *after* the split
    /// key, whose range the split key itself bounds from below.
    pub(crate) fn split_inner(
        &self,
        pid: Pid,
        path: &mut Vec<Pid>,
        guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        loop {
            let head = self.mapping.get(pid);
            // SAFETY: head observed under `guard`.
            let node: &Node<K, V> = unsafe { &*head };

            if node.slot_use < self.config.inner_slot_max {
                return Ok(());
            }

            let folded = self.fold_inner(head, guard);
            debug_assert_eq!(folded.keys.len(), node.slot_use);

            let pos = folded.keys.len() / 2;
            let split_key = folded.keys[pos].clone();

            let sibling = Node::new_inner(
                node.level,
                folded.keys[pos + 1..].to_vec(),
                folded.children[pos + 1..].to_vec(),
                folded.next,
                folded.high_key.clone(),
                node.parent.load(std::sync::atomic::Ordering::Relaxed),
            );
            let sibling_pid = self.mapping.allocate()?;
            let sibling_raw = Box::into_raw(sibling);
            self.mapping
                .install(sibling_pid, sibling_raw, std::ptr::null_mut())
                .unwrap_or_else(|_| unreachable!("fresh PID slot must be empty"));

            // SAFETY: head observed under `guard`.
            let delta = unsafe { Node::new_split(split_key.clone(), sibling_pid, head, pos) };
            let delta_raw = Box::into_raw(delta);

            match self.mapping.install(pid, delta_raw, head) {
                Ok(()) => {
                    debug_log!(pid, sibling_pid, left = pos, "inner split installed");

                    return self.install_separator(split_key, sibling_pid, node.level, path, guard);
                }
                Err(_) => {
                    // SAFETY: neither draft ever became reachable.
                    unsafe { drop(Box::from_raw(delta_raw)) };
                    self.mapping
                        .install(sibling_pid, std::ptr::null_mut(), sibling_raw)
                        .ok();
                    // SAFETY: as above.
                    unsafe { drop(Box::from_raw(sibling_raw)) };
                }
            }
        }
    }

    // ========================================================================
    //  Separator installation
    // ========================================================================

    /// Install a Separator routing `[split_key, right)` to `sibling_pid` at
    /// the parent of the page that just split (a page at `child_level`).
    ///
    /// The parent comes from the descent path when available, else from a
    /// fresh partial descent (which also promotes the root when the split
    /// page *was* the root). CAS losses re-read the parent; a parent whose
    /// own range has shed the split key is chased right first.
    fn install_separator(
        &self,
        split_key: K,
        sibling_pid: Pid,
        child_level: u16,
        path: &mut Vec<Pid>,
        guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        let mut parent_pid = match path.pop() {
            Some(pid) => pid,
            None => self.locate_parent(&split_key, child_level, guard)?,
        };

        loop {
            let head = self.mapping.get(parent_pid);
            // SAFETY: head observed under `guard`.
            let node: &Node<K, V> = unsafe { &*head };
            debug_assert_eq!(node.level, child_level + 1);

            if let Some(side) = self.shed_target(node, &split_key) {
                parent_pid = side;
                continue;
            }

            // The separator's right bound is the nearest existing bound
            // above the split key: the next separator, else the parent's
            // own high key. Only a parent with an unbounded range may hand
            // out an open-ended interval, or the separator would claim
            // keys the parent has already shed to its sibling.
            let folded = self.fold_inner(head, guard);
            let at = folded
                .keys
                .iter()
                .position(|k| self.comparator.compare(k, &split_key) == Ordering::Greater);
            let (right_key, right_most) = match at {
                Some(idx) => (folded.keys[idx].clone(), false),
                None => match &folded.high_key {
                    Some(high) => (high.clone(), false),
                    None => (split_key.clone(), true),
                },
            };

            // SAFETY: head observed under `guard`.
            let delta = unsafe {
                Node::new_separator(split_key.clone(), right_key, sibling_pid, right_most, head)
            };
            let new_slot_use = delta.slot_use;
            let raw = Box::into_raw(delta);

            match self.mapping.install(parent_pid, raw, head) {
                Ok(()) => {
                    debug_log!(
                        parent = parent_pid,
                        child = sibling_pid,
                        right_most,
                        "separator installed"
                    );
                    if new_slot_use >= self.config.inner_slot_max {
                        return self.split_inner(parent_pid, path, guard);
                    }
                    return Ok(());
                }
                Err(_) => {
                    // SAFETY: the draft never became reachable; we own it.
                    unsafe { drop(Box::from_raw(raw)) };
                }
            }
        }
    }

    // ========================================================================
    //  Root promotion
    // ========================================================================

    /// Raise the tree by one level: publish an inner page whose single
    /// child is the current root, then CAS the root field over. Losing the
    /// CAS just means another thread promoted first; the draft is
    /// unpublished and freed.
    pub(crate) fn try_promote_root(
        &self,
        old_root: Pid,
        old_level: u16,
        _guard: &LocalGuard<'_>,
    ) -> TreeResult<()> {
        let new_pid = self.mapping.allocate()?;
        let inner = Node::new_inner(
            old_level + 1,
            Vec::new(),
            vec![old_root],
            NULL_PID,
            None,
            NULL_PID,
        );
        let raw = Box::into_raw(inner);
        self.mapping
            .install(new_pid, raw, std::ptr::null_mut())
            .unwrap_or_else(|_| unreachable!("fresh PID slot must be empty"));

        match self.cas_root(old_root, new_pid) {
            Ok(()) => {
                // Advisory hint so later splits of the old root start their
                // parent search in the right place.
                // SAFETY: head observed under the caller's guard.
                unsafe { &*self.mapping.get(old_root) }
                    .parent
                    .store(new_pid, std::sync::atomic::Ordering::Relaxed);
                debug_log!(old_root, new_root = new_pid, "root promoted");
                Ok(())
            }
            Err(_) => {
                warn_log!(old_root, "lost root promotion race");
                self.mapping.install(new_pid, std::ptr::null_mut(), raw).ok();
                // SAFETY: the draft was published only under a PID no other
                // thread has been handed.
                unsafe { drop(Box::from_raw(raw)) };
                Ok(())
            }
        }
    }
}
