//! # bwtree
//!
//! A lock-free, in-memory, ordered multi-map index based on the Bw-Tree.
//!
//! The tree maps composite keys to opaque record locators (`{block_id,
//! offset}`-style tuples) and supports concurrent point insert, point
//! delete (by key or by key + value), update, point lookup, and full
//! forward scan.
//!
//! ## Design
//!
//! Latch-based concurrency is replaced by two devices:
//!
//! - A logical-to-physical **mapping table** over page identifiers (PIDs)
//!   whose slots are the only mutation serialization points: every
//!   observable change is one successful compare-and-swap.
//! - Per-page **delta chains**: mutations and structural events are
//!   prepended as small records instead of rewriting pages. Chains are
//!   folded virtually on read and collapsed opportunistically when they
//!   grow long.
//!
//! Splits are half-splits: the new sibling is published first, a Split
//! delta makes it reachable, and the parent's Separator follows; readers
//! in the window chase sibling pointers instead of waiting.
//!
//! Retired chains go to an epoch-style deferred reclaimer (`seize`) and are
//! freed only once no traversal can observe them.
//!
//! ## Example
//!
//! ```
//! use bwtree::BwTree;
//!
//! let index: BwTree<u64, u64> = BwTree::new();
//! index.insert(10, 0xA).unwrap();
//! index.insert(10, 0xB).unwrap();
//! index.insert(7, 0xC).unwrap();
//!
//! assert_eq!(index.lookup(&10), vec![0xA, 0xB]);
//! assert_eq!(
//!     index.scan_all(),
//!     vec![(7, 0xC), (10, 0xA), (10, 0xB)],
//! );
//!
//! index.delete_value(10, 0xA).unwrap();
//! assert_eq!(index.lookup(&10), vec![0xB]);
//! ```

mod comparator;
mod config;
mod error;
mod mapping;
mod node;
mod reclaim;
mod trace;
mod tree;

pub use comparator::{KeyComparator, OrdComparator};
pub use config::{TreeConfig, DEFAULT_MAPPING_CAPACITY, MIN_SLOT_MAX};
pub use error::{TreeError, TreeResult};
pub use node::{Pid, NULL_PID};
pub use tree::BwTree;
