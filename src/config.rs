//! Per-instance tuning knobs.
//!
//! Slot maxima can be set directly or derived from a target node byte size
//! the way the original engine sized its pages: `max(8, bytes / entry)`.

/// Smallest permitted slot maximum. Splitting below this would produce
/// degenerate single-key pages.
pub const MIN_SLOT_MAX: usize = 8;

/// Default number of mapping-table slots (upper bound on PIDs ever
/// allocated by one tree).
pub const DEFAULT_MAPPING_CAPACITY: usize = 1 << 20;

/// Tuning parameters for one tree instance.
///
/// # Example
///
/// ```
/// use bwtree::TreeConfig;
///
/// let config = TreeConfig::default()
///     .leaf_slot_max(64)
///     .delta_threshold(12);
/// assert_eq!(config.leaf_slot_max, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum keys in a base leaf before it splits.
    pub leaf_slot_max: usize,

    /// Maximum separators in a base inner page before it splits.
    pub inner_slot_max: usize,

    /// Delta-chain length above which a traversal schedules consolidation.
    pub delta_threshold: usize,

    /// Mapping-table capacity: the total number of PIDs this tree may ever
    /// allocate. PIDs are never reused.
    pub mapping_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            leaf_slot_max: 64,
            inner_slot_max: 64,
            delta_threshold: 8,
            mapping_capacity: DEFAULT_MAPPING_CAPACITY,
        }
    }
}

impl TreeConfig {
    /// Derive slot maxima from a target node byte size and the sizes of
    /// `K` and `V`, with PIDs costing 8 bytes in inner pages.
    #[must_use]
    pub fn for_node_size<K, V>(node_bytes: usize) -> Self {
        let key = size_of::<K>().max(1);
        let val = size_of::<V>().max(1);
        let pid = size_of::<u64>();
        Self {
            leaf_slot_max: (node_bytes / (key + val)).max(MIN_SLOT_MAX),
            inner_slot_max: (node_bytes / (key + pid)).max(MIN_SLOT_MAX),
            ..Self::default()
        }
    }

    /// Set the leaf slot maximum (clamped to [`MIN_SLOT_MAX`]).
    #[must_use]
    pub fn leaf_slot_max(mut self, max: usize) -> Self {
        self.leaf_slot_max = max.max(MIN_SLOT_MAX);
        self
    }

    /// Set the inner slot maximum (clamped to [`MIN_SLOT_MAX`]).
    #[must_use]
    pub fn inner_slot_max(mut self, max: usize) -> Self {
        self.inner_slot_max = max.max(MIN_SLOT_MAX);
        self
    }

    /// Set the consolidation threshold (minimum 1).
    #[must_use]
    pub fn delta_threshold(mut self, threshold: usize) -> Self {
        self.delta_threshold = threshold.max(1);
        self
    }

    /// Set the mapping-table capacity (minimum 2: one slot is reserved for
    /// the null PID).
    #[must_use]
    pub fn mapping_capacity(mut self, capacity: usize) -> Self {
        self.mapping_capacity = capacity.max(2);
        self
    }
}
