//! Error types for tree operations.

use std::fmt as StdFmt;

/// Result alias for fallible tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can surface from a tree operation.
///
/// CAS losses, stale routing and the split/separator window are all handled
/// internally by retry and never reach the caller. Node allocation goes
/// through the global allocator, which aborts the process on exhaustion, so
/// the only reportable failure is running out of page identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The mapping table's PID space is exhausted.
    ///
    /// PIDs are allocated monotonically and never reused, so a tree that
    /// hits this is permanently unable to create new pages.
    CapacityExhausted,
}

impl StdFmt::Display for TreeError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::CapacityExhausted => write!(f, "mapping table PID capacity exhausted"),
        }
    }
}

impl std::error::Error for TreeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        assert_eq!(
            TreeError::CapacityExhausted.to_string(),
            "mapping table PID capacity exhausted"
        );
    }
}
