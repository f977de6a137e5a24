// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors surfaced by [`crate::Engine`].

/// Failure modes for tree-store operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeStoreError {
    /// The underlying SQLite connection reported a failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row could not be decoded into its domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// The referenced panel does not exist (or is not visible to the caller).
    #[error("panel not found: {0}")]
    NotFound(String),

    /// A parent-chain or selected-path walk revisited a node it had already
    /// visited, or exceeded [`ph_core::MAX_TREE_DEPTH`].
    #[error("cycle or depth overflow detected at panel {0}")]
    CycleDetected(String),

    /// A cross-workspace move or reference was attempted.
    #[error("cross-workspace operation rejected: {0}")]
    CrossWorkspace(String),
}

impl From<TreeStoreError> for ph_core::CoreError {
    fn from(err: TreeStoreError) -> Self {
        match err {
            TreeStoreError::NotFound(id) => ph_core::CoreError::NotFound(id),
            TreeStoreError::CycleDetected(id) => ph_core::CoreError::CycleDetected(id),
            other => ph_core::CoreError::InvalidInput(other.to_string()),
        }
    }
}
