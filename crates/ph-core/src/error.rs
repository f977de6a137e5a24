// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy shared across the core.
//!
//! Every category a panel-tree operation can fail with has a variant here.
//! Library crates may wrap
//! `CoreError` in their own `thiserror` enums where a narrower, crate-local
//! type is more useful; the HTTP surface (`ph-daemon`) maps every category
//! to a stable status code.

use thiserror::Error;

/// A structured error crossing a core boundary.
///
/// Single-shot operations (ns parsing, tree-store calls) return this as an
/// exception (`Result::Err`); batched operations (build, type-definition
/// fetch) instead embed a similarly-shaped message in their own structured
/// result types and never raise.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input the caller must fix: bad ns URI, unknown `action`,
    /// malformed JSON query parameter, missing source path, and similar.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced entity does not exist: panel id, source path, package.
    #[error("not found: {0}")]
    NotFound(String),

    /// Data was found to be corrupt (out-of-range history index, broken
    /// synthetic manifest) but was repaired in place; callers see this only
    /// as a warning-level log, never as a returned error. Kept here so
    /// repair sites have a single place to describe *what* they repaired.
    #[error("repaired corrupt state: {0}")]
    Repaired(String),

    /// A build artifact exceeded its size cap.
    #[error("size policy violation: {0}")]
    SizePolicyViolation(String),

    /// A filesystem operation hit a resource conflict (e.g. `ENOTEMPTY`
    /// during dependency install) that was or will be handled by a
    /// bounded reset-and-retry.
    #[error("resource conflict: {0}")]
    ResourceConflict(String),

    /// Two peer-dependency constraints could not be reconciled.
    #[error("peer dependency conflict: {0}")]
    PeerConflict(String),

    /// A parent-chain or selected-path walk detected a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// An operation was attempted with no active workspace.
    #[error("no active workspace")]
    WorkspaceAbsent,
}

impl CoreError {
    /// `true` for categories that are safe to retry with a narrowed input
    /// (not-found after trimming the offending entry).
    #[must_use]
    pub fn is_retryable_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_absent_has_stable_message() {
        assert_eq!(CoreError::WorkspaceAbsent.to_string(), "no active workspace");
    }
}
