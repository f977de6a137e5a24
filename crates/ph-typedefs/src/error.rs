// SPDX-License-Identifier: MIT OR Apache-2.0
//! Failure modes surfaced by [`crate::TypeDefService`].
//!
//! Per-package failures never propagate as a `Result::Err` — they are
//! folded into [`ph_core::TypeDefResult::Error`] for that name. [`TypedefError`]
//! is used only for whole-batch install plumbing inside the installer.

/// Internal failure modes for one flush's install step.
#[derive(Debug, thiserror::Error)]
pub enum TypedefError {
    /// The consumer's dependency directory could not be created or written to.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The package manager subprocess failed for a reason other than a
    /// recognised not-found or directory-conflict pattern.
    #[error("package manager install failed (exit {code:?}): {stderr}")]
    InstallFailed {
        /// Process exit code, if available.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// Two peer-dependency constraints could not be reconciled.
    #[error("peer dependency conflict: {0}")]
    PeerConflict(String),

    /// The package manager binary could not be spawned.
    #[error("failed to spawn package manager: {0}")]
    Spawn(std::io::Error),
}
