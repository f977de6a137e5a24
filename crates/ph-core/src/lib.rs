// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-core
//!
//! The stable contract shared by every panelhost crate: panel/tree types,
//! the build manifest and artifact shapes, type-definition service types,
//! and the error taxonomy.
//!
//! If you only take one dependency from this workspace, take this one.

/// Panel, Snapshot, and PanelSummary types plus tree invariants.
pub mod panel;
/// Append-only event log row type.
pub mod event;
/// Build manifest and artifact contract types.
pub mod build;
/// Type-definition cache entry and service result types.
pub mod typedef;
/// Error taxonomy shared across the core.
pub mod error;

pub use build::{Artifact, BuildManifest, BuildOutcome, ArtifactKind};
pub use error::CoreError;
pub use event::{Event, EventType};
pub use panel::{PanelId, PanelSummary, Snapshot, WorkspaceId};
pub use typedef::{TypeDefCacheEntry, TypeDefResult};

/// Maximum acyclic-traversal depth for parent-chain walks.
pub const MAX_TREE_DEPTH: usize = 100;

/// Maximum recursion depth for the `ancestors` CTE.
pub const MAX_ANCESTOR_CTE_DEPTH: usize = 20;

/// Default LRU capacity for the type-definition cache.
pub const DEFAULT_TYPEDEF_CACHE_CAPACITY: usize = 100;

/// Size caps for successful build artifacts, in bytes.
pub mod size_caps {
    /// Maximum bundle (JS) size: 50 MiB.
    pub const BUNDLE_MAX_BYTES: usize = 50 * 1024 * 1024;
    /// Maximum HTML document size: 10 MiB.
    pub const HTML_MAX_BYTES: usize = 10 * 1024 * 1024;
    /// Maximum CSS bundle size: 10 MiB.
    pub const CSS_MAX_BYTES: usize = 10 * 1024 * 1024;
}
