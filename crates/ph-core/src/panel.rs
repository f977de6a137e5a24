// SPDX-License-Identifier: MIT OR Apache-2.0
//! Panel, Snapshot, and PanelSummary — the persistent tree's core types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque, globally-unique panel identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PanelId(pub String);

impl PanelId {
    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PanelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PanelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque workspace identifier. Every panel is exclusively owned by one workspace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkspaceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable record of a panel's logical source, type, and options.
///
/// `options` is an opaque, canonical-JSON option bag: the core neither
/// interprets nor migrates its contents (see DESIGN NOTES, "From dynamic
/// JSON columns to typed variants").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// ns-style source path, e.g. `panels/editor`.
    pub source: String,
    /// Panel-type tag (opaque to the core; interpreted by the sandbox host).
    pub panel_type: String,
    /// Opaque canonical-JSON option bag.
    pub options: String,
}

impl Snapshot {
    /// Construct a snapshot with an empty (`{}`) option bag.
    #[must_use]
    pub fn new(source: impl Into<String>, panel_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            panel_type: panel_type.into(),
            options: "{}".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime build state (non-persisted)
// ---------------------------------------------------------------------------

/// In-memory-only build state for a panel. Reset to `Pending` on process
/// restart; never written to the tree store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeBuildState {
    /// No build has been attempted since the process started.
    #[default]
    Pending,
    /// The Git Provisioner is materialising source.
    Cloning,
    /// The Build Pipeline is bundling.
    Building,
    /// The last build succeeded.
    Ready,
    /// The last build failed.
    Error,
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

/// A node in the persistent panel forest.
///
/// Runtime artifacts (`runtime_state`, `build_progress`, `build_error`) are
/// never persisted; they are populated by the process hosting the tree
/// store and default to [`RuntimeBuildState::Pending`] after every restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    /// Globally unique identifier.
    pub id: PanelId,
    /// Free-text title.
    pub title: String,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Parent panel, if any.
    pub parent_id: Option<PanelId>,
    /// Zero-based ordinal position among siblings.
    pub position: i64,
    /// Currently selected child, if any. Must be a live (non-archived) child.
    pub selected_child_id: Option<PanelId>,
    /// Whether this panel's children are collapsed in tree UIs.
    pub collapsed: bool,
    /// Soft-delete marker; `None` means live.
    pub archived_at: Option<i64>,
    /// Creation timestamp, milliseconds since epoch.
    pub created_at: i64,
    /// Last-update timestamp, milliseconds since epoch.
    pub updated_at: i64,
    /// Non-empty navigation history.
    pub history: Vec<Snapshot>,
    /// Valid index into `history`.
    pub history_index: usize,
    /// Non-persisted runtime build state.
    #[serde(skip)]
    pub runtime_state: RuntimeBuildState,
}

impl Panel {
    /// The `Snapshot` currently in view (at `history_index`).
    ///
    /// # Panics
    ///
    /// Panics if `history` is empty or `history_index` is out of range; a
    /// well-formed `Panel` (as returned by the tree store) never violates
    /// this, since out-of-range indices are repaired on load.
    #[must_use]
    pub fn current_snapshot(&self) -> &Snapshot {
        &self.history[self.history_index]
    }

    /// `true` if this panel has been soft-deleted.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// PanelSummary
// ---------------------------------------------------------------------------

/// Lightweight projection used for breadcrumb / sibling / child listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PanelSummary {
    /// Panel identifier.
    pub id: PanelId,
    /// Panel type, extracted from the current snapshot.
    pub panel_type: String,
    /// Free-text title.
    pub title: String,
    /// Number of (non-archived) children.
    pub child_count: i64,
    /// Zero-based ordinal position among siblings.
    pub position: i64,
    /// Optional runtime build state, present only when the caller asked for it.
    pub runtime_state: Option<RuntimeBuildState>,
}

/// A page of results plus whether more exist beyond this page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this page.
    pub items: Vec<T>,
    /// Total number of items matching the query, ignoring pagination.
    pub total: i64,
    /// Whether a further page exists.
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_snapshot_reads_history_index() {
        let p = Panel {
            id: "p1".into(),
            title: "Editor".into(),
            workspace_id: "w1".into(),
            parent_id: None,
            position: 0,
            selected_child_id: None,
            collapsed: false,
            archived_at: None,
            created_at: 0,
            updated_at: 0,
            history: vec![
                Snapshot::new("panels/a", "editor"),
                Snapshot::new("panels/b", "editor"),
            ],
            history_index: 1,
            runtime_state: RuntimeBuildState::Pending,
        };
        assert_eq!(p.current_snapshot().source, "panels/b");
        assert!(!p.is_archived());
    }
}
