// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only event log row.

use crate::panel::{PanelId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Enumerated event types the tree store will append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A panel was created.
    Created,
    /// A panel was focused (selected-path propagation root).
    Focused,
}

impl EventType {
    /// The lowercase `snake_case` name used in the persisted column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Focused => "focused",
        }
    }

    /// Parse from the persisted column value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventType::Created),
            "focused" => Some(EventType::Focused),
            _ => None,
        }
    }
}

/// An append-only log row. Events are not part of the tree's invariants and
/// are safe to lose on crash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Panel the event concerns.
    pub panel_id: PanelId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Enumerated event kind.
    pub kind: EventType,
    /// Free-form JSON context, opaque to the core.
    pub context: serde_json::Value,
    /// Timestamp, milliseconds since epoch.
    pub at: i64,
}
