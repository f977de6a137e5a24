// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`Engine`] — the durable, workspace-scoped panel tree.

use crate::error::TreeStoreError;
use crate::schema::run_migrations;
use ph_core::event::{Event, EventType};
use ph_core::panel::{Page, Panel, PanelId, PanelSummary, Snapshot, WorkspaceId};
use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::{trace, warn};

/// Columns a caller may set through [`Engine::update`]. Any expansion of
/// updatable fields must extend this list.
const ALLOWED_UPDATE_COLUMNS: &[&str] = &["title", "collapsed", "selected_child_id", "runtime_meta"];

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Strip path separators, dots, and control characters from a raw workspace
/// identifier so it is safe to use as a SQLite file name. Runs of the
/// resulting placeholder character are collapsed so `"../../etc"` becomes
/// `"etc"` rather than a string of underscores.
#[must_use]
pub fn sanitize_workspace_filename(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '.' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if !last_was_underscore {
                collapsed.push('_');
            }
            last_was_underscore = true;
        } else {
            collapsed.push(c);
            last_was_underscore = false;
        }
    }
    let trimmed = collapsed.trim_matches('_');
    let base = if trimmed.is_empty() { "workspace" } else { trimmed };
    format!("{base}.sqlite3")
}

/// Fields a caller may merge into an existing panel. `None` leaves the
/// column untouched; `Some(None)` (for `selected_child_id`) clears it.
#[derive(Debug, Default, Clone)]
pub struct UpdatePanelFields {
    /// New title, if changing.
    pub title: Option<String>,
    /// New collapsed flag, if changing.
    pub collapsed: Option<bool>,
    /// New selected child, if changing (`Some(None)` clears it).
    pub selected_child_id: Option<Option<PanelId>>,
    /// New opaque runtime-metadata JSON blob, if changing.
    pub runtime_meta: Option<String>,
}

struct RawPanelRow {
    id: String,
    title: String,
    workspace_id: String,
    parent_id: Option<String>,
    position: i64,
    selected_child_id: Option<String>,
    collapsed: bool,
    archived_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    history: String,
    history_index: i64,
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawPanelRow> {
    Ok(RawPanelRow {
        id: row.get("id")?,
        title: row.get("title")?,
        workspace_id: row.get("workspace_id")?,
        parent_id: row.get("parent_id")?,
        position: row.get("position")?,
        selected_child_id: row.get("selected_child_id")?,
        collapsed: row.get("collapsed")?,
        archived_at: row.get("archived_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        history: row.get("history")?,
        history_index: row.get("history_index")?,
    })
}

fn raw_into_panel(raw: RawPanelRow) -> Result<Panel, TreeStoreError> {
    let history: Vec<Snapshot> = serde_json::from_str(&raw.history)
        .map_err(|e| TreeStoreError::CorruptRow(format!("panel {}: bad history JSON: {e}", raw.id)))?;
    if history.is_empty() {
        return Err(TreeStoreError::CorruptRow(format!("panel {} has empty history", raw.id)));
    }
    let mut history_index = raw.history_index.max(0) as usize;
    if history_index >= history.len() {
        warn!(
            target: "ph.tree_store",
            panel_id = %raw.id,
            stored_index = raw.history_index,
            len = history.len(),
            "repaired out-of-range history_index"
        );
        history_index = history.len() - 1;
    }
    Ok(Panel {
        id: PanelId(raw.id),
        title: raw.title,
        workspace_id: WorkspaceId(raw.workspace_id),
        parent_id: raw.parent_id.map(PanelId),
        position: raw.position,
        selected_child_id: raw.selected_child_id.map(PanelId),
        collapsed: raw.collapsed,
        archived_at: raw.archived_at,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        history,
        history_index,
        runtime_state: ph_core::panel::RuntimeBuildState::default(),
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<PanelSummary> {
    let id: String = row.get("id")?;
    let title: String = row.get("title")?;
    let position: i64 = row.get("position")?;
    let history: String = row.get("history")?;
    let history_index: i64 = row.get("history_index")?;
    let child_count: i64 = row.get("child_count")?;
    let panel_type = extract_panel_type(&history, history_index);
    Ok(PanelSummary {
        id: PanelId(id),
        panel_type,
        title,
        child_count,
        position,
        runtime_state: None,
    })
}

fn extract_panel_type(history_json: &str, history_index: i64) -> String {
    let history: Vec<Snapshot> = match serde_json::from_str(history_json) {
        Ok(h) => h,
        Err(_) => return String::new(),
    };
    let idx = (history_index.max(0) as usize).min(history.len().saturating_sub(1));
    history.get(idx).map(|s| s.panel_type.clone()).unwrap_or_default()
}

const SUMMARY_COLUMNS: &str = "p.id, p.title, p.position, p.history, p.history_index,
     (SELECT COUNT(*) FROM panels c WHERE c.parent_id = p.id AND c.archived_at IS NULL) AS child_count";

/// A durable, workspace-scoped panel tree backed by a single SQLite
/// connection. One `Engine` owns exactly one open database handle; switching
/// the active workspace means dropping this `Engine` and opening another.
pub struct Engine {
    conn: Mutex<Connection>,
    workspace_id: WorkspaceId,
}

impl Engine {
    /// Open (creating if absent) the SQLite database at `path`, scoped to
    /// `workspace_id`. Applies `journal_mode=WAL`, `synchronous=NORMAL`,
    /// `foreign_keys=ON` and runs any pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] if the connection cannot be opened
    /// or pragmas/migrations fail.
    pub fn open(path: &Path, workspace_id: WorkspaceId) -> Result<Self, TreeStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TreeStoreError::CorruptRow(format!("could not create {}: {e}", parent.display()))
            })?;
        }
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous=NORMAL;", [])?;
        conn.execute("PRAGMA foreign_keys=ON;", [])?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            workspace_id,
        })
    }

    /// Open an in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] if pragmas or migrations fail.
    pub fn open_in_memory(workspace_id: WorkspaceId) -> Result<Self, TreeStoreError> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys=ON;", [])?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            workspace_id,
        })
    }

    /// The workspace this engine is scoped to.
    #[must_use]
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    // -----------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------

    /// Create a panel as a child of `parent_id` (or a root if `None`).
    /// Inserted at position 0; existing live siblings are shifted by +1.
    /// History is seeded with exactly
    /// `snapshot`, `history_index = 0`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn create_panel(
        &self,
        parent_id: Option<PanelId>,
        title: String,
        snapshot: Snapshot,
    ) -> Result<Panel, TreeStoreError> {
        let mut conn = self.conn.lock().expect("tree-store mutex poisoned");
        let tx = conn.transaction()?;
        let now = now_ms();
        let parent_str = parent_id.as_ref().map(PanelId::as_str);

        tx.execute(
            "UPDATE panels SET position = position + 1, updated_at = ?1
             WHERE workspace_id = ?2 AND archived_at IS NULL AND parent_id IS ?3",
            rusqlite::params![now, self.workspace_id.as_str(), parent_str],
        )?;

        let id = uuid::Uuid::new_v4().to_string();
        let history = serde_json::to_string(&[snapshot]).expect("Snapshot always serialises");
        tx.execute(
            "INSERT INTO panels (id, title, workspace_id, parent_id, position, selected_child_id,
                collapsed, created_at, updated_at, archived_at, history, history_index, runtime_meta)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, 0, ?5, ?5, NULL, ?6, 0, '{}')",
            rusqlite::params![id, title, self.workspace_id.as_str(), parent_str, now, history],
        )?;
        tx.execute(
            "INSERT INTO events (panel_id, workspace_id, kind, context, at) VALUES (?1, ?2, ?3, '{}', ?4)",
            rusqlite::params![id, self.workspace_id.as_str(), EventType::Created.as_str(), now],
        )?;
        tx.commit()?;
        drop(conn);
        self.get_panel(&PanelId(id.clone()))?
            .ok_or(TreeStoreError::NotFound(id))
    }

    /// Fetch a single panel by id, archived or not — archived panels
    /// remain readable by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn get_panel(&self, id: &PanelId) -> Result<Option<Panel>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let raw = conn
            .query_row("SELECT * FROM panels WHERE id = ?1", [id.as_str()], row_to_raw)
            .optional()?;
        raw.map(raw_into_panel).transpose()
    }

    /// `true` if a panel with `id` exists (archived or not).
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn exists(&self, id: &PanelId) -> Result<bool, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM panels WHERE id = ?1",
            [id.as_str()],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Count of live (non-archived) panels in this workspace.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn panel_count(&self) -> Result<i64, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let count = conn.query_row(
            "SELECT COUNT(*) FROM panels WHERE workspace_id = ?1 AND archived_at IS NULL",
            [self.workspace_id.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Every live panel in this workspace, ordered by parent then position.
    /// The caller reconstructs the forest from `parent_id` links.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] or a decode failure.
    pub fn full_tree(&self) -> Result<Vec<Panel>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM panels WHERE workspace_id = ?1 AND archived_at IS NULL
             ORDER BY parent_id, position",
        )?;
        let rows = stmt.query_map([self.workspace_id.as_str()], row_to_raw)?;
        rows.map(|r| raw_into_panel(r?)).collect()
    }

    /// All live root panels (no parent), ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn roots(&self) -> Result<Vec<PanelSummary>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM panels p
             WHERE p.workspace_id = ?1 AND p.parent_id IS NULL AND p.archived_at IS NULL
             ORDER BY p.position"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([self.workspace_id.as_str()], row_to_summary)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// A page of live root panels, with total count and `has_more`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn roots_page(&self, limit: i64, offset: i64) -> Result<Page<PanelSummary>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM panels WHERE workspace_id = ?1 AND parent_id IS NULL AND archived_at IS NULL",
            [self.workspace_id.as_str()],
            |r| r.get(0),
        )?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM panels p
             WHERE p.workspace_id = ?1 AND p.parent_id IS NULL AND p.archived_at IS NULL
             ORDER BY p.position LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params![self.workspace_id.as_str(), limit, offset], row_to_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page {
            has_more: offset + items.len() as i64 < total,
            items,
            total,
        })
    }

    /// Live children of `parent`, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn children(&self, parent: &PanelId) -> Result<Vec<PanelSummary>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM panels p
             WHERE p.parent_id = ?1 AND p.archived_at IS NULL ORDER BY p.position"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([parent.as_str()], row_to_summary)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// A page of live children of `parent`, with total count and `has_more`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn children_page(
        &self,
        parent: &PanelId,
        limit: i64,
        offset: i64,
    ) -> Result<Page<PanelSummary>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM panels WHERE parent_id = ?1 AND archived_at IS NULL",
            [parent.as_str()],
            |r| r.get(0),
        )?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM panels p
             WHERE p.parent_id = ?1 AND p.archived_at IS NULL
             ORDER BY p.position LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params![parent.as_str(), limit, offset], row_to_summary)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page {
            has_more: offset + items.len() as i64 < total,
            items,
            total,
        })
    }

    /// Live siblings of `id` (its parent's other live children), ordered by
    /// position. `id` itself is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::NotFound`] if `id` does not exist, or
    /// [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn siblings(&self, id: &PanelId) -> Result<Vec<PanelSummary>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let parent: Option<String> = conn
            .query_row("SELECT parent_id FROM panels WHERE id = ?1", [id.as_str()], |r| r.get(0))
            .optional()?
            .ok_or_else(|| TreeStoreError::NotFound(id.to_string()))?;
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM panels p
             WHERE p.parent_id IS ?1 AND p.archived_at IS NULL AND p.id != ?2
             ORDER BY p.position"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![parent, id.as_str()], row_to_summary)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Ancestors of `id` from root to immediate parent, bounded at
    /// [`ph_core::MAX_ANCESTOR_CTE_DEPTH`] hops via a recursive CTE.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn ancestors(&self, id: &PanelId) -> Result<Vec<PanelSummary>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let sql = format!(
            "WITH RECURSIVE anc(id, parent_id, depth) AS (
                SELECT id, parent_id, 0 FROM panels WHERE id = ?1
                UNION ALL
                SELECT p.id, p.parent_id, anc.depth + 1
                FROM panels p JOIN anc ON p.id = anc.parent_id
                WHERE anc.depth < ?2
             )
             SELECT {SUMMARY_COLUMNS} FROM panels p
             JOIN anc ON anc.id = p.id
             WHERE anc.depth > 0 AND p.archived_at IS NULL
             ORDER BY anc.depth DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![id.as_str(), ph_core::MAX_ANCESTOR_CTE_DEPTH as i64],
            row_to_summary,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // -----------------------------------------------------------------
    // Update / mutate
    // -----------------------------------------------------------------

    /// Merge-style update over the fixed allow-list of updatable columns;
    /// unset fields are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::NotFound`] if `id` does not exist, or
    /// [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn update(&self, id: &PanelId, fields: UpdatePanelFields) -> Result<Panel, TreeStoreError> {
        let mut set_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        macro_rules! push_column {
            ($col:literal, $value:expr) => {{
                debug_assert!(ALLOWED_UPDATE_COLUMNS.contains(&$col));
                set_clauses.push(format!("{} = ?", $col));
                params.push(Box::new($value));
            }};
        }

        if let Some(title) = fields.title {
            push_column!("title", title);
        }
        if let Some(collapsed) = fields.collapsed {
            push_column!("collapsed", collapsed);
        }
        if let Some(selected) = fields.selected_child_id {
            push_column!("selected_child_id", selected.map(|p| p.0));
        }
        if let Some(runtime_meta) = fields.runtime_meta {
            push_column!("runtime_meta", runtime_meta);
        }

        if set_clauses.is_empty() {
            return self
                .get_panel(id)?
                .ok_or_else(|| TreeStoreError::NotFound(id.to_string()));
        }

        set_clauses.push("updated_at = ?".to_string());
        params.push(Box::new(now_ms()));
        params.push(Box::new(id.as_str().to_string()));

        let sql = format!("UPDATE panels SET {} WHERE id = ?", set_clauses.join(", "));
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|boxed| boxed.as_ref()).collect();
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let changed = conn.execute(&sql, param_refs.as_slice())?;
        drop(conn);
        if changed == 0 {
            return Err(TreeStoreError::NotFound(id.to_string()));
        }
        self.get_panel(id)?.ok_or_else(|| TreeStoreError::NotFound(id.to_string()))
    }

    /// Convenience wrapper over [`Engine::update`] for the title field.
    ///
    /// # Errors
    ///
    /// See [`Engine::update`].
    pub fn set_title(&self, id: &PanelId, title: String) -> Result<Panel, TreeStoreError> {
        self.update(
            id,
            UpdatePanelFields {
                title: Some(title),
                ..Default::default()
            },
        )
    }

    /// Replace a panel's entire navigation history.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::CorruptRow`] if `history` is empty or
    /// `history_index` is out of range, [`TreeStoreError::NotFound`] if `id`
    /// does not exist, or [`TreeStoreError::Sqlite`] on a backing store
    /// failure.
    pub fn replace_history(
        &self,
        id: &PanelId,
        history: Vec<Snapshot>,
        history_index: usize,
    ) -> Result<Panel, TreeStoreError> {
        if history.is_empty() {
            return Err(TreeStoreError::CorruptRow("history must be non-empty".to_string()));
        }
        if history_index >= history.len() {
            return Err(TreeStoreError::CorruptRow(format!(
                "history_index {history_index} out of range for history of length {}",
                history.len()
            )));
        }
        let serialized = serde_json::to_string(&history).expect("Snapshot always serialises");
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let changed = conn.execute(
            "UPDATE panels SET history = ?1, history_index = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![serialized, history_index as i64, now_ms(), id.as_str()],
        )?;
        drop(conn);
        if changed == 0 {
            return Err(TreeStoreError::NotFound(id.to_string()));
        }
        self.get_panel(id)?.ok_or_else(|| TreeStoreError::NotFound(id.to_string()))
    }

    /// Move `id` to a new parent and/or position. `new_position` already
    /// excludes the dragged item. Both
    /// the source and destination sibling sets are renormalised to a dense
    /// `[0, n)` range in one transaction. If the move changes parents and
    /// the old parent had `id` selected, its `selected_child_id` is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::NotFound`] if `id` does not exist, or
    /// [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn move_panel(
        &self,
        id: &PanelId,
        new_parent: Option<PanelId>,
        new_position: i64,
    ) -> Result<Panel, TreeStoreError> {
        let mut conn = self.conn.lock().expect("tree-store mutex poisoned");
        let tx = conn.transaction()?;
        let old_parent: Option<String> = tx
            .query_row("SELECT parent_id FROM panels WHERE id = ?1", [id.as_str()], |r| r.get(0))
            .optional()?
            .ok_or_else(|| TreeStoreError::NotFound(id.to_string()))?;

        if let Some(parent) = &new_parent {
            let parent_workspace: String = tx
                .query_row(
                    "SELECT workspace_id FROM panels WHERE id = ?1",
                    [parent.as_str()],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| TreeStoreError::NotFound(parent.to_string()))?;
            if parent_workspace != self.workspace_id.as_str() {
                return Err(TreeStoreError::CrossWorkspace(format!(
                    "panel {parent} belongs to a different workspace"
                )));
            }
        }

        let new_parent_str = new_parent.as_ref().map(PanelId::as_str);
        let now = now_ms();

        tx.execute(
            "UPDATE panels SET position = position + 1, updated_at = ?1
             WHERE parent_id IS ?2 AND archived_at IS NULL AND id != ?3 AND position >= ?4",
            rusqlite::params![now, new_parent_str, id.as_str(), new_position],
        )?;
        tx.execute(
            "UPDATE panels SET parent_id = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![new_parent_str, new_position, now, id.as_str()],
        )?;

        normalize_positions_tx(&tx, new_parent_str)?;
        if old_parent.as_deref() != new_parent_str {
            if let Some(old_parent_id) = &old_parent {
                tx.execute(
                    "UPDATE panels SET selected_child_id = NULL WHERE id = ?1 AND selected_child_id = ?2",
                    rusqlite::params![old_parent_id, id.as_str()],
                )?;
            }
            normalize_positions_tx(&tx, old_parent.as_deref())?;
        }
        tx.commit()?;
        drop(conn);
        self.get_panel(id)?.ok_or_else(|| TreeStoreError::NotFound(id.to_string()))
    }

    /// Walk parent pointers from `focused_id` up to the root, setting each
    /// traversed parent's `selected_child_id` to the node below it. Aborts
    /// without writing anything if a cycle is found or the walk exceeds
    /// [`ph_core::MAX_TREE_DEPTH`].
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::CycleDetected`] if the parent chain cycles
    /// or overflows the depth cap, or [`TreeStoreError::Sqlite`] on a
    /// backing store failure.
    pub fn propagate_selected_path(&self, focused_id: &PanelId) -> Result<(), TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let mut edges: Vec<(String, String)> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = focused_id.to_string();
        visited.insert(current.clone());

        loop {
            let parent: Option<String> = conn
                .query_row("SELECT parent_id FROM panels WHERE id = ?1", [&current], |r| r.get(0))
                .optional()?
                .flatten();
            let Some(parent) = parent else { break };
            if !visited.insert(parent.clone()) {
                warn!(target: "ph.tree_store", panel_id = %focused_id, "cycle detected during selected-path propagation, aborting");
                return Err(TreeStoreError::CycleDetected(focused_id.to_string()));
            }
            if edges.len() >= ph_core::MAX_TREE_DEPTH {
                warn!(target: "ph.tree_store", panel_id = %focused_id, "depth cap exceeded during selected-path propagation, aborting");
                return Err(TreeStoreError::CycleDetected(focused_id.to_string()));
            }
            edges.push((parent.clone(), current.clone()));
            current = parent;
        }

        drop(conn);
        if edges.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().expect("tree-store mutex poisoned");
        let tx = conn.transaction()?;
        let now = now_ms();
        for (parent, child) in &edges {
            tx.execute(
                "UPDATE panels SET selected_child_id = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![child, now, parent],
            )?;
        }
        tx.commit()?;
        trace!(target: "ph.tree_store", panel_id = %focused_id, hops = edges.len(), "selected-path propagated");
        Ok(())
    }

    /// Set (or clear) a panel's collapsed flag.
    ///
    /// # Errors
    ///
    /// See [`Engine::update`].
    pub fn set_collapsed(&self, id: &PanelId, collapsed: bool) -> Result<Panel, TreeStoreError> {
        self.update(
            id,
            UpdatePanelFields {
                collapsed: Some(collapsed),
                ..Default::default()
            },
        )
    }

    /// Set the collapsed flag for every id in `ids` in a single transaction.
    /// Unknown ids are silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn set_collapsed_batch(&self, ids: &[PanelId], collapsed: bool) -> Result<(), TreeStoreError> {
        let mut conn = self.conn.lock().expect("tree-store mutex poisoned");
        let tx = conn.transaction()?;
        let now = now_ms();
        for id in ids {
            tx.execute(
                "UPDATE panels SET collapsed = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![collapsed, now, id.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Soft-delete: set `archived_at`, then renormalise the former parent's
    /// sibling positions.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::NotFound`] if `id` does not exist, or
    /// [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn archive(&self, id: &PanelId) -> Result<Panel, TreeStoreError> {
        let mut conn = self.conn.lock().expect("tree-store mutex poisoned");
        let tx = conn.transaction()?;
        let parent: Option<String> = tx
            .query_row("SELECT parent_id FROM panels WHERE id = ?1", [id.as_str()], |r| r.get(0))
            .optional()?
            .ok_or_else(|| TreeStoreError::NotFound(id.to_string()))?;
        let now = now_ms();
        tx.execute(
            "UPDATE panels SET archived_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id.as_str()],
        )?;
        tx.execute(
            "UPDATE panels SET selected_child_id = NULL WHERE selected_child_id = ?1",
            [id.as_str()],
        )?;
        normalize_positions_tx(&tx, parent.as_deref())?;
        tx.commit()?;
        drop(conn);
        self.get_panel(id)?.ok_or_else(|| TreeStoreError::NotFound(id.to_string()))
    }

    /// Clear `archived_at`, then renormalise the parent's sibling positions.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::NotFound`] if `id` does not exist, or
    /// [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn unarchive(&self, id: &PanelId) -> Result<Panel, TreeStoreError> {
        let mut conn = self.conn.lock().expect("tree-store mutex poisoned");
        let tx = conn.transaction()?;
        let parent: Option<String> = tx
            .query_row("SELECT parent_id FROM panels WHERE id = ?1", [id.as_str()], |r| r.get(0))
            .optional()?
            .ok_or_else(|| TreeStoreError::NotFound(id.to_string()))?;
        let now = now_ms();
        tx.execute(
            "UPDATE panels SET archived_at = NULL, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, id.as_str()],
        )?;
        normalize_positions_tx(&tx, parent.as_deref())?;
        tx.commit()?;
        drop(conn);
        self.get_panel(id)?.ok_or_else(|| TreeStoreError::NotFound(id.to_string()))
    }

    // -----------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------

    /// Append an event row. Events are not part of the tree's invariants
    /// and are safe to lose on crash.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure.
    pub fn append_event(
        &self,
        panel_id: &PanelId,
        kind: EventType,
        context: serde_json::Value,
    ) -> Result<(), TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        conn.execute(
            "INSERT INTO events (panel_id, workspace_id, kind, context, at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                panel_id.as_str(),
                self.workspace_id.as_str(),
                kind.as_str(),
                context.to_string(),
                now_ms()
            ],
        )?;
        Ok(())
    }

    /// The `limit` most recent events, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`TreeStoreError::Sqlite`] on a backing store failure or
    /// [`TreeStoreError::CorruptRow`] if a stored `kind` is unrecognised.
    pub fn recent_events(&self, limit: i64) -> Result<Vec<Event>, TreeStoreError> {
        let conn = self.conn.lock().expect("tree-store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT panel_id, workspace_id, kind, context, at FROM events
             WHERE workspace_id = ?1 ORDER BY at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![self.workspace_id.as_str(), limit], |row| {
            let panel_id: String = row.get(0)?;
            let workspace_id: String = row.get(1)?;
            let kind: String = row.get(2)?;
            let context: String = row.get(3)?;
            let at: i64 = row.get(4)?;
            Ok((panel_id, workspace_id, kind, context, at))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (panel_id, workspace_id, kind, context, at) = row?;
            let kind = EventType::parse(&kind)
                .ok_or_else(|| TreeStoreError::CorruptRow(format!("unknown event kind {kind}")))?;
            let context = serde_json::from_str(&context)
                .map_err(|e| TreeStoreError::CorruptRow(format!("bad event context JSON: {e}")))?;
            out.push(Event {
                panel_id: PanelId(panel_id),
                workspace_id: WorkspaceId(workspace_id),
                kind,
                context,
                at,
            });
        }
        Ok(out)
    }
}

/// Rewrite the live children of `parent` (within the connection's implicit
/// workspace scope) to dense `[0, n)` positions, in current order, inside
/// the caller's transaction.
fn normalize_positions_tx(tx: &rusqlite::Transaction<'_>, parent: Option<&str>) -> Result<(), TreeStoreError> {
    let mut stmt = tx.prepare(
        "SELECT id FROM panels WHERE parent_id IS ?1 AND archived_at IS NULL ORDER BY position, created_at, id",
    )?;
    let ids: Vec<String> = stmt
        .query_map([parent], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);
    for (position, id) in ids.into_iter().enumerate() {
        tx.execute(
            "UPDATE panels SET position = ?1 WHERE id = ?2",
            rusqlite::params![position as i64, id],
        )?;
    }
    Ok(())
}
