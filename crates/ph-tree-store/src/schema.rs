// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted schema and migration runner.
//!
//! Each entry in [`MIGRATIONS`] is a plain SQL string applied inside a single
//! transaction; the schema_version row is advanced only after every
//! statement in a migration succeeds. A fresh database runs every migration
//! in order, so the "initial schema" and "migration 1" are the same thing.

use crate::error::TreeStoreError;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version this build expects. Bump when adding a migration.
pub const PANEL_SCHEMA_VERSION: i64 = 1;

/// `(version, sql)` pairs applied in order. `sql` may contain multiple
/// statements separated by `;` — `Connection::execute_batch` runs them all
/// inside the caller's transaction.
const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_1)];

const MIGRATION_1: &str = r#"
CREATE TABLE IF NOT EXISTS panels (
    id                TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    workspace_id      TEXT NOT NULL,
    parent_id         TEXT NULL REFERENCES panels(id),
    position          INTEGER NOT NULL,
    selected_child_id TEXT NULL,
    collapsed         INTEGER NOT NULL DEFAULT 0,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL,
    archived_at       INTEGER NULL,
    history           TEXT NOT NULL,
    history_index     INTEGER NOT NULL,
    runtime_meta      TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_panels_parent ON panels(parent_id);
CREATE INDEX IF NOT EXISTS idx_panels_workspace ON panels(workspace_id);
CREATE INDEX IF NOT EXISTS idx_panels_archived ON panels(archived_at);

CREATE TABLE IF NOT EXISTS events (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    panel_id     TEXT NOT NULL,
    workspace_id TEXT NOT NULL,
    kind         TEXT NOT NULL,
    context      TEXT NOT NULL,
    at           INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_at ON events(at DESC);

CREATE TABLE IF NOT EXISTS schema_version (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS panels_fts USING fts5(title, content='');

CREATE TRIGGER IF NOT EXISTS panels_fts_ai AFTER INSERT ON panels BEGIN
    INSERT INTO panels_fts(rowid, title) VALUES (new.rowid, new.title);
END;

CREATE TRIGGER IF NOT EXISTS panels_fts_ad AFTER DELETE ON panels BEGIN
    INSERT INTO panels_fts(panels_fts, rowid, title) VALUES ('delete', old.rowid, old.title);
END;

CREATE TRIGGER IF NOT EXISTS panels_fts_au AFTER UPDATE OF title ON panels BEGIN
    INSERT INTO panels_fts(panels_fts, rowid, title) VALUES ('delete', old.rowid, old.title);
    INSERT INTO panels_fts(rowid, title) VALUES (new.rowid, new.title);
END;
"#;

/// Open the version row, applying every pending migration in order inside a
/// single transaction. A fresh database is seeded at [`PANEL_SCHEMA_VERSION`].
pub(crate) fn run_migrations(conn: &mut Connection) -> Result<(), TreeStoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (id INTEGER PRIMARY KEY CHECK (id = 1), version INTEGER NOT NULL);",
    )?;
    let current: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |r| r.get(0))
        .unwrap_or(0);

    let tx = conn.transaction()?;
    let mut applied = current;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        debug!(target: "ph.tree_store", version, "applying migration");
        tx.execute_batch(sql)?;
        applied = *version;
    }
    tx.execute(
        "INSERT INTO schema_version (id, version) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
        [applied],
    )?;
    tx.commit()?;
    if applied != current {
        info!(target: "ph.tree_store", from = current, to = applied, "schema migrated");
    }
    Ok(())
}
