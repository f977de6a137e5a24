// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-tree-store
//!
//! The durable, workspace-scoped Panel Tree Store: a `rusqlite`
//! forest with history, position ordering, soft-delete, and selected-path
//! propagation. One [`Engine`] owns exactly one open SQLite connection per
//! workspace.

mod engine;
mod error;
mod schema;

pub use engine::{sanitize_workspace_filename, Engine, UpdatePanelFields};
pub use error::TreeStoreError;
pub use schema::PANEL_SCHEMA_VERSION;

#[cfg(test)]
mod tests {
    use super::*;
    use ph_core::event::EventType;
    use ph_core::panel::{PanelId, Snapshot, WorkspaceId};

    fn engine() -> Engine {
        Engine::open_in_memory(WorkspaceId::from("ws1")).unwrap()
    }

    #[test]
    fn create_panel_is_a_root_at_position_zero() {
        let e = engine();
        let p = e
            .create_panel(None, "Editor".to_string(), Snapshot::new("panels/editor", "editor"))
            .unwrap();
        assert_eq!(p.position, 0);
        assert_eq!(p.history_index, 0);
        assert_eq!(p.history.len(), 1);
        assert!(p.parent_id.is_none());
        assert_eq!(e.panel_count().unwrap(), 1);
    }

    #[test]
    fn creation_shifts_existing_siblings() {
        let e = engine();
        let first = e
            .create_panel(None, "A".to_string(), Snapshot::new("panels/a", "editor"))
            .unwrap();
        let _second = e
            .create_panel(None, "B".to_string(), Snapshot::new("panels/b", "editor"))
            .unwrap();
        let first = e.get_panel(&first.id).unwrap().unwrap();
        assert_eq!(first.position, 1);
        let roots = e.roots().unwrap();
        assert_eq!(roots[0].title, "B");
        assert_eq!(roots[1].title, "A");
    }

    #[test]
    fn children_and_siblings_are_scoped_correctly() {
        let e = engine();
        let parent = e
            .create_panel(None, "Parent".to_string(), Snapshot::new("panels/p", "editor"))
            .unwrap();
        let child_a = e
            .create_panel(
                Some(parent.id.clone()),
                "A".to_string(),
                Snapshot::new("panels/a", "editor"),
            )
            .unwrap();
        let child_b = e
            .create_panel(
                Some(parent.id.clone()),
                "B".to_string(),
                Snapshot::new("panels/b", "editor"),
            )
            .unwrap();
        let children = e.children(&parent.id).unwrap();
        assert_eq!(children.len(), 2);
        let siblings = e.siblings(&child_a.id).unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].id, child_b.id);
    }

    #[test]
    fn ancestors_walks_root_to_parent() {
        let e = engine();
        let root = e
            .create_panel(None, "Root".to_string(), Snapshot::new("panels/root", "editor"))
            .unwrap();
        let mid = e
            .create_panel(Some(root.id.clone()), "Mid".to_string(), Snapshot::new("panels/mid", "editor"))
            .unwrap();
        let leaf = e
            .create_panel(Some(mid.id.clone()), "Leaf".to_string(), Snapshot::new("panels/leaf", "editor"))
            .unwrap();
        let ancestors = e.ancestors(&leaf.id).unwrap();
        assert_eq!(ancestors.len(), 2);
        assert_eq!(ancestors[0].id, root.id);
        assert_eq!(ancestors[1].id, mid.id);
    }

    #[test]
    fn move_panel_renormalises_both_parents() {
        let e = engine();
        let root_a = e
            .create_panel(None, "A".to_string(), Snapshot::new("panels/a", "editor"))
            .unwrap();
        let root_b = e
            .create_panel(None, "B".to_string(), Snapshot::new("panels/b", "editor"))
            .unwrap();
        let child = e
            .create_panel(Some(root_a.id.clone()), "Child".to_string(), Snapshot::new("panels/c", "editor"))
            .unwrap();
        e.move_panel(&child.id, Some(root_b.id.clone()), 0).unwrap();
        assert!(e.children(&root_a.id).unwrap().is_empty());
        let b_children = e.children(&root_b.id).unwrap();
        assert_eq!(b_children.len(), 1);
        assert_eq!(b_children[0].position, 0);
    }

    #[test]
    fn move_panel_clears_old_parents_selected_child() {
        let e = engine();
        let root_a = e
            .create_panel(None, "A".to_string(), Snapshot::new("panels/a", "editor"))
            .unwrap();
        let root_b = e
            .create_panel(None, "B".to_string(), Snapshot::new("panels/b", "editor"))
            .unwrap();
        let child = e
            .create_panel(Some(root_a.id.clone()), "Child".to_string(), Snapshot::new("panels/c", "editor"))
            .unwrap();
        e.propagate_selected_path(&child.id).unwrap();
        assert_eq!(e.get_panel(&root_a.id).unwrap().unwrap().selected_child_id, Some(child.id.clone()));

        e.move_panel(&child.id, Some(root_b.id.clone()), 0).unwrap();
        let root_a = e.get_panel(&root_a.id).unwrap().unwrap();
        assert_eq!(root_a.selected_child_id, None);
    }

    #[test]
    fn move_panel_within_same_parent_keeps_selected_child() {
        let e = engine();
        let root = e
            .create_panel(None, "Root".to_string(), Snapshot::new("panels/root", "editor"))
            .unwrap();
        let a = e
            .create_panel(Some(root.id.clone()), "A".to_string(), Snapshot::new("panels/a", "editor"))
            .unwrap();
        let _b = e
            .create_panel(Some(root.id.clone()), "B".to_string(), Snapshot::new("panels/b", "editor"))
            .unwrap();
        e.propagate_selected_path(&a.id).unwrap();
        e.move_panel(&a.id, Some(root.id.clone()), 1).unwrap();
        let root = e.get_panel(&root.id).unwrap().unwrap();
        assert_eq!(root.selected_child_id, Some(a.id));
    }

    #[test]
    fn move_panel_rejects_cross_workspace_target() {
        let e = engine();
        let foreign = Engine::open_in_memory(WorkspaceId::from("ws2")).unwrap();
        let foreign_root = foreign
            .create_panel(None, "Foreign".to_string(), Snapshot::new("panels/f", "editor"))
            .unwrap();
        let local = e
            .create_panel(None, "Local".to_string(), Snapshot::new("panels/l", "editor"))
            .unwrap();
        let err = e.move_panel(&local.id, Some(foreign_root.id), 0).unwrap_err();
        assert!(matches!(err, TreeStoreError::NotFound(_)));
    }

    #[test]
    fn archive_excludes_from_children_and_renormalises() {
        let e = engine();
        let root = e
            .create_panel(None, "Root".to_string(), Snapshot::new("panels/root", "editor"))
            .unwrap();
        let a = e
            .create_panel(Some(root.id.clone()), "A".to_string(), Snapshot::new("panels/a", "editor"))
            .unwrap();
        let b = e
            .create_panel(Some(root.id.clone()), "B".to_string(), Snapshot::new("panels/b", "editor"))
            .unwrap();
        e.archive(&b.id).unwrap();
        let children = e.children(&root.id).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, a.id);
        assert_eq!(children[0].position, 0);
        // archived panels stay readable by id.
        let archived = e.get_panel(&b.id).unwrap().unwrap();
        assert!(archived.is_archived());
    }

    #[test]
    fn unarchive_restores_visibility() {
        let e = engine();
        let root = e
            .create_panel(None, "Root".to_string(), Snapshot::new("panels/root", "editor"))
            .unwrap();
        e.archive(&root.id).unwrap();
        assert!(e.roots().unwrap().is_empty());
        e.unarchive(&root.id).unwrap();
        assert_eq!(e.roots().unwrap().len(), 1);
    }

    #[test]
    fn update_merges_only_supplied_fields() {
        let e = engine();
        let p = e
            .create_panel(None, "Original".to_string(), Snapshot::new("panels/p", "editor"))
            .unwrap();
        let updated = e.set_title(&p.id, "Renamed".to_string()).unwrap();
        assert_eq!(updated.title, "Renamed");
        assert!(!updated.collapsed);
    }

    #[test]
    fn replace_history_rejects_out_of_range_index() {
        let e = engine();
        let p = e
            .create_panel(None, "P".to_string(), Snapshot::new("panels/p", "editor"))
            .unwrap();
        let err = e.replace_history(&p.id, vec![Snapshot::new("panels/p", "editor")], 5).unwrap_err();
        assert!(matches!(err, TreeStoreError::CorruptRow(_)));
    }

    #[test]
    fn selected_path_propagates_up_the_chain() {
        let e = engine();
        let root = e
            .create_panel(None, "Root".to_string(), Snapshot::new("panels/root", "editor"))
            .unwrap();
        let mid = e
            .create_panel(Some(root.id.clone()), "Mid".to_string(), Snapshot::new("panels/mid", "editor"))
            .unwrap();
        let leaf = e
            .create_panel(Some(mid.id.clone()), "Leaf".to_string(), Snapshot::new("panels/leaf", "editor"))
            .unwrap();
        e.propagate_selected_path(&leaf.id).unwrap();
        let root = e.get_panel(&root.id).unwrap().unwrap();
        let mid = e.get_panel(&mid.id).unwrap().unwrap();
        assert_eq!(root.selected_child_id, Some(mid.id.clone()));
        assert_eq!(mid.selected_child_id, Some(leaf.id));
    }

    #[test]
    fn events_round_trip_and_order_newest_first() {
        let e = engine();
        let p = e
            .create_panel(None, "P".to_string(), Snapshot::new("panels/p", "editor"))
            .unwrap();
        e.append_event(&p.id, EventType::Focused, serde_json::json!({"via": "test"}))
            .unwrap();
        let events = e.recent_events(10).unwrap();
        // `create_panel` itself appends a `Created` event, so the focused
        // event (appended second) must sort first.
        assert_eq!(events[0].kind, EventType::Focused);
        assert_eq!(events[1].kind, EventType::Created);
    }

    #[test]
    fn pagination_reports_total_and_has_more() {
        let e = engine();
        for i in 0..5 {
            e.create_panel(None, format!("P{i}"), Snapshot::new("panels/p", "editor")).unwrap();
        }
        let page = e.roots_page(2, 0).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        let last_page = e.roots_page(2, 4).unwrap();
        assert_eq!(last_page.items.len(), 1);
        assert!(!last_page.has_more);
    }

    #[test]
    fn set_collapsed_batch_updates_every_id() {
        let e = engine();
        let a = e.create_panel(None, "A".to_string(), Snapshot::new("panels/a", "editor")).unwrap();
        let b = e.create_panel(None, "B".to_string(), Snapshot::new("panels/b", "editor")).unwrap();
        e.set_collapsed_batch(&[a.id.clone(), b.id.clone()], true).unwrap();
        assert!(e.get_panel(&a.id).unwrap().unwrap().collapsed);
        assert!(e.get_panel(&b.id).unwrap().unwrap().collapsed);
    }

    #[test]
    fn sanitize_workspace_filename_strips_unsafe_characters() {
        assert_eq!(sanitize_workspace_filename("../../etc/passwd"), "etc_passwd.sqlite3");
        assert_eq!(sanitize_workspace_filename("ws:1"), "ws_1.sqlite3");
    }

    #[test]
    fn schema_version_constant_is_positive() {
        assert!(PANEL_SCHEMA_VERSION >= 1);
    }

    #[test]
    fn panel_id_is_stable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws1.sqlite3");
        let id = {
            let e = Engine::open(&path, WorkspaceId::from("ws1")).unwrap();
            e.create_panel(None, "Persisted".to_string(), Snapshot::new("panels/p", "editor"))
                .unwrap()
                .id
        };
        let reopened = Engine::open(&path, WorkspaceId::from("ws1")).unwrap();
        let panel = reopened.get_panel(&id).unwrap().unwrap();
        assert_eq!(panel.title, "Persisted");
    }
}
