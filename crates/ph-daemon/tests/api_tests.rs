// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface tests for ph-daemon, exercised through `tower::ServiceExt`
//! without binding a real socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ph_build::BuildPipeline;
use ph_cache::InMemoryArtifactCache;
use ph_core::panel::{Snapshot, WorkspaceId};
use ph_daemon::{build_app, AppState};
use ph_tree_store::Engine;
use ph_typedefs::{TypeDefService, TypeDefServiceConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_state(tmp: &std::path::Path) -> Arc<AppState> {
    let tree = Engine::open_in_memory(WorkspaceId::from("w1".to_string())).unwrap();
    let build = BuildPipeline::new(Arc::new(InMemoryArtifactCache::new()), tmp.join("runtime"));
    let types = Arc::new(TypeDefService::new(TypeDefServiceConfig {
        consumer_root: tmp.join("typedefs"),
        ..TypeDefServiceConfig::default()
    }));
    Arc::new(AppState { tree, build, types })
}

async fn call(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_contract_version() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, json) = call(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["contract_version"], "1");
    assert!(json.get("time").is_some());
}

#[tokio::test]
async fn create_then_get_panel_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, created) = call(
        app.clone(),
        post_json(
            "/panels",
            json!({
                "title": "Editor",
                "snapshot": {"source": "panels/editor", "panel_type": "editor", "options": "{}"},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = call(app, get(&format!("/panels/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Editor");
}

#[tokio::test]
async fn get_unknown_panel_returns_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, json) = call(app, get("/panels/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn roots_lists_created_panels_and_supports_paging() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    for i in 0..3 {
        let (status, _) = call(
            app.clone(),
            post_json(
                "/panels",
                json!({
                    "title": format!("Panel {i}"),
                    "snapshot": {"source": "panels/a", "panel_type": "editor", "options": "{}"},
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, all) = call(app.clone(), get("/panels/roots")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (status, page) = call(app, get("/panels/roots?limit=2&offset=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert!(page["has_more"].as_bool().unwrap());
}

#[tokio::test]
async fn patch_panel_updates_title_and_clears_selected_child() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (_, parent) = call(
        app.clone(),
        post_json(
            "/panels",
            json!({"title": "Parent", "snapshot": {"source": "panels/a", "panel_type": "editor", "options": "{}"}}),
        ),
    )
    .await;
    let parent_id = parent["id"].as_str().unwrap().to_string();

    let (_, child) = call(
        app.clone(),
        post_json(
            "/panels",
            json!({
                "parent_id": parent_id,
                "title": "Child",
                "snapshot": {"source": "panels/b", "panel_type": "editor", "options": "{}"},
            }),
        ),
    )
    .await;
    let child_id = child["id"].as_str().unwrap().to_string();

    let (status, updated) = call(
        app.clone(),
        patch_json(
            &format!("/panels/{parent_id}"),
            json!({"title": "Renamed", "selected_child_id": child_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Renamed");
    assert_eq!(updated["selected_child_id"], child_id);

    let (status, cleared) = call(
        app,
        patch_json(&format!("/panels/{parent_id}"), json!({"selected_child_id": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["selected_child_id"].is_null());
}

#[tokio::test]
async fn archive_then_unarchive_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (_, panel) = call(
        app.clone(),
        post_json(
            "/panels",
            json!({"title": "P", "snapshot": {"source": "panels/a", "panel_type": "editor", "options": "{}"}}),
        ),
    )
    .await;
    let id = panel["id"].as_str().unwrap().to_string();

    let (status, archived) = call(app.clone(), post_json(&format!("/panels/{id}/archive"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!archived["archived_at"].is_null());

    let (status, live) = call(app, post_json(&format!("/panels/{id}/unarchive"), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(live["archived_at"].is_null());
}

#[tokio::test]
async fn ns_parse_and_build_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, parsed) = call(app.clone(), get("/ns/parse?url=ns://panels/editor")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed["source"], "panels/editor");

    let (status, built) = call(
        app,
        post_json("/ns/build", json!({"source": "panels/editor", "opts": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(built["url"].as_str().unwrap().starts_with("ns://"));
}

#[tokio::test]
async fn types_request_short_circuits_skip_listed_names() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_app(test_state(tmp.path()));

    let (status, json) = call(
        app,
        post_json(
            "/types",
            json!({"consumer_path": tmp.path(), "names": ["node:fs", "crypto"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["node:fs"]["skipped"], true);
    assert_eq!(json["crypto"]["skipped"], true);
}
