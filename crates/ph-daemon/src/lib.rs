// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! ph-daemon
//!
//! A thin HTTP adapter over the panelhost core contracts: tree
//! mutation, the Build Pipeline, the `ns://` codec, and the Type-Definition
//! Service. Carries no business logic of its own.

use axum::{
    extract::{Path as AxPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use ph_build::BuildPipeline;
use ph_core::panel::{PanelId, PanelSummary, Snapshot};
use ph_core::{CoreError, TypeDefResult};
use ph_ns_url::{build_ns_url, parse_ns_url, NsAddress, NsUrlOpts};
use ph_tree_store::{Engine, TreeStoreError, UpdatePanelFields};
use ph_typedefs::TypeDefService;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Schema/contract version reported by `GET /health`.
pub const CONTRACT_VERSION: &str = "1";

/// Shared state for every handler.
pub struct AppState {
    /// The active workspace's panel tree.
    pub tree: Engine,
    /// Content-addressed build pipeline.
    pub build: BuildPipeline,
    /// Batched type-definition installer.
    pub types: Arc<TypeDefService>,
}

/// Uniform error response shape for every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Build an error with an explicit status and message.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Map every [`CoreError`] category to a stable HTTP status.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Repaired(_) => StatusCode::OK,
            CoreError::SizePolicyViolation(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::ResourceConflict(_) => StatusCode::CONFLICT,
            CoreError::PeerConflict(_) => StatusCode::CONFLICT,
            CoreError::CycleDetected(_) => StatusCode::CONFLICT,
            CoreError::WorkspaceAbsent => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<TreeStoreError> for ApiError {
    fn from(err: TreeStoreError) -> Self {
        CoreError::from(err).into()
    }
}

/// Build the Axum router with every route this daemon serves.
#[must_use]
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/panels/roots", get(cmd_roots))
        .route("/panels/{id}", get(cmd_get_panel).patch(cmd_update_panel))
        .route("/panels/{id}/children", get(cmd_children))
        .route("/panels/{id}/ancestors", get(cmd_ancestors))
        .route("/panels", post(cmd_create_panel))
        .route("/panels/{id}/move", post(cmd_move_panel))
        .route("/panels/{id}/archive", post(cmd_archive))
        .route("/panels/{id}/unarchive", post(cmd_unarchive))
        .route("/panels/{id}/select-path", post(cmd_select_path))
        .route("/build/panel", post(cmd_build_panel))
        .route("/build/worker", post(cmd_build_worker))
        .route("/ns/parse", get(cmd_ns_parse))
        .route("/ns/build", get(cmd_ns_build))
        .route("/types", post(cmd_types))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "contract_version": CONTRACT_VERSION,
        "time": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RootsResponse {
    All(Vec<PanelSummary>),
    Page(ph_core::panel::Page<PanelSummary>),
}

async fn cmd_roots(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> Result<Json<RootsResponse>, ApiError> {
    match (q.limit, q.offset) {
        (Some(limit), offset) => {
            let page = state.tree.roots_page(limit, offset.unwrap_or(0))?;
            Ok(Json(RootsResponse::Page(page)))
        }
        (None, _) => Ok(Json(RootsResponse::All(state.tree.roots()?))),
    }
}

async fn cmd_get_panel(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ph_core::panel::Panel>, ApiError> {
    let id = PanelId::from(id);
    state
        .tree
        .get_panel(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("panel not found: {id}")))
}

async fn cmd_children(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PanelSummary>>, ApiError> {
    Ok(Json(state.tree.children(&PanelId::from(id))?))
}

async fn cmd_ancestors(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PanelSummary>>, ApiError> {
    Ok(Json(state.tree.ancestors(&PanelId::from(id))?))
}

#[derive(Debug, Deserialize)]
struct CreatePanelRequest {
    parent_id: Option<String>,
    title: String,
    snapshot: Snapshot,
}

async fn cmd_create_panel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePanelRequest>,
) -> Result<Json<ph_core::panel::Panel>, ApiError> {
    let panel = state
        .tree
        .create_panel(req.parent_id.map(PanelId::from), req.title, req.snapshot)?;
    info!(panel_id = %panel.id, "panel created");
    Ok(Json(panel))
}

#[derive(Debug, Default, Deserialize)]
struct PatchPanelRequest {
    title: Option<String>,
    collapsed: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_optional")]
    selected_child_id: Option<Option<String>>,
    runtime_meta: Option<String>,
}

/// Distinguishes "field absent" from "field present but null" for
/// `selected_child_id`, so a client can clear it with `"selected_child_id":
/// null` rather than needing a separate unset-vs-clear signal.
fn deserialize_optional_optional<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

async fn cmd_update_panel(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PatchPanelRequest>,
) -> Result<Json<ph_core::panel::Panel>, ApiError> {
    let fields = UpdatePanelFields {
        title: req.title,
        collapsed: req.collapsed,
        selected_child_id: req.selected_child_id.map(|v| v.map(PanelId::from)),
        runtime_meta: req.runtime_meta,
    };
    Ok(Json(state.tree.update(&PanelId::from(id), fields)?))
}

#[derive(Debug, Deserialize)]
struct MovePanelRequest {
    new_parent_id: Option<String>,
    new_position: i64,
}

async fn cmd_move_panel(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MovePanelRequest>,
) -> Result<Json<ph_core::panel::Panel>, ApiError> {
    let panel = state.tree.move_panel(
        &PanelId::from(id),
        req.new_parent_id.map(PanelId::from),
        req.new_position,
    )?;
    Ok(Json(panel))
}

async fn cmd_archive(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ph_core::panel::Panel>, ApiError> {
    Ok(Json(state.tree.archive(&PanelId::from(id))?))
}

async fn cmd_unarchive(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ph_core::panel::Panel>, ApiError> {
    Ok(Json(state.tree.unarchive(&PanelId::from(id))?))
}

async fn cmd_select_path(
    AxPath(id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.tree.propagate_selected_path(&PanelId::from(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct BuildRequest {
    source_path: PathBuf,
    version: Option<String>,
}

async fn cmd_build_panel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildRequest>,
) -> Json<ph_core::BuildOutcome> {
    let outcome = state
        .build
        .build_panel(&req.source_path, req.version.as_deref(), None)
        .await;
    Json(outcome)
}

async fn cmd_build_worker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildRequest>,
) -> Json<ph_core::BuildOutcome> {
    let outcome = state
        .build
        .build_worker(&req.source_path, req.version.as_deref(), None)
        .await;
    Json(outcome)
}

#[derive(Debug, Deserialize)]
struct NsParseQuery {
    url: String,
}

async fn cmd_ns_parse(Query(q): Query<NsParseQuery>) -> Result<Json<NsAddress>, ApiError> {
    parse_ns_url(&q.url)
        .map(Json)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Debug, Deserialize)]
struct NsBuildRequest {
    source: String,
    #[serde(default)]
    opts: NsUrlOpts,
}

#[derive(Debug, Serialize)]
struct NsBuildResponse {
    url: String,
}

async fn cmd_ns_build(Json(req): Json<NsBuildRequest>) -> Json<NsBuildResponse> {
    Json(NsBuildResponse {
        url: build_ns_url(&req.source, &req.opts),
    })
}

#[derive(Debug, Deserialize)]
struct TypesRequest {
    consumer_path: PathBuf,
    names: Vec<String>,
}

async fn cmd_types(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TypesRequest>,
) -> Json<HashMap<String, TypeDefResult>> {
    Json(state.types.get_package_types(&req.consumer_path, &req.names).await)
}
