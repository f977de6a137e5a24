// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use ph_build::BuildPipeline;
use ph_cache::FsArtifactCache;
use ph_config::PanelHostConfig;
use ph_core::panel::WorkspaceId;
use ph_daemon::{build_app, AppState};
use ph_deps::DependencyInstaller;
use ph_git::GitProvisioner;
use ph_tree_store::{sanitize_workspace_filename, Engine};
use ph_typedefs::{TypeDefService, TypeDefServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ph-daemon", version, about = "panelhost control-plane daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// TOML configuration file; falls back to defaults when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Active workspace identifier. Switching workspace means restarting
    /// the daemon against a different one (ph-tree-store's single-open-handle
    /// policy).
    #[arg(long, default_value = "default")]
    workspace_id: String,

    /// Root directory for build-runtime directories owned by the pipeline.
    #[arg(long, default_value = "./data/build-runtime")]
    build_runtime_root: PathBuf,

    /// Optional root directory for `workspace:*` local package resolution.
    #[arg(long)]
    packages_root: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("ph=debug")
    } else {
        EnvFilter::new("ph=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => PanelHostConfig::load(path).with_context(|| format!("load config {}", path.display()))?,
        None => PanelHostConfig::default(),
    };
    for warning in config.validate().context("validate config")? {
        tracing::warn!(%warning, "configuration warning");
    }

    let db_path = config
        .workspace_db_root
        .join(sanitize_workspace_filename(&args.workspace_id));
    let tree = Engine::open(&db_path, WorkspaceId::from(args.workspace_id.clone()))
        .with_context(|| format!("open tree store at {}", db_path.display()))?;

    let cache = Arc::new(FsArtifactCache::new(
        config.artifact_cache_root.clone(),
        config.dev_cache_bypass,
    ));
    let mut build = BuildPipeline::new(cache, args.build_runtime_root.clone())
        .with_bundler(Arc::new(ph_build::EsbuildBundler::new(config.bundler_bin.clone())))
        .with_git_provisioner(GitProvisioner::new(config.git_bin.clone()))
        .with_dependency_installer(DependencyInstaller::new(config.package_manager_bin.clone()));
    if let Some(root) = args.packages_root.clone() {
        build = build.with_packages_root(root);
    }

    let types = Arc::new(TypeDefService::new(TypeDefServiceConfig {
        consumer_root: config.typedef_root.clone(),
        cache_capacity: config.typedef_cache_capacity,
        debounce: std::time::Duration::from_millis(config.typedef_debounce_ms),
        max_retries: config.typedef_max_retries,
        package_manager_bin: config.package_manager_bin.clone(),
        local_packages_root: args.packages_root,
        ..Default::default()
    }));

    let state = Arc::new(AppState { tree, build, types });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, workspace = %args.workspace_id, "ph-daemon listening");

    axum::serve(listener, app).await.context("serve")
}
