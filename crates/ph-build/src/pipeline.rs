// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Build Pipeline orchestrator: wires the Git Provisioner,
//! Dependency Installer, Artifact Cache, and a [`Bundler`] together into the
//! twelve-step build algorithm.

use crate::bundler::{BundleOutput, BundleRequest, BundleTarget, Bundler, EsbuildBundler};
use crate::externals;
use crate::html::generate_html;
use crate::manifest::{canonical_source_path, load_manifest, resolve_entry};
use crate::wrapper::{synthesize_wrapper, WRAPPER_FILE_NAME};
use ph_cache::{cache_key, ArtifactCache};
use ph_core::size_caps;
use ph_core::{Artifact, ArtifactKind, BuildOutcome};
use ph_deps::DependencyInstaller;
use ph_git::{GitProvisioner, ProvisionProgress};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info_span, warn};

/// Coarse progress states emitted during one build.
///
/// Every build emits at least `Pending`, `Cloning`, `Building`, and a
/// terminal `Ready` or `Error` — except a cache hit, which emits `Pending`
/// then `Ready` directly without a `Cloning` phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildProgress {
    /// The build request has been accepted; nothing has happened yet.
    Pending,
    /// The Git Provisioner is materialising a disposable worktree.
    Cloning,
    /// Dependencies are being prepared and the bundler is running.
    Building,
    /// The build succeeded and an artifact was produced.
    Ready,
    /// The build failed at some stage.
    Error,
}

type ProgressCallback<'a> = Option<&'a mut dyn FnMut(BuildProgress)>;

/// On-demand panel/worker build pipeline.
///
/// One `BuildPipeline` is shared across all builds for a workspace; it owns
/// no per-build state — every call is independently cacheable by
/// `(kind, absolute source path, commit)`.
pub struct BuildPipeline {
    cache: Arc<dyn ArtifactCache>,
    git: GitProvisioner,
    deps: DependencyInstaller,
    bundler: Arc<dyn Bundler>,
    runtime_root: PathBuf,
    packages_root: Option<PathBuf>,
}

impl BuildPipeline {
    /// Construct a pipeline storing build artifacts in `cache` and
    /// dependency/runtime directories under `runtime_root`.
    #[must_use]
    pub fn new(cache: Arc<dyn ArtifactCache>, runtime_root: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            git: GitProvisioner::default(),
            deps: DependencyInstaller::default(),
            bundler: Arc::new(EsbuildBundler::default()),
            runtime_root: runtime_root.into(),
            packages_root: None,
        }
    }

    /// Use a non-default [`Bundler`] (e.g. a test double).
    #[must_use]
    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = bundler;
        self
    }

    /// Use a non-default [`GitProvisioner`] (e.g. a pinned git binary).
    #[must_use]
    pub fn with_git_provisioner(mut self, git: GitProvisioner) -> Self {
        self.git = git;
        self
    }

    /// Use a non-default [`DependencyInstaller`] (e.g. a pinned package manager).
    #[must_use]
    pub fn with_dependency_installer(mut self, deps: DependencyInstaller) -> Self {
        self.deps = deps;
        self
    }

    /// Root directory under which `workspace:*` packages are resolved.
    #[must_use]
    pub fn with_packages_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.packages_root = Some(root.into());
        self
    }

    /// Build a panel from `source_path` at `version` (branch/commit/tag, or
    /// `None` for the current `HEAD`).
    pub async fn build_panel(
        &self,
        source_path: &Path,
        version: Option<&str>,
        progress: ProgressCallback<'_>,
    ) -> BuildOutcome {
        self.run(ArtifactKind::Panel, source_path, version, progress)
            .await
    }

    /// Build a worker from `source_path` at `version`.
    pub async fn build_worker(
        &self,
        source_path: &Path,
        version: Option<&str>,
        progress: ProgressCallback<'_>,
    ) -> BuildOutcome {
        self.run(ArtifactKind::Worker, source_path, version, progress)
            .await
    }

    async fn run(
        &self,
        kind: ArtifactKind,
        source_path: &Path,
        version: Option<&str>,
        progress: ProgressCallback<'_>,
    ) -> BuildOutcome {
        let span = info_span!("ph_build.run", kind = kind.as_str(), source = %source_path.display());
        let _entered = span.enter();

        let mut progress = progress;
        let mut log = Vec::new();
        emit(&mut progress, BuildProgress::Pending, &mut log, "pending");

        let abs_source = match canonical_source_path(source_path) {
            Ok(p) => p,
            Err(err) => {
                return fail(
                    &mut progress,
                    &mut log,
                    format!("source path not found: {err}"),
                )
            }
        };

        // Step 1: early commit resolution + cache lookup, without checking out.
        if let Ok(Some(commit)) = self.git.resolve_target_commit(&abs_source, version) {
            let key = cache_key(kind.as_str(), &abs_source, &commit);
            match self.cache.get(&key).await {
                Ok(Some(json)) => match serde_json::from_str::<Artifact>(&json) {
                    Ok(artifact) => {
                        log.push(format!("cache hit at commit {commit}"));
                        emit(&mut progress, BuildProgress::Ready, &mut log, "ready");
                        return BuildOutcome::success(artifact);
                    }
                    Err(err) => {
                        warn!(%key, error = %err, "corrupt cache entry, rebuilding");
                    }
                },
                Ok(None) => {}
                Err(err) => warn!(%key, error = %err, "cache read failed, rebuilding"),
            }
        }

        // Step 2: provision a disposable working copy.
        emit(&mut progress, BuildProgress::Cloning, &mut log, "cloning");
        let mut on_git_progress = |p: ProvisionProgress| {
            debug!(?p, "provisioning");
        };
        let provisioned = match self
            .git
            .provision_panel_version(&abs_source, version, Some(&mut on_git_progress))
        {
            Ok(p) => p,
            Err(err) => {
                return fail(&mut progress, &mut log, format!("provisioning failed: {err}"))
            }
        };
        let commit = provisioned.commit().to_string();

        let outcome = self
            .build_at_commit(
                kind,
                &abs_source,
                &commit,
                provisioned.source_path(),
                &mut progress,
                &mut log,
            )
            .await;

        // Cleanup always runs, on every exit path, including this one.
        provisioned.cleanup();
        outcome
    }

    async fn build_at_commit(
        &self,
        kind: ArtifactKind,
        abs_source: &Path,
        commit: &str,
        provisioned_dir: &Path,
        progress: &mut ProgressCallback<'_>,
        log: &mut Vec<String>,
    ) -> BuildOutcome {
        emit(progress, BuildProgress::Building, log, "building");

        // Step 3: manifest load.
        let manifest = match load_manifest(provisioned_dir) {
            Ok(m) => m,
            Err(err) => return fail(progress, log, err.to_string()),
        };

        // Step 4: dependency prep.
        let effective_deps = externals::effective_dependencies(&manifest);
        let runtime_dir = self.runtime_dir_for(kind, abs_source, commit);
        if let Err(err) = std::fs::create_dir_all(&runtime_dir) {
            return fail(
                progress,
                log,
                format!("failed to create runtime directory: {err}"),
            );
        }
        let deps_key = cache_key("deps", abs_source, commit);
        let previous_hash = self.cache.get(&deps_key).await.ok().flatten();
        match self.deps.install(
            &runtime_dir,
            &effective_deps,
            previous_hash.as_deref(),
            self.packages_root.as_deref(),
        ) {
            Ok(Some(new_hash)) => {
                if let Err(err) = self.cache.put(&deps_key, &new_hash).await {
                    warn!(error = %err, "failed to persist dependency hash");
                }
                log.push(format!(
                    "dependencies installed ({} packages)",
                    effective_deps.len()
                ));
            }
            Ok(None) => log.push("no dependencies to install".to_string()),
            Err(err) => return fail(progress, log, err.to_string()),
        }

        // Step 5: entry resolution.
        let relative_entry = match resolve_entry(provisioned_dir, &manifest) {
            Ok(e) => e,
            Err(err) => return fail(progress, log, err.to_string()),
        };
        let absolute_entry = provisioned_dir.join(&relative_entry);

        // Step 6: wrapper synthesis. Deterministic in (has_framework,
        // relative entry) alone, so it is never part of the cache key.
        let has_framework = externals::wants_framework_wrapper(&manifest);
        let entry_specifier = absolute_entry.to_string_lossy().into_owned();
        let wrapper_source = synthesize_wrapper(&entry_specifier, has_framework);
        let wrapper_path = runtime_dir.join(WRAPPER_FILE_NAME);
        if let Err(err) = std::fs::write(&wrapper_path, wrapper_source) {
            return fail(
                progress,
                log,
                format!("failed to write wrapper entry: {err}"),
            );
        }

        // Step 7: external resolution.
        let resolved_externals = externals::resolve_externals(&manifest, &effective_deps);

        // Step 8/9: bundling.
        let target = match kind {
            ArtifactKind::Panel => BundleTarget::Panel,
            ArtifactKind::Worker => BundleTarget::Worker,
        };
        let request = BundleRequest {
            target,
            runtime_dir: &runtime_dir,
            entry_file: WRAPPER_FILE_NAME,
            externals: &resolved_externals,
            has_framework,
        };
        let bundle_output: BundleOutput = match self.bundler.bundle(&request) {
            Ok(out) => out,
            Err(err) => return fail(progress, log, err.to_string()),
        };
        log.push("bundle produced".to_string());

        // Step 10: size gates. Bundle and CSS are checked here; HTML is
        // checked once it has been generated below.
        if bundle_output.bundle.len() > size_caps::BUNDLE_MAX_BYTES {
            return fail(
                progress,
                log,
                format!(
                    "bundle size {} bytes exceeds cap of {} bytes",
                    bundle_output.bundle.len(),
                    size_caps::BUNDLE_MAX_BYTES
                ),
            );
        }
        if let Some(css) = &bundle_output.css {
            if css.len() > size_caps::CSS_MAX_BYTES {
                return fail(
                    progress,
                    log,
                    format!(
                        "css size {} bytes exceeds cap of {} bytes",
                        css.len(),
                        size_caps::CSS_MAX_BYTES
                    ),
                );
            }
        }

        let artifact = match kind {
            ArtifactKind::Worker => Artifact::Worker {
                bundle: bundle_output.bundle,
                manifest: manifest.clone(),
                build_log: log.clone(),
            },
            ArtifactKind::Panel => {
                // Step 8: use an existing index.html verbatim if present.
                let existing_html =
                    std::fs::read_to_string(provisioned_dir.join("index.html")).ok();
                let html = generate_html(
                    existing_html.as_deref(),
                    &resolved_externals,
                    bundle_output.css.is_some(),
                    "bundle.js",
                    "bundle.css",
                );
                if html.len() > size_caps::HTML_MAX_BYTES {
                    return fail(
                        progress,
                        log,
                        format!(
                            "html size {} bytes exceeds cap of {} bytes",
                            html.len(),
                            size_caps::HTML_MAX_BYTES
                        ),
                    );
                }
                Artifact::Panel {
                    bundle: bundle_output.bundle,
                    html,
                    css: bundle_output.css,
                    manifest: manifest.clone(),
                    build_log: log.clone(),
                }
            }
        };

        // Step 11: cache. Only successful results are ever stored.
        let key = cache_key(kind.as_str(), abs_source, commit);
        let serialized = serde_json::to_string(&artifact).expect("artifact always serializes");
        if let Err(err) = self.cache.put(&key, &serialized).await {
            warn!(%key, error = %err, "failed to persist build artifact");
        }

        emit(progress, BuildProgress::Ready, log, "ready");
        BuildOutcome::success(artifact)
    }

    /// Per-`(kind, source, commit)` runtime directory: holds the synthetic
    /// manifest, `node_modules`, and the wrapper entry. Persists across
    /// builds at the same commit so the dependency-hash skip has something
    /// to skip *to*; only the provisioner's disposable source tree is torn
    /// down per build.
    fn runtime_dir_for(&self, kind: ArtifactKind, abs_source: &Path, commit: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(abs_source.to_string_lossy().as_bytes());
        let digest = hasher.finalize();
        let digest_hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.runtime_root
            .join(kind.as_str())
            .join(digest_hex)
            .join(commit)
    }
}

fn emit(
    progress: &mut ProgressCallback<'_>,
    state: BuildProgress,
    log: &mut Vec<String>,
    message: &str,
) {
    log.push(message.to_string());
    if let Some(cb) = progress.as_deref_mut() {
        cb(state);
    }
}

fn fail(
    progress: &mut ProgressCallback<'_>,
    log: &mut Vec<String>,
    error: impl Into<String>,
) -> BuildOutcome {
    let error = error.into();
    log.push(format!("error: {error}"));
    if let Some(cb) = progress.as_deref_mut() {
        cb(BuildProgress::Error);
    }
    BuildOutcome::failure(error, log.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use ph_cache::InMemoryArtifactCache;
    use std::process::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBundler {
        calls: AtomicUsize,
    }

    impl Bundler for CountingBundler {
        fn bundle(&self, _request: &BundleRequest) -> Result<BundleOutput, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BundleOutput {
                bundle: "console.log('hello');".to_string(),
                css: None,
            })
        }
    }

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            assert!(Command::new("git")
                .args(args)
                .current_dir(dir)
                .status()
                .expect("spawn git")
                .success());
        };
        run(&["init", "--quiet"]);
        std::fs::write(
            dir.join("panel.manifest.json"),
            r#"{"title":"Editor"}"#,
        )
        .unwrap();
        std::fs::write(dir.join("index.ts"), "export default 1;\n").unwrap();
        run(&["add", "-A"]);
        run(&[
            "-c",
            "user.name=t",
            "-c",
            "user.email=t@local",
            "commit",
            "-qm",
            "one",
        ]);
    }

    #[tokio::test]
    async fn build_panel_with_no_dependencies_succeeds_and_then_hits_cache() {
        let source = tempfile::tempdir().unwrap();
        init_repo(source.path());
        let runtime_root = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let bundler = Arc::new(CountingBundler {
            calls: AtomicUsize::new(0),
        });
        let pipeline = BuildPipeline::new(cache, runtime_root.path())
            .with_bundler(bundler.clone());

        let outcome = pipeline.build_panel(source.path(), None, None).await;
        assert!(outcome.is_success(), "{outcome:?}");
        assert_eq!(bundler.calls.load(Ordering::SeqCst), 1);

        // Second call for the same commit must hit the cache and never
        // invoke the bundler again.
        let outcome2 = pipeline.build_panel(source.path(), None, None).await;
        assert!(outcome2.is_success());
        assert_eq!(bundler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_manifest_produces_structured_failure() {
        let source = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(source.path())
                .status()
                .unwrap()
        };
        run(&["init", "--quiet"]);
        std::fs::write(source.path().join("index.ts"), "export default 1;\n").unwrap();
        run(&["add", "-A"]);
        run(&[
            "-c",
            "user.name=t",
            "-c",
            "user.email=t@local",
            "commit",
            "-qm",
            "one",
        ]);

        let runtime_root = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let pipeline = BuildPipeline::new(cache, runtime_root.path());

        let outcome = pipeline.build_panel(source.path(), None, None).await;
        match outcome {
            BuildOutcome::Failure { error, build_log, .. } => {
                assert!(error.contains("manifest"));
                assert!(!build_log.is_empty());
            }
            BuildOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn progress_emits_pending_then_ready_on_cache_hit() {
        let source = tempfile::tempdir().unwrap();
        init_repo(source.path());
        let runtime_root = tempfile::tempdir().unwrap();
        let cache = Arc::new(InMemoryArtifactCache::new());
        let bundler = Arc::new(CountingBundler {
            calls: AtomicUsize::new(0),
        });
        let pipeline = BuildPipeline::new(cache, runtime_root.path()).with_bundler(bundler);

        pipeline.build_panel(source.path(), None, None).await;

        let mut states = Vec::new();
        let mut cb = |s: BuildProgress| states.push(s);
        pipeline
            .build_panel(source.path(), None, Some(&mut cb))
            .await;
        assert_eq!(states, vec![BuildProgress::Pending, BuildProgress::Ready]);
    }
}
