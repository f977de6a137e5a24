// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Type-Definition Service orchestrator.

use crate::cache::TypeDefCache;
use crate::consumer::{consumer_dir, consumer_hash, KeyedLocks};
use crate::error::TypedefError;
use crate::installer::TypeDefInstaller;
use crate::loader;
use crate::skip::should_skip;
use ph_core::TypeDefResult;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info_span};

/// Configuration for one [`TypeDefService`] instance.
#[derive(Debug, Clone)]
pub struct TypeDefServiceConfig {
    /// Root directory under which per-consumer dependency roots live.
    pub consumer_root: PathBuf,
    /// LRU capacity for the global type-definition cache.
    pub cache_capacity: usize,
    /// Debounce window coalescing concurrent install requests.
    pub debounce: Duration,
    /// Maximum not-found-trim retries per flush.
    pub max_retries: u32,
    /// Package manager binary used to reify consumer directories.
    pub package_manager_bin: String,
    /// Prefix identifying local-workspace package names (e.g. `"@panelhost/"`).
    pub local_package_prefix: String,
    /// Directory containing one subdirectory per local-workspace package,
    /// named by the package name with [`Self::local_package_prefix`] stripped.
    pub local_packages_root: Option<PathBuf>,
}

impl Default for TypeDefServiceConfig {
    fn default() -> Self {
        Self {
            consumer_root: PathBuf::from("./data/typedefs"),
            cache_capacity: ph_core::DEFAULT_TYPEDEF_CACHE_CAPACITY,
            debounce: Duration::from_millis(20),
            max_retries: 5,
            package_manager_bin: "npm".to_string(),
            local_package_prefix: "@panelhost/".to_string(),
            local_packages_root: None,
        }
    }
}

/// Batched, deduplicating type-definition installer.
///
/// One instance is shared process-wide: the LRU cache and the per-consumer
/// lock maps are the synchronization points that make concurrent calls from
/// many consumers safe.
pub struct TypeDefService {
    config: TypeDefServiceConfig,
    cache: TypeDefCache,
    installer: TypeDefInstaller,
    mkdir_locks: KeyedLocks,
    flush_locks: KeyedLocks,
    pending: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl TypeDefService {
    /// Construct a service from `config`.
    #[must_use]
    pub fn new(config: TypeDefServiceConfig) -> Self {
        let installer = TypeDefInstaller::new(config.package_manager_bin.clone(), config.max_retries);
        let cache = TypeDefCache::new(config.cache_capacity);
        Self {
            config,
            cache,
            installer,
            mkdir_locks: KeyedLocks::new(),
            flush_locks: KeyedLocks::new(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch type definitions for `names` on behalf of `consumer_path`.
    pub async fn get_package_types(
        &self,
        consumer_path: &Path,
        names: &[String],
    ) -> HashMap<String, TypeDefResult> {
        let span = info_span!("ph_typedefs.get_package_types", consumer = %consumer_path.display(), count = names.len());
        let _entered = span.enter();

        let mut results = HashMap::new();
        let mut remaining = BTreeSet::new();

        for name in names {
            if should_skip(name) {
                results.insert(name.clone(), TypeDefResult::skipped());
                continue;
            }
            if let Some(local) = self.resolve_local(name) {
                results.insert(name.clone(), local);
                continue;
            }
            if let Some(entry) = self.cache.get(name).await {
                results.insert(name.clone(), TypeDefResult::from_cache_entry(entry));
                continue;
            }
            remaining.insert(name.clone());
        }

        if remaining.is_empty() {
            return results;
        }

        let hash = consumer_hash(consumer_path);
        let dir = consumer_dir(&self.config.consumer_root, consumer_path);

        {
            let _guard = self.mkdir_locks.lock(&hash).await;
            if let Err(err) = std::fs::create_dir_all(&dir) {
                for name in &remaining {
                    results.insert(name.clone(), TypeDefResult::error(format!("failed to create consumer directory: {err}")));
                }
                return results;
            }
        }

        {
            let mut pending = self.pending.lock().await;
            pending.entry(hash.clone()).or_default().extend(remaining.iter().cloned());
        }

        if !self.config.debounce.is_zero() {
            tokio::time::sleep(self.config.debounce).await;
        }

        let flush_errors = self.flush(&hash, &dir).await;

        for (name, error) in flush_errors {
            results.insert(name, error);
        }

        for name in &remaining {
            if results.contains_key(name) {
                continue;
            }
            if let Some(entry) = self.cache.get(name).await {
                results.insert(name.clone(), TypeDefResult::from_cache_entry(entry));
                continue;
            }
            if let Some(entry) = loader::load_entry(&dir, name) {
                self.cache.put(name, entry.clone()).await;
                results.insert(name.clone(), TypeDefResult::from_cache_entry(entry));
                continue;
            }
            results.insert(name.clone(), TypeDefResult::error("package not installed"));
        }

        results
    }

    /// Drain and reify this consumer's pending queue. Waiters that arrive
    /// while a flush is in-flight queue behind [`KeyedLocks::lock`] and, on
    /// acquiring it, typically find their names already drained and
    /// installed by the flush that ran ahead of them.
    ///
    /// Returns per-name errors for any name this flush could not resolve:
    /// `"Package not found: <name>"` for a registry 404, or a peer-conflict
    /// or exhausted-retries error shared across the whole batch. Names that
    /// installed successfully are already cached and are not present in
    /// the map.
    async fn flush(&self, consumer_hash: &str, dir: &Path) -> HashMap<String, TypeDefResult> {
        let _guard = self.flush_locks.lock(consumer_hash).await;

        let snapshot: BTreeSet<String> = {
            let mut pending = self.pending.lock().await;
            pending.remove(consumer_hash).unwrap_or_default()
        };

        if snapshot.is_empty() {
            return HashMap::new();
        }

        debug!(target: "ph.typedefs", count = snapshot.len(), "flushing pending install batch");

        let outcome = match self.installer.install_batch(dir, &snapshot) {
            Ok(outcome) => outcome,
            Err(TypedefError::PeerConflict(message)) => {
                return snapshot
                    .into_iter()
                    .map(|name| (name, TypeDefResult::error(format!("peer dependency conflict: {message}"))))
                    .collect();
            }
            Err(err) => {
                return snapshot
                    .into_iter()
                    .map(|name| (name, TypeDefResult::error(err.to_string())))
                    .collect();
            }
        };

        let installed = outcome.installed;
        let mut errors: HashMap<String, TypeDefResult> = outcome
            .not_found
            .into_iter()
            .map(|name| {
                let error = TypeDefResult::error(format!("Package not found: {name}"));
                (name, error)
            })
            .collect();

        let mut companions = BTreeSet::new();
        for name in &installed {
            if name.starts_with("@types/") {
                continue;
            }
            if TypeDefInstaller::needs_companion_types(dir, name) {
                companions.insert(TypeDefInstaller::companion_types_name(name));
            }
        }
        if !companions.is_empty() {
            // @types/* failures (including 404s) are non-fatal;
            // errors here are logged, not propagated.
            if let Err(err) = self.installer.install_batch(dir, &companions) {
                debug!(target: "ph.typedefs", error = %err, "companion @types install failed, continuing without them");
            }
        }

        for name in installed.iter().chain(companions.iter()) {
            if let Some(entry) = loader::load_entry(dir, name) {
                self.cache.put(name, entry).await;
            }
        }

        errors
    }

    fn resolve_local(&self, name: &str) -> Option<TypeDefResult> {
        let root = self.config.local_packages_root.as_ref()?;
        let relative = name.strip_prefix(self.config.local_package_prefix.as_str())?;
        let pkg_dir = root.join(relative);
        loader::load_entry_from_dir(&pkg_dir, Some(name)).map(TypeDefResult::from_cache_entry)
    }

    /// Clear the global cache and release the per-consumer lock maps.
    pub async fn invalidate_all(&self) {
        self.cache.clear().await;
        self.mkdir_locks.clear();
        self.flush_locks.clear();
        self.pending.lock().await.clear();
    }
}

/// Shared handle to a [`TypeDefService`], for embedding in an HTTP surface.
pub type SharedTypeDefService = Arc<TypeDefService>;

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path) -> TypeDefServiceConfig {
        TypeDefServiceConfig {
            consumer_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn skipped_names_never_touch_the_installer() {
        let dir = tempfile::tempdir().unwrap();
        let service = TypeDefService::new(config(dir.path()));
        let results = service
            .get_package_types(Path::new("/workspace/panels/editor"), &["node:fs".to_string()])
            .await;
        assert!(matches!(results["node:fs"], TypeDefResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn local_workspace_package_resolves_without_install() {
        let dir = tempfile::tempdir().unwrap();
        let packages_root = tempfile::tempdir().unwrap();
        let pkg_dir = packages_root.path().join("shared-ui");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("index.d.ts"), "export declare const x: number;\n").unwrap();

        let mut cfg = config(dir.path());
        cfg.local_packages_root = Some(packages_root.path().to_path_buf());
        let service = TypeDefService::new(cfg);

        let results = service
            .get_package_types(
                Path::new("/workspace/panels/editor"),
                &["@panelhost/shared-ui".to_string()],
            )
            .await;
        assert!(matches!(results["@panelhost/shared-ui"], TypeDefResult::Found { .. }));
    }

    #[tokio::test]
    async fn not_found_package_surfaces_as_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("fake-npm.sh");
        std::fs::write(
            &script_path,
            "#!/bin/sh\nif grep -q '\"left-pad\"' package.json; then\n  echo \"npm error 404 Not Found - GET https://registry.npmjs.org/left-pad\" >&2\n  exit 1\nfi\nexit 0\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut cfg = config(dir.path());
        cfg.package_manager_bin = script_path.to_string_lossy().to_string();
        cfg.debounce = Duration::from_millis(0);
        let service = TypeDefService::new(cfg);

        let results = service
            .get_package_types(Path::new("/workspace/panels/editor"), &["left-pad".to_string()])
            .await;

        match &results["left-pad"] {
            TypeDefResult::Error { error, .. } => assert_eq!(error, "Package not found: left-pad"),
            other => panic!("expected not-found error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalidate_all_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = TypeDefService::new(config(dir.path()));
        service.cache.put("zod", ph_core::TypeDefCacheEntry {
            files: Default::default(),
            referenced_packages: Vec::new(),
            entry_point: None,
        }).await;
        service.invalidate_all().await;
        assert!(service.cache.get("zod").await.is_none());
    }
}
