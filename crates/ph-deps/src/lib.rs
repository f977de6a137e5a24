// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-deps
//!
//! Hashes a dependency set, writes a synthetic `package.json`, and installs
//! into a build runtime directory, reusing the existing install when the
//! effective dependency hash is unchanged.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Errors produced by [`DependencyInstaller::install`].
#[derive(Debug, thiserror::Error)]
pub enum DepsError {
    /// The synthetic manifest could not be written.
    #[error("failed to write package manifest: {0}")]
    ManifestWrite(std::io::Error),
    /// An existing install tree or lockfile could not be removed before reinstall.
    #[error("failed to clear stale install tree: {0}")]
    StaleTreeRemoval(std::io::Error),
    /// The package manager subprocess failed.
    #[error("package manager install failed (exit {code:?}): {stderr}")]
    InstallFailed {
        /// Process exit code, if available.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The package manager binary could not be spawned.
    #[error("failed to spawn package manager: {0}")]
    Spawn(std::io::Error),
}

/// Canonical synthetic manifest written to the runtime directory before
/// installing. Field order is fixed by serde's derive order and match the
/// wire contract (`name, private, version, dependencies`); `serde_json`'s
/// default `Map` is `BTreeMap`-backed, so `dependencies` keys serialize in
/// sorted order regardless of insertion order, keeping the hash stable.
#[derive(Debug, Clone, Serialize)]
struct SyntheticManifest {
    name: String,
    private: bool,
    version: String,
    dependencies: BTreeMap<String, String>,
}

/// Resolves `workspace:*` dependency specifiers to local file URIs and
/// installs dependency sets into build runtime directories.
#[derive(Debug, Clone)]
pub struct DependencyInstaller {
    package_manager_bin: String,
}

impl Default for DependencyInstaller {
    fn default() -> Self {
        Self::new("npm")
    }
}

impl DependencyInstaller {
    /// Create an installer that shells out to `package_manager_bin`.
    #[must_use]
    pub fn new(package_manager_bin: impl Into<String>) -> Self {
        Self {
            package_manager_bin: package_manager_bin.into(),
        }
    }

    /// Resolve `workspace:*` specifiers against `packages_root` (a
    /// directory containing one subdirectory per local package name).
    /// Non-`workspace:` specifiers pass through unchanged.
    fn resolve_workspace_specs(
        dependencies: &BTreeMap<String, String>,
        packages_root: Option<&Path>,
    ) -> BTreeMap<String, String> {
        dependencies
            .iter()
            .map(|(name, spec)| {
                if let Some(stripped) = spec.strip_prefix("workspace:") {
                    if let Some(root) = packages_root {
                        let pkg_dir = if stripped == "*" || stripped.is_empty() {
                            root.join(name)
                        } else {
                            root.join(stripped)
                        };
                        return (name.clone(), format!("file:{}", pkg_dir.display()));
                    }
                }
                (name.clone(), spec.clone())
            })
            .collect()
    }

    /// Compute the effective dependency hash without touching the
    /// filesystem; used by callers that want to compare against a stored
    /// hash before deciding whether to call [`Self::install`] at all.
    #[must_use]
    pub fn effective_hash(
        dependencies: &BTreeMap<String, String>,
        packages_root: Option<&Path>,
    ) -> String {
        let resolved = Self::resolve_workspace_specs(dependencies, packages_root);
        let manifest = SyntheticManifest {
            name: "panelhost-runtime".to_string(),
            private: true,
            version: "0.0.0".to_string(),
            dependencies: resolved,
        };
        hash_manifest(&manifest)
    }

    /// Install `dependencies` into `runtime_dir`, reusing the existing
    /// install when `previous_hash` matches the newly-computed hash and a
    /// populated dependency directory is already present.
    ///
    /// Returns `Ok(None)` for an empty dependency set, so a source directory
    /// with no declared dependencies never shells out. Otherwise returns
    /// `Ok(Some(new_hash))`.
    ///
    /// # Errors
    ///
    /// Returns a [`DepsError`] if the manifest cannot be written, the stale
    /// install tree cannot be cleared, or the package manager subprocess
    /// fails.
    pub fn install(
        &self,
        runtime_dir: &Path,
        dependencies: &BTreeMap<String, String>,
        previous_hash: Option<&str>,
        packages_root: Option<&Path>,
    ) -> Result<Option<String>, DepsError> {
        if dependencies.is_empty() {
            return Ok(None);
        }

        let resolved = Self::resolve_workspace_specs(dependencies, packages_root);
        let manifest = SyntheticManifest {
            name: "panelhost-runtime".to_string(),
            private: true,
            version: "0.0.0".to_string(),
            dependencies: resolved,
        };
        let new_hash = hash_manifest(&manifest);
        let manifest_path = runtime_dir.join("package.json");
        let deps_dir = runtime_dir.join("node_modules");

        if previous_hash == Some(new_hash.as_str()) && is_populated(&deps_dir) {
            rewrite_manifest_if_changed(&manifest_path, &manifest)?;
            debug!(target: "ph.deps", hash = %new_hash, "reusing existing install");
            return Ok(Some(new_hash));
        }

        std::fs::create_dir_all(runtime_dir).map_err(DepsError::ManifestWrite)?;
        write_manifest(&manifest_path, &manifest)?;
        clear_stale_tree(&deps_dir, &runtime_dir.join("package-lock.json"))?;

        self.reify(runtime_dir)?;
        Ok(Some(new_hash))
    }

    fn reify(&self, runtime_dir: &Path) -> Result<(), DepsError> {
        let out = Command::new(&self.package_manager_bin)
            .args(["install", "--no-audit", "--no-fund"])
            .current_dir(runtime_dir)
            .output()
            .map_err(DepsError::Spawn)?;

        if !out.status.success() {
            return Err(DepsError::InstallFailed {
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            });
        }
        Ok(())
    }
}

fn hash_manifest(manifest: &SyntheticManifest) -> String {
    let canonical = serde_json::to_vec(manifest).expect("synthetic manifest always serializes");
    let digest = Sha256::digest(&canonical);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut it| it.next().is_some())
        .unwrap_or(false)
}

fn write_manifest(path: &Path, manifest: &SyntheticManifest) -> Result<(), DepsError> {
    let bytes = serde_json::to_vec_pretty(manifest).expect("synthetic manifest always serializes");
    std::fs::write(path, bytes).map_err(DepsError::ManifestWrite)
}

fn rewrite_manifest_if_changed(path: &Path, manifest: &SyntheticManifest) -> Result<(), DepsError> {
    let bytes = serde_json::to_vec_pretty(manifest).expect("synthetic manifest always serializes");
    if let Ok(existing) = std::fs::read(path) {
        if existing == bytes {
            return Ok(());
        }
    }
    std::fs::write(path, bytes).map_err(DepsError::ManifestWrite)
}

fn clear_stale_tree(deps_dir: &Path, lockfile: &Path) -> Result<(), DepsError> {
    if deps_dir.exists() {
        std::fs::remove_dir_all(deps_dir).map_err(DepsError::StaleTreeRemoval)?;
    }
    if lockfile.exists() {
        if let Err(err) = std::fs::remove_file(lockfile) {
            warn!(target: "ph.deps", error = %err, "failed to remove stale lockfile, continuing");
        }
    }
    Ok(())
}
