// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reifying a consumer's pending package set.

use crate::error::TypedefError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use tracing::warn;

/// Canonical synthetic manifest written to a consumer's dependency root
/// before each reify. Every pending name is installed at `"*"`, mirroring
/// the Dependency Installer's synthetic-manifest approach but without a
/// hash — consumer directories are persistent and reused by name, not
/// content-addressed.
#[derive(Debug, Serialize)]
struct ConsumerManifest {
    name: String,
    private: bool,
    version: String,
    dependencies: std::collections::BTreeMap<String, String>,
}

fn write_manifest(consumer_dir: &Path, names: &BTreeSet<String>) -> Result<(), TypedefError> {
    std::fs::create_dir_all(consumer_dir)?;
    let manifest = ConsumerManifest {
        name: "panelhost-typedef-consumer".to_string(),
        private: true,
        version: "0.0.0".to_string(),
        dependencies: names.iter().map(|n| (n.clone(), "*".to_string())).collect(),
    };
    let bytes = serde_json::to_vec_pretty(&manifest).expect("manifest always serializes");
    std::fs::write(consumer_dir.join("package.json"), bytes)?;
    Ok(())
}

/// Extract the package name npm/yarn identifies as not-found from a
/// captured stderr blob, e.g. `404 Not Found - GET https://registry.npmjs.org/left-pad`
/// or `npm error 404 'left-pad@*' is not in this registry`.
fn extract_not_found_package(stderr: &str) -> Option<String> {
    if !stderr.contains("404") {
        return None;
    }
    for line in stderr.lines() {
        if !line.contains("404") {
            continue;
        }
        if let Some(idx) = line.rfind('/') {
            let candidate: String = line[idx + 1..]
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
                .collect();
            if !candidate.is_empty() {
                return Some(candidate);
            }
        }
        for token in line.split(['\'', '"']) {
            if let Some(at) = token.rfind('@') {
                if at > 0 {
                    return Some(token[..at].to_string());
                }
            }
        }
    }
    None
}

fn is_directory_conflict(stderr: &str) -> bool {
    stderr.contains("ENOTEMPTY")
}

fn is_peer_conflict(stderr: &str) -> bool {
    stderr.contains("ERESOLVE") || stderr.contains("peer dep")
}

fn summarize_peer_conflict(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|l| l.contains("peer") || l.contains("Conflicting") || l.contains("ERESOLVE"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of a single [`TypeDefInstaller::install_batch`] call.
#[derive(Debug, Clone, Default)]
pub struct InstallOutcome {
    /// Names that ended up installed.
    pub installed: BTreeSet<String>,
    /// Names trimmed from the batch because the registry reported them
    /// 404, keyed by the offending name.
    pub not_found: BTreeSet<String>,
}

/// Reifies pending package sets into a consumer's dependency root,
/// recovering from not-found packages, directory conflicts, and peer
/// conflicts.
#[derive(Debug, Clone)]
pub struct TypeDefInstaller {
    package_manager_bin: String,
    max_retries: u32,
}

impl Default for TypeDefInstaller {
    fn default() -> Self {
        Self::new("npm", 5)
    }
}

impl TypeDefInstaller {
    /// Create an installer shelling out to `package_manager_bin`, retrying
    /// a not-found package trim at most `max_retries` times.
    #[must_use]
    pub fn new(package_manager_bin: impl Into<String>, max_retries: u32) -> Self {
        Self {
            package_manager_bin: package_manager_bin.into(),
            max_retries,
        }
    }

    fn reify(&self, consumer_dir: &Path) -> Result<(), TypedefError> {
        let out = Command::new(&self.package_manager_bin)
            .args(["install", "--no-audit", "--no-fund"])
            .current_dir(consumer_dir)
            .output()
            .map_err(TypedefError::Spawn)?;

        if out.status.success() {
            return Ok(());
        }
        Err(TypedefError::InstallFailed {
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }

    /// Install `names` into `consumer_dir`, trimming not-found packages up
    /// to the configured retry bound, recovering once from a directory
    /// conflict, and failing fast (no retry) on a peer-dependency conflict.
    ///
    /// Returns both the subset of `names` that ended up installed and the
    /// subset trimmed because the registry reported them 404.
    ///
    /// # Errors
    ///
    /// Returns [`TypedefError::PeerConflict`] on a peer-dependency failure,
    /// or [`TypedefError::InstallFailed`] if retries are exhausted or an
    /// unrecognised failure occurs.
    pub fn install_batch(
        &self,
        consumer_dir: &Path,
        names: &BTreeSet<String>,
    ) -> Result<InstallOutcome, TypedefError> {
        if names.is_empty() {
            return Ok(InstallOutcome::default());
        }

        let mut pending = names.clone();
        let mut not_found = BTreeSet::new();
        let mut reset_attempted = false;

        for _attempt in 0..=self.max_retries {
            write_manifest(consumer_dir, &pending)?;
            match self.reify(consumer_dir) {
                Ok(()) => {
                    return Ok(InstallOutcome {
                        installed: pending,
                        not_found,
                    })
                }
                Err(TypedefError::InstallFailed { code, stderr }) => {
                    if let Some(offender) = extract_not_found_package(&stderr) {
                        if pending.remove(&offender) {
                            warn!(target: "ph.typedefs", package = %offender, "trimming not-found package and retrying");
                            not_found.insert(offender);
                            continue;
                        }
                        return Err(TypedefError::InstallFailed { code, stderr });
                    }
                    if is_directory_conflict(&stderr) && !reset_attempted {
                        reset_attempted = true;
                        warn!(target: "ph.typedefs", dir = %consumer_dir.display(), "resetting consumer directory after ENOTEMPTY");
                        reset_directory(consumer_dir)?;
                        continue;
                    }
                    if is_peer_conflict(&stderr) {
                        return Err(TypedefError::PeerConflict(summarize_peer_conflict(&stderr)));
                    }
                    return Err(TypedefError::InstallFailed { code, stderr });
                }
                Err(other) => return Err(other),
            }
        }

        Err(TypedefError::InstallFailed {
            code: None,
            stderr: "exceeded maximum not-found retry bound".to_string(),
        })
    }

    /// `true` if `name`'s installed package declares no bundled typings of
    /// its own, meaning a companion `@types/*` package should be queued.
    #[must_use]
    pub fn needs_companion_types(consumer_dir: &Path, name: &str) -> bool {
        let pkg_dir = consumer_dir.join("node_modules").join(name);
        if pkg_dir.join("index.d.ts").is_file() {
            return false;
        }
        let Ok(text) = std::fs::read_to_string(pkg_dir.join("package.json")) else {
            return true;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            return true;
        };
        value.get("types").is_none() && value.get("typings").is_none()
    }

    /// The `@types/*` package name for `name` (`@types/scope__name` for a
    /// scoped package, `@types/name` otherwise).
    #[must_use]
    pub fn companion_types_name(name: &str) -> String {
        if let Some(stripped) = name.strip_prefix('@') {
            if let Some((scope, rest)) = stripped.split_once('/') {
                return format!("@types/{scope}__{rest}");
            }
        }
        format!("@types/{name}")
    }
}

fn reset_directory(consumer_dir: &Path) -> Result<(), TypedefError> {
    if consumer_dir.exists() {
        if let Err(err) = std::fs::remove_dir_all(consumer_dir) {
            warn!(target: "ph.typedefs", error = %err, "best-effort directory removal failed, falling back to shell rm");
            let _ = Command::new("rm").arg("-rf").arg(consumer_dir).status();
        }
    }
    std::fs::create_dir_all(consumer_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_package_name_from_registry_404() {
        let stderr = "npm error 404 Not Found - GET https://registry.npmjs.org/left-pad - Not found";
        assert_eq!(extract_not_found_package(stderr), Some("left-pad".to_string()));
    }

    #[test]
    fn extracts_package_name_from_quoted_spec() {
        let stderr = "npm error 404 '@scope/missing@*' is not in this registry";
        assert_eq!(
            extract_not_found_package(stderr),
            Some("@scope/missing".to_string())
        );
    }

    #[test]
    fn detects_directory_and_peer_conflicts() {
        assert!(is_directory_conflict("Error: ENOTEMPTY: directory not empty"));
        assert!(is_peer_conflict("npm error ERESOLVE unable to resolve dependency tree"));
        assert!(!is_peer_conflict("npm error 404 Not Found"));
    }

    #[test]
    fn companion_types_name_handles_scoped_and_plain_packages() {
        assert_eq!(
            TypeDefInstaller::companion_types_name("@scope/pkg"),
            "@types/scope__pkg"
        );
        assert_eq!(TypeDefInstaller::companion_types_name("lodash"), "@types/lodash");
    }

    #[test]
    fn needs_companion_types_true_when_no_metadata_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TypeDefInstaller::needs_companion_types(dir.path(), "lodash"));
    }

    #[test]
    fn needs_companion_types_false_when_types_field_present() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("node_modules").join("zod");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("package.json"), r#"{"types":"index.d.ts"}"#).unwrap();
        assert!(!TypeDefInstaller::needs_companion_types(dir.path(), "zod"));
    }

    #[test]
    fn empty_batch_installs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let installer = TypeDefInstaller::new("true", 5);
        let outcome = installer.install_batch(dir.path(), &BTreeSet::new()).unwrap();
        assert!(outcome.installed.is_empty());
        assert!(outcome.not_found.is_empty());
    }
}
