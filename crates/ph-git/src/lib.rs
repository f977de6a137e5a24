// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-git
//!
//! Git repository helpers used by the Build Pipeline to resolve a version
//! spec (branch/commit/tag) against a source path and to materialise a
//! disposable working copy at that commit.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::debug;

/// Progress states a provisioning call may report through its callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionProgress {
    /// Materialising the disposable worktree has begun.
    Cloning,
    /// The worktree was checked out at the resolved commit.
    CheckedOut,
}

/// A disposable working copy produced by [`GitProvisioner::provision_panel_version`].
///
/// `source_path` is readable for the duration up to [`Self::cleanup`]. The
/// provisioner's ordering guarantee: `commit` always matches the commit of
/// the materialised tree, regardless of races against upstream updates
/// during checkout, because resolution happens against the already-cloned
/// worktree rather than the (possibly moving) original.
pub struct ProvisionedSource {
    source_path: PathBuf,
    commit: String,
    temp: Option<TempDir>,
}

impl ProvisionedSource {
    /// The materialised source directory.
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The exact commit materialised.
    #[must_use]
    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Remove the disposable worktree. Always safe to call; failures are
    /// swallowed rather than surfaced to the caller.
    pub fn cleanup(mut self) {
        if let Some(temp) = self.temp.take() {
            let _ = temp.close();
        }
    }
}

impl Drop for ProvisionedSource {
    fn drop(&mut self) {
        // Best-effort: TempDir's own Drop already removes the directory if
        // `cleanup` was never called explicitly (e.g. an error path that
        // returned early). This mirrors "cleanup always runs on every exit
        // path" without requiring every caller to remember it.
        if let Some(temp) = self.temp.take() {
            let _ = temp.close();
        }
    }
}

/// Resolves ns:// version specs against local git source directories and
/// materialises disposable worktrees for the Build Pipeline.
#[derive(Debug, Clone)]
pub struct GitProvisioner {
    git_bin: String,
}

impl Default for GitProvisioner {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitProvisioner {
    /// Create a provisioner that shells out to `git_bin` (e.g. `"git"`, or
    /// an absolute path for a pinned toolchain).
    #[must_use]
    pub fn new(git_bin: impl Into<String>) -> Self {
        Self {
            git_bin: git_bin.into(),
        }
    }

    /// Resolve `version` (branch/commit/tag, or `None` for the current
    /// `HEAD`) against `source` without checking out. Used for the Build
    /// Pipeline's early cache lookup, before any worktree is materialised.
    ///
    /// Returns `Ok(None)` if `source` is not a git repository or the
    /// version spec does not resolve; returns an error only for I/O
    /// failures unrelated to the resolution itself.
    pub fn resolve_target_commit(
        &self,
        source: &Path,
        version: Option<&str>,
    ) -> Result<Option<String>> {
        if !source.join(".git").exists() {
            return Ok(None);
        }
        let spec = format!("{}^{{commit}}", version.unwrap_or("HEAD"));
        match run_git(&self.git_bin, source, &["rev-parse", "--verify", &spec]) {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    /// Materialise a disposable worktree of `source` at `version`
    /// (`None` meaning current `HEAD`), reporting progress through
    /// `progress` if supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` is not a git repository, the version
    /// spec does not resolve, or the clone/checkout subprocess fails.
    pub fn provision_panel_version(
        &self,
        source: &Path,
        version: Option<&str>,
        mut progress: Option<&mut dyn FnMut(ProvisionProgress)>,
    ) -> Result<ProvisionedSource> {
        anyhow::ensure!(
            source.join(".git").exists(),
            "not a git repository: {}",
            source.display()
        );

        if let Some(cb) = progress.as_deref_mut() {
            cb(ProvisionProgress::Cloning);
        }

        let temp = tempfile::tempdir().context("create disposable worktree dir")?;
        debug!(target: "ph.git", source = %source.display(), dest = %temp.path().display(), "cloning disposable worktree");

        run_git(
            &self.git_bin,
            source,
            &[
                "clone",
                "--quiet",
                "--no-checkout",
                "--local",
                source.to_str().context("source path is not valid UTF-8")?,
                temp.path().to_str().context("temp path is not valid UTF-8")?,
            ],
        )?;

        // Resolve against the *clone*, not the original, so the reported
        // commit always matches what gets checked out even if the original's
        // branch tip moved between clone and here.
        let spec = format!("{}^{{commit}}", version.unwrap_or("HEAD"));
        let commit = run_git(&self.git_bin, temp.path(), &["rev-parse", "--verify", &spec])
            .with_context(|| format!("resolve version {version:?} in cloned worktree"))?
            .trim()
            .to_string();

        run_git(&self.git_bin, temp.path(), &["checkout", "--quiet", &commit])
            .with_context(|| format!("checkout {commit} in cloned worktree"))?;

        if let Some(cb) = progress.as_deref_mut() {
            cb(ProvisionProgress::CheckedOut);
        }

        Ok(ProvisionedSource {
            source_path: temp.path().to_path_buf(),
            commit,
            temp: Some(temp),
        })
    }

    /// Returns the porcelain v1 status output for the repo at `path`, if available.
    #[must_use]
    pub fn git_status(&self, path: &Path) -> Option<String> {
        run_git(&self.git_bin, path, &["status", "--porcelain=v1"]).ok()
    }

    /// Returns the unified diff output for the repo at `path`, if available.
    #[must_use]
    pub fn git_diff(&self, path: &Path) -> Option<String> {
        run_git(&self.git_bin, path, &["diff", "--no-color"]).ok()
    }
}

fn run_git(git_bin: &str, path: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new(git_bin)
        .args(args)
        .current_dir(path)
        .output()
        .with_context(|| format!("run {git_bin} {args:?}"))?;

    if !out.status.success() {
        anyhow::bail!(
            "{git_bin} {:?} failed (code={:?}): {}",
            args,
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        );
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

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
        run(&["-c", "user.name=t", "-c", "user.email=t@local", "commit", "--allow-empty", "-qm", "one"]);
        std::fs::write(dir.join("index.ts"), "export default 1;\n").unwrap();
        run(&["add", "-A"]);
        run(&["-c", "user.name=t", "-c", "user.email=t@local", "commit", "-qm", "two"]);
    }

    #[test]
    fn resolve_target_commit_returns_none_outside_git_repo() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = GitProvisioner::default();
        let resolved = provisioner.resolve_target_commit(dir.path(), None).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn resolve_then_provision_agree_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let provisioner = GitProvisioner::default();

        let early = provisioner
            .resolve_target_commit(dir.path(), None)
            .unwrap()
            .expect("HEAD resolves");

        let provisioned = provisioner
            .provision_panel_version(dir.path(), None, None)
            .unwrap();
        assert_eq!(provisioned.commit(), early);
        assert!(provisioned.source_path().join("index.ts").exists());
        provisioned.cleanup();
    }
}
