// SPDX-License-Identifier: MIT OR Apache-2.0
//! Build manifest and artifact contract types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which build entry point produced an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A browser-hosted panel: bundle + HTML (+ optional CSS).
    Panel,
    /// A Node-like background worker: bundle only.
    Worker,
}

impl ArtifactKind {
    /// Cache-key prefix for this kind (`panel` or `worker`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Panel => "panel",
            ArtifactKind::Worker => "worker",
        }
    }
}

/// A dependency specifier for one entry in [`BuildManifest::dependencies`].
///
/// Most entries are plain semver ranges; `workspace:*` specifiers are
/// resolved to local file paths by the Dependency Installer before the
/// effective dependency set is hashed.
pub type DependencySpec = String;

/// Every buildable source directory exposes a manifest with this shape.
/// Additional fields are opaque pass-through and are not modeled here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BuildManifest {
    /// Human-readable title (required).
    pub title: String,
    /// Optional explicit entry path, relative to the source directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Declared dependencies, possibly including `workspace:*` references.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    /// Import-specifier -> CDN URL, excluded from bundling.
    #[serde(default)]
    pub externals: BTreeMap<String, String>,
}

/// Conventional entry-point file names probed when `entry` is unset,
/// in priority order.
pub const CONVENTIONAL_ENTRY_NAMES: &[&str] =
    &["index.tsx", "index.ts", "index.jsx", "index.js", "main.tsx", "main.ts"];

/// Persisted artifact body. One JSON document per cache key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// A successful panel build.
    Panel {
        /// Bundled JS text (ESM, browser ES2022 target).
        bundle: String,
        /// Generated or passed-through HTML document text.
        html: String,
        /// Generated CSS bundle text, if any stylesheet was produced.
        #[serde(skip_serializing_if = "Option::is_none")]
        css: Option<String>,
        /// The manifest this artifact was built from.
        manifest: BuildManifest,
        /// Accumulated human-readable build log.
        build_log: Vec<String>,
    },
    /// A successful worker build.
    Worker {
        /// Bundled JS text (ESM, Node-like ES2022 target).
        bundle: String,
        /// The manifest this artifact was built from.
        manifest: BuildManifest,
        /// Accumulated human-readable build log.
        build_log: Vec<String>,
    },
}

impl Artifact {
    /// The build log lines accumulated for this artifact.
    #[must_use]
    pub fn build_log(&self) -> &[String] {
        match self {
            Artifact::Panel { build_log, .. } | Artifact::Worker { build_log, .. } => build_log,
        }
    }
}

/// Outcome of a [`BuildPipeline`](../../ph_build/struct.BuildPipeline.html) call.
///
/// Serializes to the `{success, ...}` / `{success: false, error, buildLog}`
/// shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildOutcome {
    /// The build produced a usable artifact.
    Success {
        /// Always `true`; present so success and failure share one flat JSON shape.
        success: bool,
        /// The produced artifact.
        #[serde(flatten)]
        artifact: Artifact,
    },
    /// The build failed at some stage.
    Failure {
        /// Always `false`.
        success: bool,
        /// Human-readable failure summary.
        error: String,
        /// Accumulated human-readable build log.
        build_log: Vec<String>,
    },
}

impl BuildOutcome {
    /// Construct a successful outcome wrapping `artifact`.
    #[must_use]
    pub fn success(artifact: Artifact) -> Self {
        BuildOutcome::Success {
            success: true,
            artifact,
        }
    }

    /// Construct a failure outcome with the given error and accumulated log.
    #[must_use]
    pub fn failure(error: impl Into<String>, build_log: Vec<String>) -> Self {
        BuildOutcome::Failure {
            success: false,
            error: error.into(),
            build_log,
        }
    }

    /// `true` if this outcome represents a successful build.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_outcome_round_trips_through_json() {
        let outcome = BuildOutcome::failure("manifest missing", vec!["cloning".into()]);
        let json = serde_json::to_string(&outcome).unwrap();
        let back: BuildOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
        assert!(!back.is_success());
    }
}
