// SPDX-License-Identifier: MIT OR Apache-2.0
//! Failure modes surfaced by [`crate::BuildPipeline`].
//!
//! Every variant here is caught at the call site and folded into a
//! `BuildOutcome::Failure` — callers never see a bare [`BuildError`].

use std::path::PathBuf;

/// Internal failure modes for one build attempt.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The provisioned source directory has no manifest file.
    #[error("manifest not found: {0}")]
    ManifestMissing(PathBuf),

    /// The manifest file exists but is not valid JSON for [`ph_core::BuildManifest`].
    #[error("invalid manifest: {0}")]
    ManifestInvalid(#[from] serde_json::Error),

    /// Neither an explicit entry nor exactly one conventional entry file was found.
    #[error("entry resolution failed: {0}")]
    EntryUnresolved(String),

    /// The git provisioner failed to resolve or materialise the source.
    #[error("provisioning failed: {0}")]
    Provision(#[from] anyhow::Error),

    /// The dependency installer failed.
    #[error("dependency install failed: {0}")]
    Deps(#[from] ph_deps::DepsError),

    /// The artifact cache failed.
    #[error("cache error: {0}")]
    Cache(#[from] ph_cache::CacheError),

    /// A filesystem operation in the runtime directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bundler subprocess failed.
    #[error("bundle failed: {0}")]
    Bundle(String),

    /// An emitted artifact exceeded its size cap.
    #[error("{kind} size {bytes} bytes exceeds cap of {cap} bytes")]
    SizeExceeded {
        /// Which emitted file exceeded its cap (`"bundle"`, `"html"`, `"css"`).
        kind: &'static str,
        /// The emitted size, in bytes.
        bytes: usize,
        /// The cap that was exceeded.
        cap: usize,
    },
}
