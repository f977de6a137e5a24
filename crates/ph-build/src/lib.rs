// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-build
//!
//! The on-demand Build Pipeline: given a source directory and a
//! version spec, produces a cached, sandboxable panel or worker artifact by
//! coordinating [`ph_git`]'s Git Provisioner, [`ph_deps`]'s Dependency
//! Installer, [`ph_cache`]'s Artifact Cache, and a pluggable [`Bundler`].

/// Bundling via an external JS bundler subprocess.
pub mod bundler;
/// Failure modes surfaced by [`BuildPipeline`].
pub mod error;
/// External-specifier resolution and framework-integration detection.
pub mod externals;
/// Default HTML document synthesis.
pub mod html;
/// Manifest loading and entry resolution.
pub mod manifest;
/// The [`BuildPipeline`] orchestrator itself.
pub mod pipeline;
/// Synthetic entry-file generation.
pub mod wrapper;

pub use bundler::{BundleOutput, BundleRequest, BundleTarget, Bundler, EsbuildBundler};
pub use error::BuildError;
pub use manifest::MANIFEST_FILE_NAME;
pub use pipeline::{BuildPipeline, BuildProgress};
pub use wrapper::WRAPPER_FILE_NAME;
