// SPDX-License-Identifier: MIT OR Apache-2.0
//! Batched, deduplicating type-definition installer for panelhost panels.
//!
//! A [`TypeDefService`] resolves package names to `.d.ts` contents for a
//! requesting consumer directory, skipping built-ins and local-workspace
//! packages, serving from a shared LRU cache where possible, and otherwise
//! coalescing concurrent requests from the same consumer into a single
//! debounced install batch.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod consumer;
pub mod error;
pub mod installer;
pub mod loader;
pub mod service;
pub mod skip;

pub use cache::{cache_key, TypeDefCache};
pub use consumer::{consumer_dir, consumer_hash, KeyedLocks};
pub use error::TypedefError;
pub use installer::{InstallOutcome, TypeDefInstaller};
pub use service::{SharedTypeDefService, TypeDefService, TypeDefServiceConfig};
pub use skip::should_skip;
