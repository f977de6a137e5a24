// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! ph-cache
//!
//! The content-addressed Artifact Cache: an opaque string-key -> string-value
//! store keyed by `(kind, absolute source path, commit)`. Two implementations
//! are provided: a filesystem-backed
//! store for production use, and an in-memory store for tests and the
//! `dev_cache_bypass` configuration mode.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Errors returned by [`ArtifactCache`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backing filesystem operation failed.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the opaque cache key for one of the three key families:
/// `panel:<abs-path>:<commit>`, `worker:<abs-path>:<commit>`,
/// `deps:<abs-path>:<commit>`.
#[must_use]
pub fn cache_key(family: &str, absolute_source: &Path, commit: &str) -> String {
    format!("{family}:{}:{commit}", absolute_source.display())
}

/// A process-shared key -> blob store. Keys are opaque strings; values are
/// arbitrary strings (serialised artifact JSON, or a dependency hash).
///
/// Entries have no TTL; eviction is the caller's concern.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Look up `key`. Returns `Ok(None)` on a clean miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] only for backing-store I/O failures, never
    /// for an ordinary miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, overwriting any existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Filesystem-backed [`ArtifactCache`].
///
/// Entries are stored as plain files under `root`, sharded by the first two
/// hex characters of a SHA-256 digest of the key (to keep any one directory
/// from growing unbounded) so that keys containing path separators or
/// colons never need filesystem-path escaping.
#[derive(Debug, Clone)]
pub struct FsArtifactCache {
    root: PathBuf,
    /// When `true`, [`Self::get`] always reports a miss; [`Self::put`]
    /// still writes through, so a later restart without the flag observes
    /// prior builds.
    dev_bypass: bool,
}

impl FsArtifactCache {
    /// Create a cache rooted at `root`. `root` is created lazily on first
    /// write; it need not exist yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, dev_bypass: bool) -> Self {
        Self {
            root: root.into(),
            dev_bypass,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = digest_hex(key);
        self.root.join(&digest[0..2]).join(&digest)
    }
}

fn digest_hex(input: &str) -> String {
    use sha2::Digest;
    let digest = sha2::Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl ArtifactCache for FsArtifactCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.dev_bypass {
            trace!(target: "ph.cache", %key, "dev_cache_bypass: reporting unconditional miss");
            return Ok(None);
        }
        let path = self.entry_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                trace!(target: "ph.cache", %key, "cache hit");
                Ok(Some(contents))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CacheError::Io(err)),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, value).await?;
        debug!(target: "ph.cache", %key, bytes = value.len(), "cache entry written");
        Ok(())
    }
}

/// In-memory [`ArtifactCache`], used in tests and wherever a process-local
/// cache is sufficient.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryArtifactCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactCache for InMemoryArtifactCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
