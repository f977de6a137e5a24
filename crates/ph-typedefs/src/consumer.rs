// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-consumer directory naming and keyed locking.
//!
//! Two independent [`KeyedLocks`] maps are used by [`crate::TypeDefService`]:
//! one serialising directory creation, one serialising flushes. Both follow
//! the same shape — a short hash of the consumer path guarding access to a
//! lazily-created `tokio::sync::Mutex` — mirroring the keyed-entry-map idiom
//! used for pooled resources elsewhere in the stack, adapted to an async
//! mutex since a flush spans `.await` points.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Short, filesystem-safe hash identifying a consumer path.
#[must_use]
pub fn consumer_hash(consumer_path: &Path) -> String {
    let digest = Sha256::digest(consumer_path.to_string_lossy().as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// The stable on-disk directory for `consumer_path`, under `root`.
#[must_use]
pub fn consumer_dir(root: &Path, consumer_path: &Path) -> PathBuf {
    root.join(consumer_hash(consumer_path))
}

/// A map of independent async mutexes, keyed by an arbitrary string,
/// created lazily on first use and kept alive as long as any waiter holds a
/// reference.
#[derive(Default)]
pub struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it if this is the first caller
    /// to ever reference it. The returned guard serialises concurrent
    /// callers racing on the same key; it never blocks callers using a
    /// different key.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().expect("keyed lock map poisoned");
            locks.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Drop every known key. Callers already holding a guard for a key keep
    /// it valid; the next `lock` for that key creates a fresh mutex.
    pub fn clear(&self) {
        self.locks.lock().expect("keyed lock map poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_distinct_per_path() {
        let a = consumer_hash(Path::new("/workspace/panels/editor"));
        let b = consumer_hash(Path::new("/workspace/panels/editor"));
        let c = consumer_hash(Path::new("/workspace/panels/other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let g1 = locks.lock("a").await;
        let g2 = locks.lock("b").await;
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn same_key_is_serialised() {
        let locks = Arc::new(KeyedLocks::new());
        let order = Arc::new(AsyncMutex::new(Vec::new()));

        let l1 = locks.clone();
        let o1 = order.clone();
        let first = tokio::spawn(async move {
            let _guard = l1.lock("consumer").await;
            o1.lock().await.push(1);
        });
        first.await.unwrap();

        let l2 = locks.clone();
        let o2 = order.clone();
        let second = tokio::spawn(async move {
            let _guard = l2.lock("consumer").await;
            o2.lock().await.push(2);
        });
        second.await.unwrap();

        assert_eq!(*order.lock().await, vec![1, 2]);
    }
}
