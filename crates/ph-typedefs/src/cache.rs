// SPDX-License-Identifier: MIT OR Apache-2.0
//! The global LRU type-definition cache, keyed by `"<package>@latest"`
//! across all consumers.

use lru::LruCache;
use ph_core::TypeDefCacheEntry;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

/// Build the external cache key for `package_name`.
#[must_use]
pub fn cache_key(package_name: &str) -> String {
    format!("{package_name}@latest")
}

/// Capacity-bounded LRU cache of resolved type-definition entries.
///
/// Shared across consumers: once any consumer has installed a package's
/// types, every later lookup for that package (by any consumer) hits the
/// cache, mirroring [`lru::LruCache`]'s use as a process-wide store rather
/// than one scoped per caller.
pub struct TypeDefCache {
    entries: Mutex<LruCache<String, TypeDefCacheEntry>>,
}

impl TypeDefCache {
    /// Create a cache holding at most `capacity` entries. `capacity` is
    /// clamped to at least 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up `package_name`, marking it most-recently-used on hit.
    pub async fn get(&self, package_name: &str) -> Option<TypeDefCacheEntry> {
        self.entries.lock().await.get(&cache_key(package_name)).cloned()
    }

    /// Insert or refresh `package_name`'s entry, evicting the
    /// least-recently-used entry if the cache is at capacity.
    pub async fn put(&self, package_name: &str, entry: TypeDefCacheEntry) {
        self.entries.lock().await.put(cache_key(package_name), entry);
    }

    /// Clear every cached entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(n: &str) -> TypeDefCacheEntry {
        TypeDefCacheEntry {
            files: BTreeMap::from([(format!("{n}/index.d.ts"), "export {};".to_string())]),
            referenced_packages: Vec::new(),
            entry_point: None,
        }
    }

    #[tokio::test]
    async fn hit_and_miss() {
        let cache = TypeDefCache::new(2);
        assert!(cache.get("zod").await.is_none());
        cache.put("zod", entry("zod")).await;
        assert!(cache.get("zod").await.is_some());
    }

    #[tokio::test]
    async fn evicts_least_recently_used_past_capacity() {
        let cache = TypeDefCache::new(1);
        cache.put("zod", entry("zod")).await;
        cache.put("lodash", entry("lodash")).await;
        assert!(cache.get("zod").await.is_none());
        assert!(cache.get("lodash").await.is_some());
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = TypeDefCache::new(4);
        cache.put("zod", entry("zod")).await;
        cache.clear().await;
        assert!(cache.get("zod").await.is_none());
    }
}
