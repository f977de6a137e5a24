// SPDX-License-Identifier: MIT OR Apache-2.0
//! Type-Definition Service contract types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cached entry, keyed externally by `"<package>@latest"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TypeDefCacheEntry {
    /// Relative path -> file text, for every `.d.ts` (or similar) file found.
    pub files: BTreeMap<String, String>,
    /// Other packages referenced by these type files (e.g. via `import`).
    pub referenced_packages: Vec<String>,
    /// Resolved entry point, if the package declares one.
    pub entry_point: Option<String>,
}

/// Result of fetching types for a single package name within a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TypeDefResult {
    /// Types were found and installed/loaded.
    Found {
        /// Relative path -> file text.
        files: BTreeMap<String, String>,
        /// Other packages referenced transitively.
        referenced_packages: Vec<String>,
        /// Resolved entry point, if any.
        entry_point: Option<String>,
    },
    /// The package was skipped (built-in, local-only-unavailable, etc.).
    Skipped {
        /// Always empty.
        files: BTreeMap<String, String>,
        /// Always `true`.
        skipped: bool,
    },
    /// Acquisition failed for this package specifically.
    Error {
        /// Always empty.
        files: BTreeMap<String, String>,
        /// Human-readable failure reason.
        error: String,
    },
}

impl TypeDefResult {
    /// A `{files: {}, skipped: true}` result.
    #[must_use]
    pub fn skipped() -> Self {
        TypeDefResult::Skipped {
            files: BTreeMap::new(),
            skipped: true,
        }
    }

    /// A `{files: {}, error}` result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        TypeDefResult::Error {
            files: BTreeMap::new(),
            error: message.into(),
        }
    }

    /// Build a `Found` result from a cache entry.
    #[must_use]
    pub fn from_cache_entry(entry: TypeDefCacheEntry) -> Self {
        TypeDefResult::Found {
            files: entry.files,
            referenced_packages: entry.referenced_packages,
            entry_point: entry.entry_point,
        }
    }

    /// `true` if this result carries no files (skipped or errored).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            TypeDefResult::Found { files, .. } => files.is_empty(),
            TypeDefResult::Skipped { .. } | TypeDefResult::Error { .. } => true,
        }
    }
}
