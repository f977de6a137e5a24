// SPDX-License-Identifier: MIT OR Apache-2.0
//! Manifest loading and entry resolution.

use crate::error::BuildError;
use ph_core::build::CONVENTIONAL_ENTRY_NAMES;
use ph_core::BuildManifest;
use std::path::{Path, PathBuf};

/// Conventional manifest file name probed inside a provisioned source directory.
pub const MANIFEST_FILE_NAME: &str = "panel.manifest.json";

/// Read and parse the manifest from `source_dir`.
///
/// # Errors
///
/// Returns [`BuildError::ManifestMissing`] if the file does not exist, or
/// [`BuildError::ManifestInvalid`] if it does not parse as a [`BuildManifest`].
pub fn load_manifest(source_dir: &Path) -> Result<BuildManifest, BuildError> {
    let path = source_dir.join(MANIFEST_FILE_NAME);
    let text = std::fs::read_to_string(&path).map_err(|_| BuildError::ManifestMissing(path))?;
    let manifest: BuildManifest = serde_json::from_str(&text)?;
    Ok(manifest)
}

/// Resolve the entry file, relative to `source_dir`.
///
/// If `manifest.entry` is set, it is used unchecked (the bundler surfaces a
/// missing-file error later). Otherwise probes
/// [`CONVENTIONAL_ENTRY_NAMES`] in order; exactly one present file must
/// match, or resolution fails.
///
/// # Errors
///
/// Returns [`BuildError::EntryUnresolved`] if no explicit entry is set and
/// zero or more than one conventional entry file is present.
pub fn resolve_entry(source_dir: &Path, manifest: &BuildManifest) -> Result<String, BuildError> {
    if let Some(entry) = &manifest.entry {
        return Ok(entry.clone());
    }

    let present: Vec<&str> = CONVENTIONAL_ENTRY_NAMES
        .iter()
        .copied()
        .filter(|name| source_dir.join(name).is_file())
        .collect();

    match present.as_slice() {
        [single] => Ok((*single).to_string()),
        [] => Err(BuildError::EntryUnresolved(
            "no explicit entry and no conventional entry file present".to_string(),
        )),
        multiple => Err(BuildError::EntryUnresolved(format!(
            "no explicit entry and multiple conventional entry files present: {multiple:?}"
        ))),
    }
}

/// Absolute path helper retained for cache-key computation: cache keys
/// are built from the *canonical absolute* source path.
///
/// # Errors
///
/// Propagates any [`std::io::Error`] from [`std::fs::canonicalize`].
pub fn canonical_source_path(source_path: &Path) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(source_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_entry_bypasses_probing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = BuildManifest {
            entry: Some("custom/main.ts".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_entry(dir.path(), &manifest).unwrap(), "custom/main.ts");
    }

    #[test]
    fn probes_conventional_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.ts"), "").unwrap();
        let manifest = BuildManifest::default();
        assert_eq!(resolve_entry(dir.path(), &manifest).unwrap(), "index.ts");
    }

    #[test]
    fn ambiguous_conventional_entries_fail() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.ts"), "").unwrap();
        std::fs::write(dir.path().join("index.tsx"), "").unwrap();
        let manifest = BuildManifest::default();
        assert!(matches!(
            resolve_entry(dir.path(), &manifest),
            Err(BuildError::EntryUnresolved(_))
        ));
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_manifest(dir.path()),
            Err(BuildError::ManifestMissing(_))
        ));
    }

    #[test]
    fn well_formed_manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"{"title":"Editor","dependencies":{"zod":"^3"}}"#,
        )
        .unwrap();
        let manifest = load_manifest(dir.path()).unwrap();
        assert_eq!(manifest.title, "Editor");
        assert_eq!(manifest.dependencies["zod"], "^3");
    }
}
