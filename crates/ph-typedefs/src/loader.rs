// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reading installed type files back off disk into a [`TypeDefCacheEntry`].

use ph_core::TypeDefCacheEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const TYPE_FILE_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

/// Load every declaration file under `consumer_dir/node_modules/<name>`
/// into a [`TypeDefCacheEntry`]. Returns `None` if the package directory
/// does not exist (e.g. an `@types/*` companion that failed to install).
#[must_use]
pub fn load_entry(consumer_dir: &Path, name: &str) -> Option<TypeDefCacheEntry> {
    let pkg_dir = consumer_dir.join("node_modules").join(name);
    load_entry_from_dir(&pkg_dir, Some(name))
}

/// Load every declaration file directly under `pkg_dir` into a
/// [`TypeDefCacheEntry`], used both for installed `node_modules` packages
/// and for local-workspace packages resolved without installation.
/// `own_name`, when known, is excluded from the referenced-packages set
/// (a package's own `.d.ts` files commonly re-export from themselves).
#[must_use]
pub fn load_entry_from_dir(pkg_dir: &Path, own_name: Option<&str>) -> Option<TypeDefCacheEntry> {
    if !pkg_dir.is_dir() {
        return None;
    }

    let mut files = BTreeMap::new();
    collect_type_files(pkg_dir, pkg_dir, &mut files);

    let mut referenced = BTreeSet::new();
    for text in files.values() {
        for pkg in referenced_specifiers(text) {
            referenced.insert(pkg);
        }
    }
    if let Some(name) = own_name {
        referenced.remove(name);
    }

    let entry_point = read_entry_point(pkg_dir);

    Some(TypeDefCacheEntry {
        files,
        referenced_packages: referenced.into_iter().collect(),
        entry_point,
    })
}

fn collect_type_files(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some("node_modules") {
                continue;
            }
            collect_type_files(root, &path, out);
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !TYPE_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        out.insert(relative, text);
    }
}

/// Extract bare (non-relative) module specifiers referenced via `import
/// ... from "x"` or `require("x")` in a declaration file's text.
fn referenced_specifiers(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for marker in ["from \"", "from '", "require(\"", "require('"] {
        let mut rest = text;
        while let Some(idx) = rest.find(marker) {
            rest = &rest[idx + marker.len()..];
            let quote = if marker.ends_with('\'') { '\'' } else { '"' };
            if let Some(end) = rest.find(quote) {
                let spec = &rest[..end];
                if !spec.starts_with('.') && !spec.starts_with('/') {
                    found.push(spec.to_string());
                }
                rest = &rest[end + 1..];
            } else {
                break;
            }
        }
    }
    found
}

fn read_entry_point(pkg_dir: &Path) -> Option<String> {
    let text = std::fs::read_to_string(pkg_dir.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    let field = value
        .get("types")
        .or_else(|| value.get("typings"))
        .and_then(serde_json::Value::as_str)?;
    if field.is_empty() {
        return None;
    }
    Some(PathBuf::from(field).to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_package_directory_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_entry(dir.path(), "zod").is_none());
    }

    #[test]
    fn loads_declaration_files_and_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("node_modules").join("zod");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("index.d.ts"),
            "import { helper } from \"tslib\";\nexport declare const z: unknown;\n",
        )
        .unwrap();
        std::fs::write(pkg_dir.join("package.json"), r#"{"types":"index.d.ts"}"#).unwrap();

        let entry = load_entry(dir.path(), "zod").unwrap();
        assert!(entry.files.contains_key("index.d.ts"));
        assert_eq!(entry.referenced_packages, vec!["tslib".to_string()]);
        assert_eq!(entry.entry_point.as_deref(), Some("index.d.ts"));
    }

    #[test]
    fn relative_imports_are_not_treated_as_references() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("node_modules").join("zod");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("index.d.ts"),
            "import { helper } from \"./internal\";\n",
        )
        .unwrap();

        let entry = load_entry(dir.path(), "zod").unwrap();
        assert!(entry.referenced_packages.is_empty());
    }
}
