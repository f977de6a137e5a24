// SPDX-License-Identifier: MIT OR Apache-2.0
//! External-specifier resolution and framework-integration detection.

use ph_core::BuildManifest;
use std::collections::BTreeMap;

/// The package name a panel depends on to opt into auto-mount wrapping:
/// if the source declares a dependency on it, the synthetic entry wraps
/// the user entry in a `mount()` call instead of importing it directly.
pub const FRAMEWORK_INTEGRATION_PACKAGE: &str = "@panelhost/view";

/// Peer dependencies pulled in automatically when
/// [`FRAMEWORK_INTEGRATION_PACKAGE`] is present, unless the manifest
/// already names them explicitly.
const FRAMEWORK_PEER_DEPENDENCIES: &[(&str, &str)] = &[("react", "^18"), ("react-dom", "^18")];

/// Type definitions for the host runtime, merged into every effective
/// dependency set regardless of framework use.
const DEFAULT_RUNTIME_DEPENDENCIES: &[(&str, &str)] = &[("@panelhost/runtime-types", "^1")];

/// Compute the effective dependency set for a build: the manifest's own
/// dependencies, plus host runtime type definitions, plus (when opted in)
/// the framework-integration package's peer dependencies. Explicit
/// manifest entries always win over defaults.
#[must_use]
pub fn effective_dependencies(manifest: &BuildManifest) -> BTreeMap<String, String> {
    let mut dependencies = manifest.dependencies.clone();
    for (name, spec) in DEFAULT_RUNTIME_DEPENDENCIES {
        dependencies
            .entry((*name).to_string())
            .or_insert_with(|| (*spec).to_string());
    }
    merge_framework_peers(&mut dependencies);
    dependencies
}

/// Packages that are never bundled, and the CDN ESM URL used to satisfy
/// them at load time instead. Keyed on the dependency
/// name as it would appear in [`BuildManifest::dependencies`].
const IMPLICIT_EXTERNALS: &[(&str, &str)] = &[(
    "isomorphic-git",
    "https://esm.sh/isomorphic-git@1?bundle",
)];

/// `true` if `manifest` declares a dependency on the framework-integration
/// package, i.e. the wrapper should auto-mount the user entry.
#[must_use]
pub fn wants_framework_wrapper(manifest: &BuildManifest) -> bool {
    manifest.dependencies.contains_key(FRAMEWORK_INTEGRATION_PACKAGE)
}

/// Merge framework peer dependencies into `dependencies` when the
/// framework-integration package is present and the peer isn't already
/// declared explicitly.
pub fn merge_framework_peers(dependencies: &mut BTreeMap<String, String>) {
    if !dependencies.contains_key(FRAMEWORK_INTEGRATION_PACKAGE) {
        return;
    }
    for (name, spec) in FRAMEWORK_PEER_DEPENDENCIES {
        dependencies
            .entry((*name).to_string())
            .or_insert_with(|| (*spec).to_string());
    }
}

/// Union the manifest's own `externals` map with [`IMPLICIT_EXTERNALS`]
/// entries whose package is present in `dependencies`. Explicit entries in
/// the manifest win on key collision.
#[must_use]
pub fn resolve_externals(
    manifest: &BuildManifest,
    dependencies: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut resolved: BTreeMap<String, String> = IMPLICIT_EXTERNALS
        .iter()
        .filter(|(name, _)| dependencies.contains_key(*name))
        .map(|(name, url)| ((*name).to_string(), (*url).to_string()))
        .collect();
    resolved.extend(manifest.externals.clone());
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_peers_are_added_only_when_opted_in() {
        let mut deps = BTreeMap::new();
        let mut with_view = deps.clone();
        with_view.insert(FRAMEWORK_INTEGRATION_PACKAGE.to_string(), "^1".to_string());

        merge_framework_peers(&mut deps);
        assert!(!deps.contains_key("react"));

        merge_framework_peers(&mut with_view);
        assert_eq!(with_view["react"], "^18");
    }

    #[test]
    fn explicit_peer_spec_is_not_overwritten() {
        let mut deps = BTreeMap::new();
        deps.insert(FRAMEWORK_INTEGRATION_PACKAGE.to_string(), "^1".to_string());
        deps.insert("react".to_string(), "^19".to_string());
        merge_framework_peers(&mut deps);
        assert_eq!(deps["react"], "^19");
    }

    #[test]
    fn effective_dependencies_include_runtime_types_by_default() {
        let manifest = BuildManifest::default();
        let deps = effective_dependencies(&manifest);
        assert_eq!(deps["@panelhost/runtime-types"], "^1");
    }

    #[test]
    fn effective_dependencies_pull_in_framework_peers_when_opted_in() {
        let mut manifest = BuildManifest::default();
        manifest
            .dependencies
            .insert(FRAMEWORK_INTEGRATION_PACKAGE.to_string(), "^1".to_string());
        let deps = effective_dependencies(&manifest);
        assert_eq!(deps["react"], "^18");
        assert_eq!(deps["react-dom"], "^18");
    }

    #[test]
    fn implicit_external_only_applies_when_dependency_present() {
        let manifest = BuildManifest::default();
        let mut deps = BTreeMap::new();
        assert!(resolve_externals(&manifest, &deps).is_empty());

        deps.insert("isomorphic-git".to_string(), "^1".to_string());
        let resolved = resolve_externals(&manifest, &deps);
        assert_eq!(resolved["isomorphic-git"], "https://esm.sh/isomorphic-git@1?bundle");
    }

    #[test]
    fn manifest_externals_take_precedence() {
        let mut manifest = BuildManifest::default();
        manifest
            .externals
            .insert("isomorphic-git".to_string(), "https://example.com/pinned.js".to_string());
        let mut deps = BTreeMap::new();
        deps.insert("isomorphic-git".to_string(), "^1".to_string());
        let resolved = resolve_externals(&manifest, &deps);
        assert_eq!(resolved["isomorphic-git"], "https://example.com/pinned.js");
    }
}
