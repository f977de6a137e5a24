// SPDX-License-Identifier: MIT OR Apache-2.0
//! Synthetic entry-file generation.
//!
//! The wrapper is deterministic in `(has_framework, relative_user_entry)`
//! alone, so it is never part of the cache key or the dependency hash.

/// File name of the synthesised entry written into the runtime directory.
pub const WRAPPER_FILE_NAME: &str = "__panelhost_entry.js";

/// Build the wrapper source. `entry_specifier` is the absolute filesystem
/// path of the resolved user entry (esbuild resolves absolute-path
/// specifiers directly, so the wrapper need not live alongside the source
/// tree it imports from). When `has_framework` is set the user entry is
/// imported and passed to the framework-integration package's auto-mount
/// export; otherwise the user entry is imported purely for its side effects.
#[must_use]
pub fn synthesize_wrapper(entry_specifier: &str, has_framework: bool) -> String {
    if has_framework {
        format!(
            "import {{ mount }} from \"{}\";\nimport * as userEntry from {entry_specifier:?};\nmount(userEntry);\n",
            crate::externals::FRAMEWORK_INTEGRATION_PACKAGE
        )
    } else {
        format!("import {entry_specifier:?};\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_wrapper_just_imports_the_entry() {
        let wrapper = synthesize_wrapper("/src/index.ts", false);
        assert_eq!(wrapper, "import \"/src/index.ts\";\n");
    }

    #[test]
    fn framework_wrapper_mounts_the_entry() {
        let wrapper = synthesize_wrapper("/src/index.tsx", true);
        assert!(wrapper.contains("import { mount } from \"@panelhost/view\";"));
        assert!(wrapper.contains("import * as userEntry from \"/src/index.tsx\";"));
        assert!(wrapper.contains("mount(userEntry);"));
    }
}
