// SPDX-License-Identifier: MIT OR Apache-2.0
//! The skip-list.

/// Node.js platform built-ins with no installable type package of their own.
const PLATFORM_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "crypto", "dgram", "dns", "events", "fs",
    "http", "http2", "https", "net", "os", "path", "perf_hooks", "process", "querystring",
    "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util", "v8", "vm",
    "zlib",
];

/// Package-name prefixes reserved for host-internal wiring; never installed
/// as a panel dependency.
const INTERNAL_ONLY_PREFIXES: &[&str] = &["@panelhost/internal-", "@panelhost/host-"];

/// `true` if `name` must be skipped under the fixed skip rules:
/// `node:`-prefixed, a platform built-in, `#`-prefixed (Node subpath
/// imports), the literal `node_modules`, or an internal-only prefix.
#[must_use]
pub fn should_skip(name: &str) -> bool {
    name.starts_with("node:")
        || PLATFORM_BUILTINS.contains(&name)
        || name.starts_with('#')
        || name == "node_modules"
        || INTERNAL_ONLY_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_prefixed_specifiers_are_skipped() {
        assert!(should_skip("node:fs"));
        assert!(should_skip("node:path"));
    }

    #[test]
    fn platform_builtins_are_skipped() {
        assert!(should_skip("fs"));
        assert!(should_skip("crypto"));
        assert!(!should_skip("lodash"));
    }

    #[test]
    fn hash_prefixed_and_internal_names_are_skipped() {
        assert!(should_skip("#internal/foo"));
        assert!(should_skip("node_modules"));
        assert!(should_skip("@panelhost/internal-bridge"));
        assert!(!should_skip("@panelhost/view"));
    }
}
