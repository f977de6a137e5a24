// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `sanitize_workspace_filename`: for any input, the output must
//! never contain a path separator, `.`, or a control character, so it is
//! always safe to use as a SQLite file name.
#![no_main]
use libfuzzer_sys::fuzz_target;
use ph_tree_store::sanitize_workspace_filename;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let sanitized = sanitize_workspace_filename(s);
    assert!(sanitized.ends_with(".sqlite3"));
    let base = sanitized.strip_suffix(".sqlite3").unwrap();
    assert!(!base.is_empty());
    for c in base.chars() {
        assert!(
            c != '/' && c != '\\' && c != ':' && c != '.' && !c.is_control(),
            "sanitized filename retained an unsafe character: {c:?}"
        );
    }
});
