// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `should_skip`: must never panic, and must agree with its own
//! documented rules for every arbitrary package name.
#![no_main]
use libfuzzer_sys::fuzz_target;
use ph_typedefs::should_skip;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };

    let skip = should_skip(name);
    if name.starts_with("node:") || name.starts_with('#') || name == "node_modules" {
        assert!(skip, "{name:?} should have been skipped");
    }
});
