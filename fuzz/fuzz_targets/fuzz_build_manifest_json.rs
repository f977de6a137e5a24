// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `BuildManifest` JSON deserialization with arbitrary bytes: parsing
//! must never panic, and any manifest that does parse must round-trip
//! through re-serialization.
#![no_main]
use libfuzzer_sys::fuzz_target;
use ph_core::BuildManifest;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(manifest) = serde_json::from_str::<BuildManifest>(s) else {
        return;
    };

    let reserialized = serde_json::to_string(&manifest).expect("BuildManifest always serializes");
    let reparsed: BuildManifest =
        serde_json::from_str(&reserialized).expect("re-serialized manifest must reparse");
    assert_eq!(manifest, reparsed);
});
