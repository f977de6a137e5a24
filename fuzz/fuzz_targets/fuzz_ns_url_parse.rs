// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz the ns:// parser with arbitrary bytes, checking it never panics and
//! never accepts a URI that decodes to an empty source.
#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(addr) = ph_ns_url::parse_ns_url(s) {
        assert!(!addr.source.is_empty(), "parse_ns_url accepted an empty source");
        // Display/emit must not panic on whatever we just parsed.
        let rebuilt = ph_ns_url::build_ns_url(&addr.source, &addr.opts);
        let _ = ph_ns_url::parse_ns_url(&rebuilt);
    }
});
