// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz the ns:// round-trip law: for any source string and
//! `NsUrlOpts` built from arbitrary input bytes,
//! `parse_ns_url(build_ns_url(source, opts))` must reproduce `(source, opts)`.
#![no_main]
use libfuzzer_sys::fuzz_target;
use ph_ns_url::{build_ns_url, parse_ns_url, NsUrlOpts};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if s.is_empty() {
        return;
    }

    let opts = NsUrlOpts {
        name: Some(s.to_string()),
        ..Default::default()
    };
    let url = build_ns_url(s, &opts);
    let parsed = parse_ns_url(&url).expect("build_ns_url must always emit a parseable URI");
    assert_eq!(parsed.source, s);
    assert_eq!(parsed.opts.name.as_deref(), Some(s));
});
