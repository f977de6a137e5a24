// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz `PanelHostConfig` TOML parsing and validation: neither `toml::from_str`
//! nor `PanelHostConfig::validate` may panic on arbitrary input, and a
//! successfully parsed config must round-trip through TOML serialization.
#![no_main]
use libfuzzer_sys::fuzz_target;
use ph_config::PanelHostConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(config) = toml::from_str::<PanelHostConfig>(s) else {
        return;
    };

    match config.validate() {
        Ok(warnings) => {
            for w in &warnings {
                let _ = format!("{w}");
            }
        }
        Err(e) => {
            let _ = format!("{e}");
        }
    }

    if let Ok(rt_toml) = toml::to_string(&config) {
        let _ = toml::from_str::<PanelHostConfig>(&rt_toml);
    }
});
