//! Fuzz target for config.toml parsing and validation.

#![no_main]

use fp8_core::config::ProbeConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    // Should never panic, only return an error
    if let Ok(config) = toml::from_str::<ProbeConfig>(s) {
        let _ = config.validate();
    }
});
