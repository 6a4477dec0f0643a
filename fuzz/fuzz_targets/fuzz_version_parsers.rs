//! Fuzz target for the signal version parsers.
//!
//! Parsing must never panic, and anything that parses must survive a
//! display/parse cycle unchanged.

#![no_main]

use fp8_common::{ComputeCapability, CublasLtVersion, CudaVersion};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(cap) = s.parse::<ComputeCapability>() {
        assert_eq!(cap.to_string().parse::<ComputeCapability>().ok(), Some(cap));
    }
    if let Ok(v) = s.parse::<CublasLtVersion>() {
        assert_eq!(v.to_string().parse::<CublasLtVersion>().ok(), Some(v));
    }
    if let Ok(v) = s.parse::<CudaVersion>() {
        let _ = v.at_least(CudaVersion::MIN_ADA_FP8);
    }
});
