//! Fuzz target for tool output and toolkit file parsing.
//!
//! nvidia-smi / nvcc output and toolkit files come from the host, so the
//! parsers must handle arbitrary input without panicking.

#![no_main]

use fp8_core::probe::{
    parse_cublas_header, parse_cublaslt_filename, parse_nvcc_release,
    parse_nvidia_smi_compute_cap, parse_version_json, parse_version_txt,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);

    let _ = parse_nvidia_smi_compute_cap(&s);
    let _ = parse_cublaslt_filename(&s);
    let _ = parse_cublas_header(&s);
    let _ = parse_version_json(&s);
    let _ = parse_version_txt(&s);
    let _ = parse_nvcc_release(&s);
});
