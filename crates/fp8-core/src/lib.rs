//! FP8 capability probe core library.
//!
//! This library decides whether the current CUDA device can execute FP8
//! kernels:
//! - Signal probes (device compute capability, cuBLASLt, CUDA)
//! - The ordered decision table and its compute-once cache
//! - Configuration loading and validation
//! - Logging setup and CLI exit codes
//!
//! The binary entry point is in `main.rs`.
//!
//! ```no_run
//! let verdict = fp8_core::capabilities::query_fp8_support()?;
//! if !verdict.is_supported() {
//!     eprintln!("FP8 disabled: {}", verdict.reason());
//! }
//! # Ok::<(), fp8_common::Error>(())
//! ```

pub mod capabilities;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod probe;

pub use capabilities::{check_fp8_support, is_fp8_available, query_fp8_support, Fp8Cache};
pub use fp8_common::{Fp8Verdict, UnsupportedReason};
