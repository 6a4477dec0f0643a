//! FP8 capability decision and caching.
//!
//! This module decides whether the current device can run FP8 kernels:
//! - Hopper and newer (compute capability 9.0+) always qualify
//! - Anything older than Ada (8.9) never does
//! - Ada additionally needs cuBLASLt 12.1.3 and CUDA 12.1
//!
//! The verdict is computed on first request and kept for the life of the
//! cache ("first answer wins").

mod cache;
mod detect;

pub use cache::{global_cache, is_fp8_available, query_fp8_support, Fp8Cache, SystemCache};
pub use detect::check_fp8_support;
