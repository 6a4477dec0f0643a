//! FP8 probe common types and errors.
//!
//! This crate provides the foundational types shared by fp8-core:
//! - Signal types (compute capability, cuBLASLt version, CUDA version)
//! - The FP8 capability verdict and its reason codes
//! - Common error types
//! - Output format specifications

pub mod error;
pub mod output;
pub mod schema;
pub mod verdict;
pub mod version;

pub use error::{Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
pub use verdict::{Fp8Verdict, UnsupportedReason};
pub use version::{ComputeCapability, CublasLtVersion, CudaVersion};
