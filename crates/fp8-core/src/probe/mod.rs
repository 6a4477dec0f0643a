//! Signal probes.
//!
//! The FP8 decision reads three signals from the host:
//! - the device compute capability
//! - the cuBLASLt encoded version
//! - the CUDA runtime version string (possibly absent)
//!
//! [`CapabilityProbe`] is the seam between the decision logic and the
//! host. [`SystemProbe`] reads the real machine, [`OverrideProbe`] pins
//! individual signals from configuration, and [`StaticProbe`] serves
//! fixed values (and counts how often it was asked).

mod overrides;
mod static_probe;
mod system;
pub mod tool_runner;

pub use overrides::{checked_cuda_override, OverrideProbe, SignalOverrides};
pub use static_probe::{ProbeCalls, StaticProbe};
pub use system::{
    find_cublaslt_in_dirs, parse_cublas_header, parse_cublaslt_filename, parse_nvcc_release,
    parse_nvidia_smi_compute_cap, parse_version_json, parse_version_txt, SystemProbe,
    SystemProbeConfig,
};
pub use tool_runner::{ToolConfig, ToolError, ToolOutput, ToolRunner};

use fp8_common::{ComputeCapability, CublasLtVersion};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The three host signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    DeviceCapability,
    CublasLtVersion,
    CudaVersion,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::DeviceCapability => write!(f, "device compute capability"),
            Signal::CublasLtVersion => write!(f, "cuBLASLt version"),
            Signal::CudaVersion => write!(f, "CUDA version"),
        }
    }
}

/// Errors raised while reading a signal.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("{tool} exited with status {code:?}: {stderr}")]
    ToolExit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("no CUDA device reported by {0}")]
    NoDevice(String),

    #[error("{signal} not found: {detail}")]
    NotFound { signal: Signal, detail: String },

    #[error(transparent)]
    Parse(#[from] fp8_common::Error),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ProbeError> for fp8_common::Error {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Tool(ToolError::Timeout(d)) => fp8_common::Error::ProbeTimeout {
                millis: d.as_millis() as u64,
            },
            ProbeError::Tool(e) => fp8_common::Error::ToolFailed(e.to_string()),
            e @ ProbeError::ToolExit { .. } => fp8_common::Error::ToolFailed(e.to_string()),
            ProbeError::NoDevice(tool) => {
                fp8_common::Error::DeviceUnavailable(format!("no device reported by {}", tool))
            }
            ProbeError::NotFound { signal, detail } => fp8_common::Error::SignalNotFound {
                signal: signal.to_string(),
                detail,
            },
            ProbeError::Parse(e) => e,
            ProbeError::Io { source, .. } => fp8_common::Error::Io(source),
        }
    }
}

/// Read-only access to the signals the FP8 decision needs.
///
/// Implementations must not cache: caching is the job of
/// [`crate::capabilities::Fp8Cache`].
pub trait CapabilityProbe {
    /// Compute capability of the current device.
    fn device_capability(&self) -> Result<ComputeCapability, ProbeError>;

    /// Encoded cuBLASLt version (`MAJOR*10000 + MINOR*100 + PATCH`).
    fn cublaslt_version(&self) -> Result<CublasLtVersion, ProbeError>;

    /// CUDA runtime version string; `None` when unknown.
    fn cuda_version(&self) -> Result<Option<String>, ProbeError>;
}

impl<P: CapabilityProbe + ?Sized> CapabilityProbe for &P {
    fn device_capability(&self) -> Result<ComputeCapability, ProbeError> {
        (**self).device_capability()
    }

    fn cublaslt_version(&self) -> Result<CublasLtVersion, ProbeError> {
        (**self).cublaslt_version()
    }

    fn cuda_version(&self) -> Result<Option<String>, ProbeError> {
        (**self).cuda_version()
    }
}

impl<P: CapabilityProbe + ?Sized> CapabilityProbe for Box<P> {
    fn device_capability(&self) -> Result<ComputeCapability, ProbeError> {
        (**self).device_capability()
    }

    fn cublaslt_version(&self) -> Result<CublasLtVersion, ProbeError> {
        (**self).cublaslt_version()
    }

    fn cuda_version(&self) -> Result<Option<String>, ProbeError> {
        (**self).cuda_version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_maps_to_probe_timeout() {
        let err = ProbeError::Tool(ToolError::Timeout(Duration::from_millis(250)));
        let common: fp8_common::Error = err.into();
        assert!(matches!(
            common,
            fp8_common::Error::ProbeTimeout { millis: 250 }
        ));
    }

    #[test]
    fn test_not_found_maps_to_signal_not_found() {
        let err = ProbeError::NotFound {
            signal: Signal::CublasLtVersion,
            detail: "no libcublasLt".into(),
        };
        assert_eq!(err.to_string(), "cuBLASLt version not found: no libcublasLt");
        let common: fp8_common::Error = err.into();
        assert_eq!(common.code(), 21);
    }

    #[test]
    fn test_parse_error_passes_through() {
        let parse = "12.x".parse::<fp8_common::CudaVersion>().unwrap_err();
        let err = ProbeError::from(parse);
        let common: fp8_common::Error = err.into();
        assert!(matches!(common, fp8_common::Error::InvalidVersion { .. }));
    }
}
