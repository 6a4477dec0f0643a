//! Pinned signal values layered over another probe.

use super::{CapabilityProbe, ProbeError};
use fp8_common::{ComputeCapability, CublasLtVersion, CudaVersion};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable pinning the device compute capability (`"8.9"`).
pub const ENV_COMPUTE_CAP: &str = "FP8_PROBE_COMPUTE_CAP";
/// Environment variable pinning the cuBLASLt version (`"120103"` or `"12.1.3"`).
pub const ENV_CUBLASLT_VERSION: &str = "FP8_PROBE_CUBLASLT_VERSION";
/// Environment variable pinning the CUDA version. Empty means "absent".
pub const ENV_CUDA_VERSION: &str = "FP8_PROBE_CUDA_VERSION";

/// Signals pinned by configuration or environment.
///
/// `cuda_version` of `Some("")` pins the CUDA version as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalOverrides {
    pub compute_capability: Option<ComputeCapability>,
    pub cublaslt_version: Option<CublasLtVersion>,
    pub cuda_version: Option<String>,
}

impl SignalOverrides {
    /// Read overrides from `FP8_PROBE_*` environment variables.
    pub fn from_env() -> Result<Self, fp8_common::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup, for tests and embedding.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, fp8_common::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let compute_capability = lookup(ENV_COMPUTE_CAP)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse())
            .transpose()?;
        let cublaslt_version = lookup(ENV_CUBLASLT_VERSION)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse())
            .transpose()?;
        let cuda_version = lookup(ENV_CUDA_VERSION)
            .map(|v| checked_cuda_override(&v))
            .transpose()?;

        Ok(Self {
            compute_capability,
            cublaslt_version,
            cuda_version,
        })
    }

    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merged(mut self, other: SignalOverrides) -> Self {
        if other.compute_capability.is_some() {
            self.compute_capability = other.compute_capability;
        }
        if other.cublaslt_version.is_some() {
            self.cublaslt_version = other.cublaslt_version;
        }
        if other.cuda_version.is_some() {
            self.cuda_version = other.cuda_version;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.compute_capability.is_none()
            && self.cublaslt_version.is_none()
            && self.cuda_version.is_none()
    }
}

/// Trim a CUDA version override and make sure it parses. A blank value
/// stays `""`, meaning "absent".
pub fn checked_cuda_override(raw: &str) -> Result<String, fp8_common::Error> {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        trimmed.parse::<CudaVersion>()?;
    }
    Ok(trimmed.to_string())
}

/// Probe that answers pinned signals itself and delegates the rest.
#[derive(Debug, Clone)]
pub struct OverrideProbe<P> {
    inner: P,
    overrides: SignalOverrides,
}

impl<P: CapabilityProbe> OverrideProbe<P> {
    pub fn new(inner: P, overrides: SignalOverrides) -> Self {
        Self { inner, overrides }
    }

    pub fn overrides(&self) -> &SignalOverrides {
        &self.overrides
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: CapabilityProbe> CapabilityProbe for OverrideProbe<P> {
    fn device_capability(&self) -> Result<ComputeCapability, ProbeError> {
        match self.overrides.compute_capability {
            Some(cap) => {
                debug!(capability = %cap, "compute capability pinned");
                Ok(cap)
            }
            None => self.inner.device_capability(),
        }
    }

    fn cublaslt_version(&self) -> Result<CublasLtVersion, ProbeError> {
        match self.overrides.cublaslt_version {
            Some(version) => {
                debug!(%version, "cuBLASLt version pinned");
                Ok(version)
            }
            None => self.inner.cublaslt_version(),
        }
    }

    fn cuda_version(&self) -> Result<Option<String>, ProbeError> {
        match &self.overrides.cuda_version {
            Some(v) if v.is_empty() => {
                debug!("CUDA version pinned as absent");
                Ok(None)
            }
            Some(v) => {
                debug!(version = %v, "CUDA version pinned");
                Ok(Some(v.clone()))
            }
            None => self.inner.cuda_version(),
        }
    }
}
