//! The uncached FP8 decision table.

use crate::probe::{CapabilityProbe, ProbeError};
use fp8_common::{
    ComputeCapability, CublasLtVersion, CudaVersion, Fp8Verdict, UnsupportedReason,
};
use tracing::{debug, instrument};

/// Decide FP8 support from the probe's signals.
///
/// Checks run in order and stop at the first one that decides; later
/// signals are never read. Probe failures are returned unchanged.
#[instrument(skip(probe))]
pub fn check_fp8_support<P>(probe: &P) -> Result<Fp8Verdict, ProbeError>
where
    P: CapabilityProbe + ?Sized,
{
    let arch = probe.device_capability()?;
    debug!(%arch, "device compute capability");

    if arch >= ComputeCapability::HOPPER {
        return Ok(Fp8Verdict::Supported);
    }
    if arch < ComputeCapability::ADA {
        return Ok(Fp8Verdict::Unsupported(
            UnsupportedReason::DeviceComputeCapability,
        ));
    }

    let cublaslt = probe.cublaslt_version()?;
    debug!(%cublaslt, "cuBLASLt version");
    if cublaslt < CublasLtVersion::MIN_ADA_FP8 {
        return Ok(Fp8Verdict::Unsupported(UnsupportedReason::CublasLtVersion));
    }

    let cuda = match probe.cuda_version()? {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            debug!("CUDA version absent");
            return Ok(Fp8Verdict::Unsupported(UnsupportedReason::CudaVersion));
        }
    };
    let cuda: CudaVersion = cuda.parse()?;
    debug!(%cuda, "CUDA version");
    if !cuda.at_least(CudaVersion::MIN_ADA_FP8) {
        return Ok(Fp8Verdict::Unsupported(UnsupportedReason::CudaVersion));
    }

    Ok(Fp8Verdict::Supported)
}
