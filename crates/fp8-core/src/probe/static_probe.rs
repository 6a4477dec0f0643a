//! Fixed-answer probe with call accounting.

use super::{CapabilityProbe, ProbeError, Signal};
use fp8_common::{ComputeCapability, CublasLtVersion};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How many times each signal was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeCalls {
    pub device: usize,
    pub cublaslt: usize,
    pub cuda: usize,
}

impl ProbeCalls {
    pub fn total(&self) -> usize {
        self.device + self.cublaslt + self.cuda
    }
}

#[derive(Debug, Default)]
struct Counter {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl Counter {
    /// Record a call; returns true when this call should fail.
    fn hit(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Probe returning preset values.
///
/// Each signal can be told to fail a number of times before answering,
/// which lets callers observe retry and caching behaviour.
#[derive(Debug)]
pub struct StaticProbe {
    capability: ComputeCapability,
    cublaslt: CublasLtVersion,
    cuda: Option<String>,
    device_counter: Counter,
    cublaslt_counter: Counter,
    cuda_counter: Counter,
}

impl StaticProbe {
    pub fn new(capability: ComputeCapability, cublaslt: u32, cuda: Option<&str>) -> Self {
        Self {
            capability,
            cublaslt: CublasLtVersion(cublaslt),
            cuda: cuda.map(str::to_string),
            device_counter: Counter::default(),
            cublaslt_counter: Counter::default(),
            cuda_counter: Counter::default(),
        }
    }

    /// Make the next `times` requests for `signal` fail.
    pub fn fail_next(&self, signal: Signal, times: usize) {
        self.counter(signal)
            .failures_left
            .store(times, Ordering::SeqCst);
    }

    pub fn calls(&self) -> ProbeCalls {
        ProbeCalls {
            device: self.device_counter.calls.load(Ordering::SeqCst),
            cublaslt: self.cublaslt_counter.calls.load(Ordering::SeqCst),
            cuda: self.cuda_counter.calls.load(Ordering::SeqCst),
        }
    }

    fn counter(&self, signal: Signal) -> &Counter {
        match signal {
            Signal::DeviceCapability => &self.device_counter,
            Signal::CublasLtVersion => &self.cublaslt_counter,
            Signal::CudaVersion => &self.cuda_counter,
        }
    }

    fn check(&self, signal: Signal) -> Result<(), ProbeError> {
        if self.counter(signal).hit() {
            return Err(ProbeError::NotFound {
                signal,
                detail: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl CapabilityProbe for StaticProbe {
    fn device_capability(&self) -> Result<ComputeCapability, ProbeError> {
        self.check(Signal::DeviceCapability)?;
        Ok(self.capability)
    }

    fn cublaslt_version(&self) -> Result<CublasLtVersion, ProbeError> {
        self.check(Signal::CublasLtVersion)?;
        Ok(self.cublaslt)
    }

    fn cuda_version(&self) -> Result<Option<String>, ProbeError> {
        self.check(Signal::CudaVersion)?;
        Ok(self.cuda.clone())
    }
}
