//! Verdict caching.
//!
//! [`Fp8Cache`] owns a probe and remembers the first verdict it produces.
//! The free functions at the bottom wrap one process-wide cache built from
//! the environment-resolved configuration.

use super::detect::check_fp8_support;
use crate::config::{load_config, ConfigOptions};
use crate::probe::{CapabilityProbe, OverrideProbe, ProbeError, SystemProbe};
use fp8_common::Fp8Verdict;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Compute-once holder for an FP8 verdict.
///
/// Probe failures are not remembered; the next query probes again.
#[derive(Debug)]
pub struct Fp8Cache<P> {
    probe: P,
    verdict: OnceLock<Fp8Verdict>,
}

impl<P: CapabilityProbe> Fp8Cache<P> {
    pub const fn new(probe: P) -> Self {
        Self {
            probe,
            verdict: OnceLock::new(),
        }
    }

    /// Return the cached verdict, computing it on first use.
    ///
    /// Concurrent first callers may each run the probes; the first value
    /// stored is the one every caller sees.
    pub fn query_fp8_support(&self) -> Result<Fp8Verdict, ProbeError> {
        if let Some(verdict) = self.verdict.get() {
            return Ok(*verdict);
        }

        let computed = check_fp8_support(&self.probe)?;
        let verdict = *self.verdict.get_or_init(|| computed);
        info!(
            supported = verdict.is_supported(),
            reason = verdict.reason(),
            "FP8 support determined"
        );
        Ok(verdict)
    }

    /// Shorthand for `query_fp8_support()?.is_supported()`.
    pub fn is_fp8_available(&self) -> Result<bool, ProbeError> {
        self.query_fp8_support().map(|v| v.is_supported())
    }

    pub fn cached(&self) -> Option<&Fp8Verdict> {
        self.verdict.get()
    }

    pub fn is_computed(&self) -> bool {
        self.verdict.get().is_some()
    }

    /// Forget the cached verdict. Requires exclusive access, so it cannot
    /// race with readers.
    pub fn reset(&mut self) {
        if self.verdict.take().is_some() {
            debug!("FP8 verdict cache reset");
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }
}

/// The cache type behind the process-wide entry points.
pub type SystemCache = Fp8Cache<OverrideProbe<SystemProbe>>;

static GLOBAL_CACHE: OnceLock<SystemCache> = OnceLock::new();

/// The process-wide cache, created from the default configuration
/// sources on first use. A configuration error leaves it uncreated.
pub fn global_cache() -> Result<&'static SystemCache, fp8_common::Error> {
    if let Some(cache) = GLOBAL_CACHE.get() {
        return Ok(cache);
    }

    let loaded = load_config(&ConfigOptions::default())?;
    debug!(source = ?loaded.source, "building process-wide FP8 cache");
    let probe = OverrideProbe::new(
        SystemProbe::new(loaded.config.system_probe_config()),
        loaded.overrides,
    );
    Ok(GLOBAL_CACHE.get_or_init(|| Fp8Cache::new(probe)))
}

/// Whether the current device supports FP8, and why not if it doesn't.
pub fn query_fp8_support() -> Result<Fp8Verdict, fp8_common::Error> {
    Ok(global_cache()?.query_fp8_support()?)
}

/// Whether the current device supports FP8.
pub fn is_fp8_available() -> Result<bool, fp8_common::Error> {
    Ok(global_cache()?.is_fp8_available()?)
}
