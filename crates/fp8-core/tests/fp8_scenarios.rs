//! End-to-end verdict scenarios through the cache.
//!
//! Every case uses a [`StaticProbe`], so results do not depend on the host.

use fp8_common::{ComputeCapability, Fp8Verdict, UnsupportedReason};
use fp8_core::capabilities::{check_fp8_support, Fp8Cache};
use fp8_core::probe::{
    CapabilityProbe, OverrideProbe, ProbeCalls, Signal, SignalOverrides, StaticProbe,
};

const DEVICE_REASON: &str = "Device compute capability 8.9 or higher required for FP8 execution.";
const CUBLASLT_REASON: &str =
    "CublasLt version 12.1.3.x or higher required for FP8 execution on Ada.";
const CUDA_REASON: &str = "Cuda version 12.1 or higher required for FP8 execution on Ada.";

fn query(cap: (u32, u32), cublaslt: u32, cuda: Option<&str>) -> (bool, String) {
    let cache = Fp8Cache::new(StaticProbe::new(cap.into(), cublaslt, cuda));
    cache.query_fp8_support().unwrap().into()
}

// ============================================================================
// Concrete scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[test]
    fn hopper_is_supported() {
        assert_eq!(query((9, 0), 0, None), (true, String::new()));
    }

    #[test]
    fn ampere_lacks_compute_capability() {
        assert_eq!(query((8, 0), 120103, Some("12.1")), (false, DEVICE_REASON.into()));
    }

    #[test]
    fn ada_with_old_cublaslt() {
        assert_eq!(query((8, 9), 120050, Some("12.1")), (false, CUBLASLT_REASON.into()));
    }

    #[test]
    fn ada_without_cuda_version() {
        assert_eq!(query((8, 9), 120103, None), (false, CUDA_REASON.into()));
    }

    #[test]
    fn ada_with_old_cuda() {
        assert_eq!(query((8, 9), 120200, Some("12.0.1")), (false, CUDA_REASON.into()));
    }

    #[test]
    fn ada_with_new_enough_stack() {
        assert_eq!(query((8, 9), 120103, Some("12.1.0")), (true, String::new()));
    }

    #[test]
    fn blackwell_ignores_other_signals() {
        assert_eq!(query((10, 0), 0, Some("garbage")), (true, String::new()));
    }
}

// ============================================================================
// Cache behaviour
// ============================================================================

mod caching {
    use super::*;

    #[test]
    fn repeated_queries_probe_once() {
        let cache = Fp8Cache::new(StaticProbe::new(ComputeCapability::ADA, 120103, Some("12.1")));
        let first = cache.query_fp8_support().unwrap();
        for _ in 0..5 {
            assert_eq!(cache.query_fp8_support().unwrap(), first);
        }
        assert_eq!(
            cache.probe().calls(),
            ProbeCalls {
                device: 1,
                cublaslt: 1,
                cuda: 1
            }
        );
    }

    #[test]
    fn first_answer_wins() {
        // The probe changing its mind after the first query is not observed.
        let cache = Fp8Cache::new(StaticProbe::new(ComputeCapability::ADA, 120103, None));
        assert_eq!(
            cache.query_fp8_support().unwrap(),
            Fp8Verdict::Unsupported(UnsupportedReason::CudaVersion)
        );
        cache.probe().fail_next(Signal::DeviceCapability, 10);
        assert!(cache.query_fp8_support().is_ok());
        assert_eq!(cache.probe().calls().device, 1);
    }

    #[test]
    fn failed_probe_leaves_cache_empty() {
        let cache = Fp8Cache::new(StaticProbe::new(ComputeCapability::ADA, 120103, Some("12.2")));
        cache.probe().fail_next(Signal::CudaVersion, 1);

        assert!(cache.query_fp8_support().is_err());
        assert!(!cache.is_computed());
        assert_eq!(cache.query_fp8_support().unwrap(), Fp8Verdict::Supported);
        assert_eq!(cache.probe().calls().cuda, 2);
    }

    #[test]
    fn reset_allows_recomputation() {
        let mut cache = Fp8Cache::new(StaticProbe::new(ComputeCapability::HOPPER, 0, None));
        cache.query_fp8_support().unwrap();
        cache.reset();
        assert!(!cache.is_computed());
        cache.query_fp8_support().unwrap();
        assert_eq!(cache.probe().calls().device, 2);
    }
}

// ============================================================================
// Short-circuiting
// ============================================================================

mod short_circuit {
    use super::*;

    fn calls_for(cap: (u32, u32), cublaslt: u32) -> ProbeCalls {
        let probe = StaticProbe::new(cap.into(), cublaslt, Some("12.4"));
        check_fp8_support(&probe).unwrap();
        probe.calls()
    }

    #[test]
    fn device_decision_reads_only_device() {
        assert_eq!(calls_for((9, 0), 120103).total(), 1);
        assert_eq!(calls_for((7, 5), 120103).total(), 1);
    }

    #[test]
    fn cublaslt_decision_skips_cuda() {
        let calls = calls_for((8, 9), 110000);
        assert_eq!((calls.device, calls.cublaslt, calls.cuda), (1, 1, 0));
    }

    #[test]
    fn a_failing_later_probe_is_never_reached() {
        let probe = StaticProbe::new(ComputeCapability::new(8, 6), 0, None);
        probe.fail_next(Signal::CublasLtVersion, 1);
        probe.fail_next(Signal::CudaVersion, 1);
        assert_eq!(
            check_fp8_support(&probe).unwrap().reason(),
            DEVICE_REASON
        );
    }
}

// ============================================================================
// Overrides
// ============================================================================

mod overrides {
    use super::*;

    #[test]
    fn pinned_signals_drive_the_verdict() {
        let inner = StaticProbe::new(ComputeCapability::new(7, 0), 0, None);
        let probe = OverrideProbe::new(
            &inner,
            SignalOverrides {
                compute_capability: Some(ComputeCapability::ADA),
                cublaslt_version: Some(fp8_common::CublasLtVersion(120103)),
                cuda_version: Some("12.1".into()),
            },
        );
        let cache = Fp8Cache::new(probe);
        assert!(cache.is_fp8_available().unwrap());
        assert_eq!(inner.calls().total(), 0);
    }

    #[test]
    fn empty_cuda_override_means_absent() {
        let inner = StaticProbe::new(ComputeCapability::ADA, 120103, Some("12.4"));
        let probe = OverrideProbe::new(
            &inner,
            SignalOverrides {
                cuda_version: Some(String::new()),
                ..Default::default()
            },
        );
        assert_eq!(probe.cuda_version().unwrap(), None);
        assert_eq!(check_fp8_support(&probe).unwrap().reason(), CUDA_REASON);
    }
}
