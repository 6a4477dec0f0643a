//! Property-based tests for the FP8 decision table.

use fp8_common::{ComputeCapability, CublasLtVersion, Fp8Verdict, UnsupportedReason};
use fp8_core::capabilities::{check_fp8_support, Fp8Cache};
use fp8_core::probe::StaticProbe;
use proptest::prelude::*;

fn cuda_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        prop::collection::vec(0u32..40, 1..4).prop_map(|parts| {
            Some(
                parts
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join("."),
            )
        }),
    ]
}

fn ada_tuple_supported(cublaslt: u32, cuda: &Option<String>) -> bool {
    if cublaslt < CublasLtVersion::MIN_ADA_FP8.encoded() {
        return false;
    }
    let Some(raw) = cuda.as_deref().filter(|s| !s.is_empty()) else {
        return false;
    };
    let parts: Vec<u32> = raw.split('.').map(|p| p.parse().unwrap()).collect();
    let major = parts[0];
    match parts.get(1) {
        Some(&minor) => (major, minor) >= (12, 1),
        None => major > 12,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn hopper_and_newer_always_supported(
        major in 9u32..20,
        minor in 0u32..10,
        cublaslt in any::<u32>(),
        cuda in cuda_strategy(),
    ) {
        let probe = StaticProbe::new(ComputeCapability::new(major, minor), cublaslt, cuda.as_deref());
        let verdict = check_fp8_support(&probe).unwrap();
        prop_assert_eq!(verdict, Fp8Verdict::Supported);
        prop_assert_eq!(verdict.reason(), "");
        prop_assert_eq!(probe.calls().total(), 1);
    }

    #[test]
    fn pre_ada_always_rejected_on_device(
        major in 0u32..9,
        minor in 0u32..10,
        cublaslt in any::<u32>(),
        cuda in cuda_strategy(),
    ) {
        prop_assume!((major, minor) < (8, 9));
        let probe = StaticProbe::new(ComputeCapability::new(major, minor), cublaslt, cuda.as_deref());
        let verdict = check_fp8_support(&probe).unwrap();
        prop_assert_eq!(
            verdict,
            Fp8Verdict::Unsupported(UnsupportedReason::DeviceComputeCapability)
        );
    }

    #[test]
    fn ada_depends_only_on_library_versions(
        cublaslt in 100_000u32..140_000,
        cuda in cuda_strategy(),
    ) {
        let probe = StaticProbe::new(ComputeCapability::ADA, cublaslt, cuda.as_deref());
        let verdict = check_fp8_support(&probe).unwrap();
        prop_assert_eq!(verdict.is_supported(), ada_tuple_supported(cublaslt, &cuda));
        prop_assert_eq!(verdict.reason().is_empty(), verdict.is_supported());
    }

    #[test]
    fn cached_verdict_is_stable(
        major in 7u32..11,
        minor in 0u32..10,
        cublaslt in 110_000u32..130_000,
        cuda in cuda_strategy(),
        repeats in 1usize..6,
    ) {
        let cache = Fp8Cache::new(StaticProbe::new(ComputeCapability::new(major, minor), cublaslt, cuda.as_deref()));
        let first = cache.query_fp8_support().unwrap();
        for _ in 0..repeats {
            prop_assert_eq!(cache.query_fp8_support().unwrap(), first);
        }
        prop_assert_eq!(cache.probe().calls().device, 1);
    }
}
