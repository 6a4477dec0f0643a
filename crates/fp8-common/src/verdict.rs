//! FP8 capability verdict.
//!
//! A verdict is the pair `(supported, reason)` where `reason` is empty if
//! and only if `supported` is true. The enum representation makes the
//! other combinations unrepresentable; the pair form is still available
//! through [`Fp8Verdict::as_tuple`] and is what gets serialized.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why FP8 execution is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedReason {
    /// Device architecture predates Ada (compute capability < 8.9).
    DeviceComputeCapability,
    /// Ada device, but cuBLASLt is older than 12.1.3.
    CublasLtVersion,
    /// Ada device, but the CUDA runtime is older than 12.1 or unknown.
    CudaVersion,
}

impl UnsupportedReason {
    pub const ALL: [UnsupportedReason; 3] = [
        UnsupportedReason::DeviceComputeCapability,
        UnsupportedReason::CublasLtVersion,
        UnsupportedReason::CudaVersion,
    ];

    /// Human-readable reason. These strings are part of the public
    /// contract and must not change.
    pub const fn message(&self) -> &'static str {
        match self {
            UnsupportedReason::DeviceComputeCapability => {
                "Device compute capability 8.9 or higher required for FP8 execution."
            }
            UnsupportedReason::CublasLtVersion => {
                "CublasLt version 12.1.3.x or higher required for FP8 execution on Ada."
            }
            UnsupportedReason::CudaVersion => {
                "Cuda version 12.1 or higher required for FP8 execution on Ada."
            }
        }
    }

    /// Stable machine code for the reason.
    pub const fn code(&self) -> &'static str {
        match self {
            UnsupportedReason::DeviceComputeCapability => "device_compute_capability",
            UnsupportedReason::CublasLtVersion => "cublaslt_version",
            UnsupportedReason::CudaVersion => "cuda_version",
        }
    }

    /// Reverse lookup from the human-readable message.
    pub fn from_message(message: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.message() == message)
    }
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of the FP8 capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "VerdictRecord", try_from = "VerdictRecord")]
pub enum Fp8Verdict {
    Supported,
    Unsupported(UnsupportedReason),
}

impl Fp8Verdict {
    pub fn is_supported(&self) -> bool {
        matches!(self, Fp8Verdict::Supported)
    }

    /// Reason text; empty when supported.
    pub fn reason(&self) -> &'static str {
        match self {
            Fp8Verdict::Supported => "",
            Fp8Verdict::Unsupported(reason) => reason.message(),
        }
    }

    pub fn unsupported_reason(&self) -> Option<UnsupportedReason> {
        match self {
            Fp8Verdict::Supported => None,
            Fp8Verdict::Unsupported(reason) => Some(*reason),
        }
    }

    /// The `(supported, reason)` pair.
    pub fn as_tuple(&self) -> (bool, &'static str) {
        (self.is_supported(), self.reason())
    }
}

impl From<Fp8Verdict> for (bool, String) {
    fn from(verdict: Fp8Verdict) -> Self {
        (verdict.is_supported(), verdict.reason().to_string())
    }
}

impl fmt::Display for Fp8Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fp8Verdict::Supported => write!(f, "FP8 supported"),
            Fp8Verdict::Unsupported(reason) => write!(f, "FP8 unsupported: {}", reason),
        }
    }
}

/// Wire form of a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VerdictRecord {
    supported: bool,
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason_code: Option<UnsupportedReason>,
}

impl From<Fp8Verdict> for VerdictRecord {
    fn from(verdict: Fp8Verdict) -> Self {
        VerdictRecord {
            supported: verdict.is_supported(),
            reason: verdict.reason().to_string(),
            reason_code: verdict.unsupported_reason(),
        }
    }
}

impl TryFrom<VerdictRecord> for Fp8Verdict {
    type Error = String;

    fn try_from(record: VerdictRecord) -> Result<Self, Self::Error> {
        match (record.supported, record.reason.is_empty()) {
            (true, true) => Ok(Fp8Verdict::Supported),
            (true, false) => Err(format!(
                "supported verdict must have an empty reason, got {:?}",
                record.reason
            )),
            (false, true) => Err("unsupported verdict requires a reason".to_string()),
            (false, false) => record
                .reason_code
                .or_else(|| UnsupportedReason::from_message(&record.reason))
                .map(Fp8Verdict::Unsupported)
                .ok_or_else(|| format!("unknown FP8 reason: {:?}", record.reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_empty_iff_supported() {
        assert_eq!(Fp8Verdict::Supported.as_tuple(), (true, ""));
        for reason in UnsupportedReason::ALL {
            let (supported, text) = Fp8Verdict::Unsupported(reason).as_tuple();
            assert!(!supported);
            assert!(!text.is_empty());
        }
    }

    #[test]
    fn test_reason_messages_exact() {
        assert_eq!(
            UnsupportedReason::DeviceComputeCapability.message(),
            "Device compute capability 8.9 or higher required for FP8 execution."
        );
        assert_eq!(
            UnsupportedReason::CublasLtVersion.message(),
            "CublasLt version 12.1.3.x or higher required for FP8 execution on Ada."
        );
        assert_eq!(
            UnsupportedReason::CudaVersion.message(),
            "Cuda version 12.1 or higher required for FP8 execution on Ada."
        );
    }

    #[test]
    fn test_verdict_json_shape() {
        let json = serde_json::to_value(Fp8Verdict::Supported).unwrap();
        assert_eq!(json, serde_json::json!({"supported": true, "reason": ""}));

        let json =
            serde_json::to_value(Fp8Verdict::Unsupported(UnsupportedReason::CudaVersion)).unwrap();
        assert_eq!(json["supported"], false);
        assert_eq!(json["reason_code"], "cuda_version");
    }

    #[test]
    fn test_verdict_from_message_only() {
        let json = serde_json::json!({
            "supported": false,
            "reason": "CublasLt version 12.1.3.x or higher required for FP8 execution on Ada."
        });
        let verdict: Fp8Verdict = serde_json::from_value(json).unwrap();
        assert_eq!(
            verdict,
            Fp8Verdict::Unsupported(UnsupportedReason::CublasLtVersion)
        );
    }

    #[test]
    fn test_verdict_rejects_broken_invariant() {
        let bad = serde_json::json!({"supported": true, "reason": "nope"});
        assert!(serde_json::from_value::<Fp8Verdict>(bad).is_err());

        let bad = serde_json::json!({"supported": false, "reason": ""});
        assert!(serde_json::from_value::<Fp8Verdict>(bad).is_err());
    }

    #[test]
    fn test_verdict_into_pair() {
        let pair: (bool, String) = Fp8Verdict::Unsupported(UnsupportedReason::CudaVersion).into();
        assert!(!pair.0);
        assert!(pair.1.starts_with("Cuda version 12.1"));
    }
}
