//! Signal types read from the GPU host.
//!
//! Three values drive the FP8 decision:
//! - [`ComputeCapability`]: the device architecture tuple, e.g. `8.9`
//! - [`CublasLtVersion`]: cuBLASLt's decimal-encoded version, e.g. `120103`
//! - [`CudaVersion`]: the CUDA runtime version as a dotted integer sequence
//!
//! All three are totally ordered so the decision table can be written as
//! plain comparisons.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GPU compute capability `(major, minor)`.
///
/// Ordering is lexicographic on `(major, minor)`, so `8.9 < 9.0 < 10.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
}

impl ComputeCapability {
    /// First architecture generation (Hopper) with unconditional FP8 support.
    pub const HOPPER: ComputeCapability = ComputeCapability::new(9, 0);

    /// Ada generation; FP8 depends on library versions.
    pub const ADA: ComputeCapability = ComputeCapability::new(8, 9);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Tuple form, handy for comparisons in tests and logs.
    pub fn as_tuple(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

impl From<(u32, u32)> for ComputeCapability {
    fn from((major, minor): (u32, u32)) -> Self {
        Self::new(major, minor)
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ComputeCapability {
    type Err = Error;

    /// Parses the `major.minor` form printed by `nvidia-smi`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || Error::InvalidVersion {
            kind: "compute capability",
            input: s.to_string(),
        };

        let (major, minor) = trimmed.split_once('.').ok_or_else(invalid)?;
        let major = major.trim().parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.trim().parse::<u32>().map_err(|_| invalid())?;
        Ok(Self::new(major, minor))
    }
}

/// cuBLASLt version, encoded as `MAJOR * 10000 + MINOR * 100 + PATCH`.
///
/// `120103` is 12.1.3. This matches the integer returned by
/// `cublasLtGetVersion()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CublasLtVersion(pub u32);

impl CublasLtVersion {
    /// Minimum cuBLASLt with FP8 matmul support on Ada.
    pub const MIN_ADA_FP8: CublasLtVersion = CublasLtVersion(120103);

    /// Encode `major.minor.patch`. `None` if `minor` or `patch` does not
    /// fit in two digits or the encoding overflows `u32`.
    pub fn checked_from_parts(major: u32, minor: u32, patch: u32) -> Option<Self> {
        if minor >= 100 || patch >= 100 {
            return None;
        }
        major
            .checked_mul(10000)?
            .checked_add(minor * 100 + patch)
            .map(Self)
    }

    pub fn encoded(&self) -> u32 {
        self.0
    }

    pub fn major(&self) -> u32 {
        self.0 / 10000
    }

    pub fn minor(&self) -> u32 {
        (self.0 / 100) % 100
    }

    pub fn patch(&self) -> u32 {
        self.0 % 100
    }
}

impl fmt::Display for CublasLtVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

impl FromStr for CublasLtVersion {
    type Err = Error;

    /// Accepts either the encoded integer (`"120103"`) or a dotted version
    /// (`"12.1.3"`, `"12.1.3.1"`). Components past the patch level are
    /// ignored; missing ones count as zero.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || Error::InvalidVersion {
            kind: "cuBLASLt version",
            input: s.to_string(),
        };

        if !trimmed.contains('.') {
            return trimmed.parse::<u32>().map(Self).map_err(|_| invalid());
        }

        let parts = trimmed
            .split('.')
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;

        let get = |i: usize| parts.get(i).copied().unwrap_or(0);
        Self::checked_from_parts(get(0), get(1), get(2)).ok_or_else(invalid)
    }
}

/// CUDA runtime version as a dotted integer sequence.
///
/// Comparison is lexicographic over the components with a shorter
/// sequence ordering before a longer one sharing its prefix. So
/// `12 < 12.1 <= 12.1.0 < 12.2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CudaVersion {
    components: Vec<u32>,
}

impl CudaVersion {
    /// Minimum CUDA runtime with FP8 support on Ada, as `(major, minor)`.
    pub const MIN_ADA_FP8: (u32, u32) = (12, 1);

    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    /// Whether this version is at least `major.minor`.
    pub fn at_least(&self, (major, minor): (u32, u32)) -> bool {
        self.components.as_slice() >= [major, minor].as_slice()
    }
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for CudaVersion {
    type Err = Error;

    /// Parses every dot-separated component as an integer. Any
    /// non-integer component is an error.
    fn from_str(s: &str) -> Result<Self> {
        let components = s
            .split('.')
            .map(|part| {
                part.trim().parse::<u32>().map_err(|_| Error::InvalidVersion {
                    kind: "CUDA version",
                    input: s.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components })
    }
}
