//! Exit codes for the fp8-probe CLI.
//!
//! Exit code ranges:
//! - 0-1: Verdicts (parse the outcome from the code, not the output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use fp8_common::Fp8Verdict;

/// Exit codes for fp8-probe operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// FP8 supported, or a non-check command succeeded
    Supported = 0,

    /// FP8 not supported on this device
    Unsupported = 1,

    /// Invalid arguments
    ArgsError = 10,

    /// Config file missing, unparsable or invalid
    ConfigError = 11,

    /// A signal could not be read
    ProbeError = 12,

    /// Internal error (bug - please report)
    InternalError = 20,

    IoError = 21,

    /// An external tool timed out
    TimeoutError = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code is a verdict rather than a failure.
    pub fn is_verdict(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Supported => "OK_SUPPORTED",
            ExitCode::Unsupported => "OK_UNSUPPORTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::ProbeError => "ERR_PROBE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }

    /// Exit code reporting a verdict.
    pub fn from_verdict(verdict: &Fp8Verdict) -> Self {
        if verdict.is_supported() {
            ExitCode::Supported
        } else {
            ExitCode::Unsupported
        }
    }

    /// Exit code for a failed operation.
    pub fn from_error(err: &fp8_common::Error) -> Self {
        use fp8_common::Error;
        match err {
            Error::Config(_) | Error::SchemaValidation(_) => ExitCode::ConfigError,
            Error::ProbeTimeout { .. } => ExitCode::TimeoutError,
            Error::DeviceUnavailable(_)
            | Error::SignalNotFound { .. }
            | Error::InvalidVersion { .. }
            | Error::ToolFailed(_) => ExitCode::ProbeError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
