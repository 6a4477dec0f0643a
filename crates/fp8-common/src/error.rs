//! Error types for the FP8 probe.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! "FP8 unsupported" is never an error: it is a normal verdict. Errors
//! here describe failures to *obtain* the signals the verdict is built
//! from, or to load configuration.
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 21,
//!   "category": "probe",
//!   "message": "signal not found: cuBLASLt version (no libcublasLt in 4 search dirs)",
//!   "recoverable": true,
//!   "suggested_action": "set_override"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for FP8 probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Signal probing errors (device, libraries, tools).
    Probe,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Probe => write!(f, "probe"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for agents to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Validate configuration.
    RunCheck,
    /// Pin the signal with an override instead of probing.
    SetOverride,
    /// Install or expose the missing driver/toolkit component.
    InstallDependency,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::SetOverride => write!(f, "set_override"),
            SuggestedAction::InstallDependency => write!(f, "install_dependency"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for the FP8 probe.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    // Probe errors (20-29)
    #[error("no CUDA device available: {0}")]
    DeviceUnavailable(String),

    #[error("signal not found: {signal} ({detail})")]
    SignalNotFound { signal: String, detail: String },

    #[error("invalid {kind}: {input:?}")]
    InvalidVersion { kind: &'static str, input: String },

    #[error("external tool failed: {0}")]
    ToolFailed(String),

    #[error("probe timed out after {millis}ms")]
    ProbeTimeout { millis: u64 },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Probe errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::SchemaValidation(_) => 11,
            Error::DeviceUnavailable(_) => 20,
            Error::SignalNotFound { .. } => 21,
            Error::InvalidVersion { .. } => 22,
            Error::ToolFailed(_) => 23,
            Error::ProbeTimeout { .. } => 24,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::SchemaValidation(_) => ErrorCategory::Config,

            Error::DeviceUnavailable(_)
            | Error::SignalNotFound { .. }
            | Error::InvalidVersion { .. }
            | Error::ToolFailed(_)
            | Error::ProbeTimeout { .. } => ErrorCategory::Probe,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::SchemaValidation(_) => true,

            // No device is a property of the host, not of this run
            Error::DeviceUnavailable(_) => false,
            Error::SignalNotFound { .. } => true,
            Error::InvalidVersion { .. } => true,
            Error::ToolFailed(_) => true,
            Error::ProbeTimeout { .. } => true,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns the suggested action for agents.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::SchemaValidation(_) => SuggestedAction::RunCheck,

            Error::DeviceUnavailable(_) => SuggestedAction::ManualIntervention,
            Error::SignalNotFound { .. } => SuggestedAction::SetOverride,
            Error::InvalidVersion { .. } => SuggestedAction::SetOverride,
            Error::ToolFailed(_) => SuggestedAction::InstallDependency,
            Error::ProbeTimeout { .. } => SuggestedAction::Retry,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'fp8-probe config validate' to check the config file syntax."
            }
            Error::SchemaValidation(_) => {
                "Set schema_version = \"1.0.0\" in the config file, or remove the field."
            }
            Error::DeviceUnavailable(_) => {
                "Check that an NVIDIA GPU is visible (CUDA_VISIBLE_DEVICES) and the driver is loaded."
            }
            Error::SignalNotFound { .. } => {
                "Set CUDA_HOME to the toolkit root, or pin the value with an FP8_PROBE_* override."
            }
            Error::InvalidVersion { .. } => {
                "The reported version could not be parsed. Pin the value with an FP8_PROBE_* override."
            }
            Error::ToolFailed(_) => {
                "Ensure nvidia-smi (and nvcc, if used) are installed and on PATH."
            }
            Error::ProbeTimeout { .. } => {
                "The driver did not answer in time. Retry, or raise tool_timeout_ms in the config."
            }
            Error::Io(_) => "Check file permissions and that the paths exist. Retry the operation.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq .' on the offending file.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::SchemaValidation(_) => "Schema Validation Failed",
            Error::DeviceUnavailable(_) => "No CUDA Device",
            Error::SignalNotFound { .. } => "Signal Not Found",
            Error::InvalidVersion { .. } => "Unparsable Version",
            Error::ToolFailed(_) => "External Tool Failed",
            Error::ProbeTimeout { .. } => "Probe Timeout",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for agents.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., signal name, timeout).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::SignalNotFound { signal, .. } => {
                context.insert("signal".to_string(), serde_json::json!(signal));
            }
            Error::InvalidVersion { kind, input } => {
                context.insert("kind".to_string(), serde_json::json!(kind));
                context.insert("input".to_string(), serde_json::json!(input));
            }
            Error::ProbeTimeout { millis } => {
                context.insert("timeout_ms".to_string(), serde_json::json!(millis));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(Error::DeviceUnavailable("none".into()).code(), 20);
        assert_eq!(Error::ProbeTimeout { millis: 5000 }.code(), 24);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::Config("test".into()).category(), ErrorCategory::Config);
        assert_eq!(
            Error::InvalidVersion {
                kind: "CUDA version",
                input: "x".into()
            }
            .category(),
            ErrorCategory::Probe
        );
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::Config("test".into()).is_recoverable());
        assert!(!Error::DeviceUnavailable("none".into()).is_recoverable());
        assert!(Error::ProbeTimeout { millis: 10 }.is_recoverable());
    }

    #[test]
    fn test_suggested_action() {
        let err = Error::SignalNotFound {
            signal: "cuBLASLt version".into(),
            detail: "no library".into(),
        };
        assert_eq!(err.suggested_action(), SuggestedAction::SetOverride);
        assert_eq!(
            Error::ToolFailed("nvidia-smi".into()).suggested_action(),
            SuggestedAction::InstallDependency
        );
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::ProbeTimeout { millis: 30 };
        let structured = StructuredError::from(&err).with_context("tool", "nvidia-smi");
        let json = structured.to_json();

        assert!(json.contains(r#""code":24"#));
        assert!(json.contains(r#""category":"probe""#));
        assert!(json.contains(r#""recoverable":true"#));
        assert!(json.contains(r#""suggested_action":"retry""#));
        assert!(json.contains(r#""tool":"nvidia-smi""#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::ToolFailed("nvidia-smi exited with 9".into());
        let formatted = format_error_human(&err, false);

        assert!(formatted.contains("External Tool Failed"));
        assert!(formatted.contains("nvidia-smi exited with 9"));
        assert!(formatted.contains("on PATH"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Config.to_string(), "config");
        assert_eq!(ErrorCategory::Probe.to_string(), "probe");
    }
}
