//! Configuration loading and validation for fp8-core.
//!
//! This module handles:
//! - Config file resolution order (CLI > env > XDG > defaults)
//! - TOML parsing with unknown-field rejection
//! - Semantic validation (schema version, timeout bounds, override values)
//! - Layering `FP8_PROBE_*` signal overrides on top of the file

use crate::probe::{checked_cuda_override, tool_runner, SignalOverrides, SystemProbeConfig};
use fp8_common::{ComputeCapability, CublasLtVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG_PATH: &str = "FP8_PROBE_CONFIG";

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "fp8_probe";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Upper bound for `tool_timeout_ms`.
pub const MAX_TOOL_TIMEOUT_MS: u64 = 600_000;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl From<ConfigError> for fp8_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::VersionMismatch { .. } | ConfigError::Invalid { .. } => {
                fp8_common::Error::SchemaValidation(err.to_string())
            }
            _ => fp8_common::Error::Config(err.to_string()),
        }
    }
}

/// A version override written either as an encoded integer or as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionValue {
    Encoded(u32),
    Text(String),
}

impl fmt::Display for VersionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionValue::Encoded(n) => write!(f, "{}", n),
            VersionValue::Text(s) => f.write_str(s),
        }
    }
}

/// `[overrides]` table as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverridesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cublaslt_version: Option<VersionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda_version: Option<String>,
}

impl OverridesConfig {
    /// Parse the raw override values.
    pub fn to_signal_overrides(&self) -> Result<SignalOverrides, ConfigError> {
        let compute_capability = self
            .compute_capability
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<ComputeCapability>()
                    .map_err(|e| ConfigError::Invalid {
                        field: "overrides.compute_capability",
                        message: e.to_string(),
                    })
            })
            .transpose()?;

        let cublaslt_version = match &self.cublaslt_version {
            None => None,
            Some(VersionValue::Encoded(n)) => Some(CublasLtVersion(*n)),
            Some(VersionValue::Text(raw)) => {
                Some(
                    raw.trim()
                        .parse::<CublasLtVersion>()
                        .map_err(|e| ConfigError::Invalid {
                            field: "overrides.cublaslt_version",
                            message: e.to_string(),
                        })?,
                )
            }
        };

        let cuda_version = self
            .cuda_version
            .as_deref()
            .map(|raw| {
                checked_cuda_override(raw).map_err(|e| ConfigError::Invalid {
                    field: "overrides.cuda_version",
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(SignalOverrides {
            compute_capability,
            cublaslt_version,
            cuda_version,
        })
    }
}

/// Probe configuration file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub schema_version: String,
    pub device_index: u32,
    pub nvidia_smi: String,
    pub nvcc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda_home: Option<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    pub tool_timeout_ms: u64,
    pub overrides: OverridesConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            device_index: 0,
            nvidia_smi: "nvidia-smi".to_string(),
            nvcc: "nvcc".to_string(),
            cuda_home: None,
            library_dirs: Vec::new(),
            tool_timeout_ms: tool_runner::DEFAULT_TIMEOUT_MS,
            overrides: OverridesConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != CONFIG_SCHEMA_VERSION {
            return Err(ConfigError::VersionMismatch {
                expected: CONFIG_SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }
        if !(1..=MAX_TOOL_TIMEOUT_MS).contains(&self.tool_timeout_ms) {
            return Err(ConfigError::Invalid {
                field: "tool_timeout_ms",
                message: format!(
                    "{} is outside 1..={}",
                    self.tool_timeout_ms, MAX_TOOL_TIMEOUT_MS
                ),
            });
        }
        if self.nvidia_smi.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "nvidia_smi",
                message: "must not be empty".to_string(),
            });
        }
        if self.nvcc.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "nvcc",
                message: "must not be empty".to_string(),
            });
        }
        self.overrides.to_signal_overrides()?;
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Settings for the host probe.
    pub fn system_probe_config(&self) -> SystemProbeConfig {
        SystemProbeConfig {
            device_index: self.device_index,
            nvidia_smi: self.nvidia_smi.clone(),
            nvcc: self.nvcc.clone(),
            cuda_home: self.cuda_home.clone(),
            library_dirs: self.library_dirs.clone(),
            tool_timeout: self.tool_timeout(),
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    /// `--config` on the command line.
    Explicit(PathBuf),
    /// `FP8_PROBE_CONFIG`.
    Env(PathBuf),
    /// `$XDG_CONFIG_HOME/fp8_probe/config.toml`.
    Xdg(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Env(p) | ConfigSource::Xdg(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
    /// Device index from the command line; replaces the file value.
    pub device_index: Option<u32>,
    /// Ignore `FP8_PROBE_*` signal overrides from the environment.
    pub ignore_env_overrides: bool,
}

/// Resolved configuration with provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ProbeConfig,
    pub source: ConfigSource,
    /// File overrides with environment overrides layered on top.
    pub overrides: SignalOverrides,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI flag (via ConfigOptions)
/// 2. Environment variable (FP8_PROBE_CONFIG)
/// 3. XDG config home (~/.config/fp8_probe/config.toml), if present
/// 4. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<LoadedConfig, ConfigError> {
    load_config_with_env(options, |key| std::env::var(key).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with_env<F>(options: &ConfigOptions, env: F) -> Result<LoadedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let source = resolve_config_source(options, &env);
    let mut config = match source.path() {
        Some(path) => load_config_file(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(index) = options.device_index {
        config.device_index = index;
    }
    config.validate()?;

    let mut overrides = config.overrides.to_signal_overrides()?;
    if !options.ignore_env_overrides {
        let from_env = SignalOverrides::from_lookup(&env).map_err(|e| ConfigError::Invalid {
            field: "FP8_PROBE_* environment override",
            message: e.to_string(),
        })?;
        overrides = overrides.merged(from_env);
    }

    debug!(source = ?source, device = config.device_index, "configuration loaded");
    Ok(LoadedConfig {
        config,
        source,
        overrides,
    })
}

/// Resolve which file (if any) supplies the configuration.
fn resolve_config_source<F>(options: &ConfigOptions, env: &F) -> ConfigSource
where
    F: Fn(&str) -> Option<String>,
{
    // 1. Explicit option
    if let Some(path) = &options.config_path {
        return ConfigSource::Explicit(path.clone());
    }

    // 2. Environment variable
    if let Some(path) = env(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        return ConfigSource::Env(PathBuf::from(path));
    }

    // 3. XDG config home, only when the file exists
    let xdg_config = env("XDG_CONFIG_HOME")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    let candidate = xdg_config.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        return ConfigSource::Xdg(candidate);
    }

    ConfigSource::Defaults
}

/// Read and parse a config file without validating it.
pub fn load_config_file(path: &Path) -> Result<ProbeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load and validate a single config file.
pub fn validate_config_file(path: &Path) -> Result<ProbeConfig, ConfigError> {
    let config = load_config_file(path)?;
    config.validate()?;
    Ok(config)
}
