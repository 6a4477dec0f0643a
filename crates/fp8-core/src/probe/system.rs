//! Host probing through driver tools and the CUDA toolkit layout.

use super::tool_runner::{ToolError, ToolRunner, ToolRunnerBuilder};
use super::{CapabilityProbe, ProbeError, Signal};
use fp8_common::{ComputeCapability, CublasLtVersion};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Toolkit root used when neither the config nor the environment names one.
pub const DEFAULT_CUDA_HOME: &str = "/usr/local/cuda";

/// Distribution library directories searched after the toolkit ones.
const SYSTEM_LIBRARY_DIRS: &[&str] = &["/usr/local/cuda/lib64", "/usr/lib/x86_64-linux-gnu"];

/// Settings for [`SystemProbe`].
#[derive(Debug, Clone)]
pub struct SystemProbeConfig {
    /// Index passed to `nvidia-smi -i`.
    pub device_index: u32,
    /// `nvidia-smi` command name or absolute path.
    pub nvidia_smi: String,
    /// `nvcc` command name or absolute path.
    pub nvcc: String,
    /// Explicit CUDA toolkit root.
    pub cuda_home: Option<PathBuf>,
    /// Extra directories searched for `libcublasLt.so.*`, before the defaults.
    pub library_dirs: Vec<PathBuf>,
    /// Timeout for each external tool.
    pub tool_timeout: Duration,
}

impl Default for SystemProbeConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            nvidia_smi: "nvidia-smi".to_string(),
            nvcc: "nvcc".to_string(),
            cuda_home: None,
            library_dirs: Vec::new(),
            tool_timeout: Duration::from_millis(super::tool_runner::DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Reads signals from the real host.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    config: SystemProbeConfig,
    runner: ToolRunner,
}

impl SystemProbe {
    pub fn new(config: SystemProbeConfig) -> Self {
        // Only the two configured tools may ever be spawned
        let runner = ToolRunnerBuilder::new()
            .timeout(config.tool_timeout)
            .allow_commands([config.nvidia_smi.clone(), config.nvcc.clone()])
            .build();
        Self { config, runner }
    }

    pub fn config(&self) -> &SystemProbeConfig {
        &self.config
    }

    /// Toolkit root: config, then `$CUDA_HOME`, then `$CUDA_PATH`, then
    /// [`DEFAULT_CUDA_HOME`].
    pub fn cuda_home(&self) -> PathBuf {
        if let Some(home) = &self.config.cuda_home {
            return home.clone();
        }
        ["CUDA_HOME", "CUDA_PATH"]
            .iter()
            .filter_map(|key| std::env::var_os(key))
            .find(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CUDA_HOME))
    }

    /// Directories searched for the cuBLASLt shared library, in order.
    pub fn library_search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.config.library_dirs.clone();

        for key in ["CUDA_HOME", "CUDA_PATH"] {
            if let Some(root) = std::env::var_os(key).filter(|v| !v.is_empty()) {
                dirs.push(PathBuf::from(root).join("lib64"));
            }
        }
        if let Some(home) = &self.config.cuda_home {
            dirs.push(home.join("lib64"));
        }
        if let Some(ld_path) = std::env::var_os("LD_LIBRARY_PATH") {
            dirs.extend(std::env::split_paths(&ld_path).filter(|p| !p.as_os_str().is_empty()));
        }
        dirs.extend(SYSTEM_LIBRARY_DIRS.iter().map(PathBuf::from));

        let mut seen = std::collections::HashSet::new();
        dirs.retain(|d| seen.insert(d.clone()));
        dirs
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>, ProbeError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProbeError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn cuda_version_from_nvcc(&self) -> Result<Option<String>, ProbeError> {
        let output = match self.runner.run_tool(&self.config.nvcc, &["--version"], None) {
            Ok(output) => output,
            Err(ToolError::CommandNotFound(cmd)) => {
                debug!(command = %cmd, "nvcc not available");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if output.timed_out {
            return Err(ToolError::Timeout(self.config.tool_timeout).into());
        }
        if !output.success() {
            warn!(exit_code = ?output.exit_code, "nvcc --version failed");
            return Ok(None);
        }
        Ok(parse_nvcc_release(&output.stdout_str()))
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new(SystemProbeConfig::default())
    }
}

impl CapabilityProbe for SystemProbe {
    #[instrument(skip(self), fields(device = self.config.device_index), err(level = "debug"))]
    fn device_capability(&self) -> Result<ComputeCapability, ProbeError> {
        let index = self.config.device_index.to_string();
        let output = self.runner.run_tool(
            &self.config.nvidia_smi,
            &[
                "--query-gpu=compute_cap",
                "--format=csv,noheader",
                "-i",
                index.as_str(),
            ],
            None,
        )?;

        if output.timed_out {
            return Err(ToolError::Timeout(self.config.tool_timeout).into());
        }

        let stdout = output.stdout_str();
        if !output.success() {
            let stderr = output.stderr_str();
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            if message.contains("No devices were found") {
                return Err(ProbeError::NoDevice(self.config.nvidia_smi.clone()));
            }
            return Err(ProbeError::ToolExit {
                tool: self.config.nvidia_smi.clone(),
                code: output.exit_code,
                stderr: message,
            });
        }

        let capability = parse_nvidia_smi_compute_cap(&stdout)?
            .ok_or_else(|| ProbeError::NoDevice(self.config.nvidia_smi.clone()))?;
        debug!(%capability, "device compute capability");
        Ok(capability)
    }

    #[instrument(skip(self), err(level = "debug"))]
    fn cublaslt_version(&self) -> Result<CublasLtVersion, ProbeError> {
        let dirs = self.library_search_dirs();
        if let Some((version, path)) = find_cublaslt_in_dirs(&dirs) {
            debug!(%version, path = %path.display(), "cuBLASLt from shared library");
            return Ok(version);
        }

        let header = self.cuda_home().join("include").join("cublas_api.h");
        if let Some(content) = self.read_optional(&header)? {
            if let Some(version) = parse_cublas_header(&content) {
                debug!(%version, path = %header.display(), "cuBLASLt from header");
                return Ok(version);
            }
        }

        Err(ProbeError::NotFound {
            signal: Signal::CublasLtVersion,
            detail: format!(
                "no libcublasLt.so.* in {} search dirs and no usable {}",
                dirs.len(),
                header.display()
            ),
        })
    }

    #[instrument(skip(self), err(level = "debug"))]
    fn cuda_version(&self) -> Result<Option<String>, ProbeError> {
        let home = self.cuda_home();

        let json_path = home.join("version.json");
        if let Some(content) = self.read_optional(&json_path)? {
            match parse_version_json(&content) {
                Some(version) => {
                    debug!(%version, path = %json_path.display(), "CUDA version from version.json");
                    return Ok(Some(version));
                }
                None => warn!(path = %json_path.display(), "version.json has no cuda.version"),
            }
        }

        let txt_path = home.join("version.txt");
        if let Some(content) = self.read_optional(&txt_path)? {
            if let Some(version) = parse_version_txt(&content) {
                debug!(%version, path = %txt_path.display(), "CUDA version from version.txt");
                return Ok(Some(version));
            }
        }

        let version = self.cuda_version_from_nvcc()?;
        match &version {
            Some(v) => debug!(version = %v, "CUDA version from nvcc"),
            None => debug!("CUDA version unknown"),
        }
        Ok(version)
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}

/// Parse `nvidia-smi --query-gpu=compute_cap --format=csv,noheader` output.
///
/// Returns `None` when no device line is present.
pub fn parse_nvidia_smi_compute_cap(
    stdout: &str,
) -> Result<Option<ComputeCapability>, fp8_common::Error> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::parse::<ComputeCapability>)
        .transpose()
}

/// Parse a versioned cuBLASLt library file name such as
/// `libcublasLt.so.12.1.3.1`.
pub fn parse_cublaslt_filename(name: &str) -> Option<CublasLtVersion> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"^libcublasLt\.so\.(\d+)\.(\d+)\.(\d+)(?:\.\d+)*$").captures(name)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    CublasLtVersion::checked_from_parts(part(1)?, part(2)?, part(3)?)
}

/// Highest cuBLASLt version found in `dirs`, with the file it came from.
///
/// Unreadable directories are skipped.
pub fn find_cublaslt_in_dirs(dirs: &[PathBuf]) -> Option<(CublasLtVersion, PathBuf)> {
    dirs.iter()
        .filter_map(|dir| match fs::read_dir(dir) {
            Ok(entries) => Some(entries),
            Err(e) => {
                trace!(dir = %dir.display(), error = %e, "skipping library dir");
                None
            }
        })
        .flat_map(|entries| entries.filter_map(|e| e.ok()))
        .filter_map(|entry| {
            let name = entry.file_name();
            let version = parse_cublaslt_filename(name.to_str()?)?;
            Some((version, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
}

/// Parse `CUBLAS_VER_MAJOR/MINOR/PATCH` from `cublas_api.h`.
pub fn parse_cublas_header(content: &str) -> Option<CublasLtVersion> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"(?m)^\s*#define\s+CUBLAS_VER_(MAJOR|MINOR|PATCH)\s+(\d+)");

    let (mut major, mut minor, mut patch) = (None, None, None);
    for caps in re.captures_iter(content) {
        let value = caps[2].parse::<u32>().ok();
        match &caps[1] {
            "MAJOR" => major = value,
            "MINOR" => minor = value,
            _ => patch = value,
        }
    }
    CublasLtVersion::checked_from_parts(major?, minor?, patch?)
}

/// Extract `cuda.version` from the toolkit's `version.json`.
pub fn parse_version_json(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    value
        .get("cuda")?
        .get("version")?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract the version from a legacy `version.txt` (`CUDA Version 11.0.228`).
pub fn parse_version_txt(content: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"CUDA Version\s+(\d+(?:\.\d+)*)").captures(content)?;
    Some(caps[1].to_string())
}

/// Extract `major.minor` from `nvcc --version` (`Cuda compilation tools, release 12.1, V12.1.105`).
pub fn parse_nvcc_release(stdout: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let caps = regex(&RE, r"release\s+(\d+\.\d+)").captures(stdout)?;
    Some(caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_nvidia_smi_compute_cap() {
        assert_eq!(
            parse_nvidia_smi_compute_cap("8.9\n").unwrap(),
            Some(ComputeCapability::new(8, 9))
        );
        assert_eq!(
            parse_nvidia_smi_compute_cap("\n9.0\n8.0\n").unwrap(),
            Some(ComputeCapability::HOPPER)
        );
        assert_eq!(parse_nvidia_smi_compute_cap("  \n").unwrap(), None);
        assert!(parse_nvidia_smi_compute_cap("[N/A]\n").is_err());
    }

    #[test]
    fn test_parse_cublaslt_filename() {
        assert_eq!(
            parse_cublaslt_filename("libcublasLt.so.12.1.3.1"),
            Some(CublasLtVersion(120103))
        );
        assert_eq!(
            parse_cublaslt_filename("libcublasLt.so.11.11.3.6"),
            Some(CublasLtVersion(111103))
        );
        assert_eq!(parse_cublaslt_filename("libcublasLt.so.12"), None);
        assert_eq!(parse_cublaslt_filename("libcublasLt.so"), None);
        assert_eq!(parse_cublaslt_filename("libcublas.so.12.1.3.1"), None);
    }

    #[test]
    fn test_find_cublaslt_picks_highest() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("libcublasLt.so.12.0.2.224"), b"").unwrap();
        fs::write(b.path().join("libcublasLt.so.12.2.5.6"), b"").unwrap();
        fs::write(b.path().join("libcublasLt.so.12"), b"").unwrap();

        let dirs = vec![
            PathBuf::from("/nonexistent/fp8/lib64"),
            a.path().to_path_buf(),
            b.path().to_path_buf(),
        ];
        let (version, path) = find_cublaslt_in_dirs(&dirs).unwrap();
        assert_eq!(version, CublasLtVersion(120205));
        assert!(path.ends_with("libcublasLt.so.12.2.5.6"));
    }

    #[test]
    fn test_parse_cublas_header() {
        let header = "\
#define CUBLAS_VER_MAJOR 12
#define CUBLAS_VER_MINOR 1
#define CUBLAS_VER_PATCH 3
#define CUBLAS_VER_BUILD 1
";
        assert_eq!(parse_cublas_header(header), Some(CublasLtVersion(120103)));
        assert_eq!(parse_cublas_header("#define CUBLAS_VER_MAJOR 12\n"), None);
    }

    #[test]
    fn test_parse_version_files() {
        let json = r#"{"cuda": {"name": "CUDA SDK", "version": "12.1.1"}}"#;
        assert_eq!(parse_version_json(json), Some("12.1.1".to_string()));
        assert_eq!(parse_version_json(r#"{"cuda": {}}"#), None);
        assert_eq!(parse_version_json("not json"), None);

        assert_eq!(
            parse_version_txt("CUDA Version 11.0.228\n"),
            Some("11.0.228".to_string())
        );
        assert_eq!(parse_version_txt("garbage"), None);
    }

    #[test]
    fn test_parse_nvcc_release() {
        let out = "nvcc: NVIDIA (R) Cuda compiler driver\n\
                   Cuda compilation tools, release 12.1, V12.1.105\n";
        assert_eq!(parse_nvcc_release(out), Some("12.1".to_string()));
        assert_eq!(parse_nvcc_release("command not found"), None);
    }

    #[test]
    fn test_cuda_version_from_toolkit_root() {
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("version.json"),
            r#"{"cuda": {"version": "12.4.0"}}"#,
        )
        .unwrap();

        let probe = SystemProbe::new(SystemProbeConfig {
            cuda_home: Some(home.path().to_path_buf()),
            nvcc: "/nonexistent/fp8/nvcc".to_string(),
            ..SystemProbeConfig::default()
        });
        assert_eq!(probe.cuda_version().unwrap(), Some("12.4.0".to_string()));
    }

    #[test]
    fn test_cuda_version_absent() {
        let home = TempDir::new().unwrap();
        let probe = SystemProbe::new(SystemProbeConfig {
            cuda_home: Some(home.path().to_path_buf()),
            nvcc: "/nonexistent/fp8/nvcc".to_string(),
            ..SystemProbeConfig::default()
        });
        assert_eq!(probe.cuda_version().unwrap(), None);
    }

    #[test]
    fn test_cublaslt_from_configured_dir() {
        let lib = TempDir::new().unwrap();
        fs::write(lib.path().join("libcublasLt.so.13.0.0.19"), b"").unwrap();

        let probe = SystemProbe::new(SystemProbeConfig {
            library_dirs: vec![lib.path().to_path_buf()],
            ..SystemProbeConfig::default()
        });
        assert!(probe.library_search_dirs()[0] == lib.path());
        assert!(probe.cublaslt_version().unwrap() >= CublasLtVersion(130000));
    }

    #[cfg(unix)]
    #[test]
    fn test_device_capability_from_fake_nvidia_smi() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("nvidia-smi");
        fs::write(&script, "#!/bin/sh\necho '8.9'\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let probe = SystemProbe::new(SystemProbeConfig {
            nvidia_smi: script.display().to_string(),
            ..SystemProbeConfig::default()
        });
        assert_eq!(probe.device_capability().unwrap(), ComputeCapability::ADA);
    }

    #[cfg(unix)]
    #[test]
    fn test_device_capability_no_devices() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("nvidia-smi");
        fs::write(&script, "#!/bin/sh\necho 'No devices were found'\nexit 6\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let probe = SystemProbe::new(SystemProbeConfig {
            nvidia_smi: script.display().to_string(),
            ..SystemProbeConfig::default()
        });
        assert!(matches!(
            probe.device_capability(),
            Err(ProbeError::NoDevice(_))
        ));
    }

    #[test]
    fn test_missing_nvidia_smi_is_tool_error() {
        let probe = SystemProbe::new(SystemProbeConfig {
            nvidia_smi: "/nonexistent/fp8/nvidia-smi".to_string(),
            ..SystemProbeConfig::default()
        });
        assert!(matches!(
            probe.device_capability(),
            Err(ProbeError::Tool(ToolError::CommandNotFound(_)))
        ));
    }

    #[test]
    fn test_probe_failures_are_logged_at_debug() {
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let dir = TempDir::new().unwrap();
        let probe = SystemProbe::new(SystemProbeConfig {
            nvidia_smi: "/nonexistent/fp8/nvidia-smi".to_string(),
            cuda_home: Some(dir.path().to_path_buf()),
            library_dirs: vec![dir.path().to_path_buf()],
            ..SystemProbeConfig::default()
        });
        tracing::subscriber::with_default(subscriber, || {
            assert!(probe.device_capability().is_err());
        });

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(
            logs.lines().any(|line| line.contains("DEBUG")
                && line.contains("device_capability")
                && line.contains("error")),
            "failure not logged: {logs}"
        );
    }
}
