//! Tool runner with timeout and output cap.
//!
//! Driver utilities (`nvidia-smi`, `nvcc`) are the only way to read some
//! signals without linking against the CUDA libraries. A wedged driver can
//! make them hang, so every invocation here is bounded:
//!
//! - Per-command timeout with SIGTERM → SIGKILL escalation
//! - Output size caps
//! - Command path validation to prevent injection
//! - Optional allowlist of command names
//!
//! # Example
//!
//! ```ignore
//! use fp8_core::probe::tool_runner::{ToolRunner, ToolConfig};
//!
//! let runner = ToolRunner::new(ToolConfig::default());
//! let output = runner.run_tool("nvidia-smi", &["--query-gpu=compute_cap", "--format=csv,noheader"], None)?;
//! println!("{}", output.stdout_str());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

/// Default timeout per command in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default maximum output size in bytes (1MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

/// Environment variables passed through to child tools.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "LD_LIBRARY_PATH", "CUDA_VISIBLE_DEVICES"];

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command path: {0}")]
    InvalidPath(String),

    #[error("command not in allowlist: {0}")]
    NotAllowed(String),
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Command that was executed.
    pub command: String,

    /// Arguments passed to the command.
    pub args: Vec<String>,

    /// Standard output (may be truncated).
    pub stdout: Vec<u8>,

    /// Standard error (may be truncated).
    pub stderr: Vec<u8>,

    /// Exit code (if available).
    pub exit_code: Option<i32>,

    /// Whether output was truncated.
    pub truncated: bool,

    /// Execution duration.
    #[serde(with = "duration_ms")]
    pub duration: Duration,

    /// Whether the command timed out.
    pub timed_out: bool,
}

impl ToolOutput {
    /// Get stdout as string (lossy UTF-8 conversion).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as string (lossy UTF-8 conversion).
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Configuration for the tool runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Default timeout per command.
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,

    /// Maximum output size per command in bytes.
    pub max_output_bytes: usize,

    /// Allowed commands (empty = all allowed).
    pub allowed_commands: HashSet<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            allowed_commands: HashSet::new(),
        }
    }
}

/// Runs external tools with the configured safety limits.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    config: ToolConfig,
}

impl ToolRunner {
    /// Create a new tool runner with the given configuration.
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Run a single tool with the given command and arguments.
    ///
    /// A timeout is not an error: the returned output has `timed_out`
    /// set and carries whatever was captured before the kill.
    #[instrument(skip(self), fields(cmd = %cmd))]
    pub fn run_tool(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<ToolOutput, ToolError> {
        self.validate_command(cmd)?;

        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let max_output = self.config.max_output_bytes;
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();

        debug!(
            command = %cmd,
            args = ?args,
            timeout_ms = timeout.as_millis(),
            max_output,
            "running tool"
        );

        let start = Instant::now();
        let mut child = match self
            .build_command(cmd, &args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(command = %cmd, "command not found");
                return Err(ToolError::CommandNotFound(cmd.to_string()));
            }
            Err(e) => {
                error!(command = %cmd, error = %e, "failed to spawn");
                return Err(ToolError::SpawnFailed(e.to_string()));
            }
        };

        let result = self.execute_with_timeout(&mut child, timeout, max_output);
        let duration = start.elapsed();

        debug!(
            command = %cmd,
            duration_ms = duration.as_millis() as u64,
            success = result.is_ok(),
            "tool execution complete"
        );

        let (stdout, stderr, exit_code, truncated, timed_out) = result.map_err(|e| {
            warn!(command = %cmd, error = %e, "tool execution failed");
            e
        })?;

        Ok(ToolOutput {
            command: cmd.to_string(),
            args,
            stdout,
            stderr,
            exit_code,
            truncated,
            duration,
            timed_out,
        })
    }

    /// Validate that a command is allowed and safe to execute.
    fn validate_command(&self, cmd: &str) -> Result<(), ToolError> {
        if !self.config.allowed_commands.is_empty() {
            let basename = Path::new(cmd)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(cmd);

            if !self.config.allowed_commands.contains(cmd)
                && !self.config.allowed_commands.contains(basename)
            {
                return Err(ToolError::NotAllowed(cmd.to_string()));
            }
        }

        if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
            return Err(ToolError::InvalidPath(format!(
                "command contains shell metacharacters: {}",
                cmd
            )));
        }

        if cmd.starts_with('/') && !Path::new(cmd).exists() {
            return Err(ToolError::CommandNotFound(cmd.to_string()));
        }

        Ok(())
    }

    /// Build the command with a minimal, locale-neutral environment.
    fn build_command(&self, cmd: &str, args: &[String]) -> Command {
        let mut command = Command::new(cmd);
        command.args(args);

        command.env_clear();
        for key in PASSTHROUGH_ENV {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        command.env("LC_ALL", "C");
        command.env("LANG", "C");

        command
    }

    /// Execute a child process with timeout and output capture.
    #[allow(clippy::type_complexity)]
    fn execute_with_timeout(
        &self,
        child: &mut Child,
        timeout: Duration,
        max_output: usize,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<i32>, bool, bool), ToolError> {
        let deadline = Instant::now() + timeout;
        let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
        let mut stderr_buf = Vec::with_capacity(max_output.min(65536));
        let mut truncated = false;
        let mut timed_out = false;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let mut chunk = vec![0u8; 8192];

        loop {
            if Instant::now() >= deadline {
                timed_out = true;
                warn!("command timed out, sending SIGTERM");
                self.kill_with_grace(child);
                break;
            }

            let mut did_read = false;

            if let Some(ref mut out) = stdout {
                if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                    }
                }
            }

            if let Some(ref mut err) = stderr {
                if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                    }
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut out) = stdout {
                        let _ = drain_to_limit(out, &mut stdout_buf, max_output, &mut truncated);
                    }
                    if let Some(ref mut err) = stderr {
                        let _ = drain_to_limit(err, &mut stderr_buf, max_output, &mut truncated);
                    }

                    let exit_code = status.code();
                    trace!(exit_code = ?exit_code, "process exited");
                    return Ok((stdout_buf, stderr_buf, exit_code, truncated, timed_out));
                }
                Ok(None) => {
                    if !did_read {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    return Err(ToolError::Io(e));
                }
            }
        }

        let status = child.wait().ok();
        let exit_code = status.and_then(|s| s.code());

        Ok((stdout_buf, stderr_buf, exit_code, truncated, timed_out))
    }

    /// Kill a process with SIGTERM, then SIGKILL after grace period.
    #[cfg(unix)]
    fn kill_with_grace(&self, child: &mut Child) {
        let pid = child.id() as i32;

        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        debug!(pid, "sent SIGTERM");

        thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

        match child.try_wait() {
            Ok(Some(_)) => {
                trace!(pid, "process exited after SIGTERM");
            }
            Ok(None) => {
                warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                }
                let _ = child.wait();
            }
            Err(e) => {
                error!(pid, error = %e, "failed to check process status");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_with_grace(&self, child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Append `data` to `buf` without exceeding `max` bytes.
fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    let to_copy = data.len().min(space);
    buf.extend_from_slice(&data[..to_copy]);
    if to_copy < data.len() {
        *truncated = true;
    }
}

/// Drain remaining data from a stream up to the limit.
///
/// Uses non-blocking reads so a grandchild still holding the pipe open
/// cannot hang the caller.
fn drain_to_limit<R: Read + ReadFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; 8192];
    while !*truncated {
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd as ReadFd;

#[cfg(not(unix))]
trait ReadFd {}
#[cfg(not(unix))]
impl<T> ReadFd for T {}

/// Try to read from a stream without blocking.
///
/// Sets O_NONBLOCK on the descriptor for the duration of one read, then
/// restores the original flags. Returns Ok(0) if no data is available.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + ReadFd>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

/// Blocking read fallback for non-Unix platforms.
#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}

/// Builder for creating a tool runner with custom configuration.
#[derive(Debug, Default)]
pub struct ToolRunnerBuilder {
    config: ToolConfig,
}

impl ToolRunnerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the maximum output size.
    pub fn max_output(mut self, max_bytes: usize) -> Self {
        self.config.max_output_bytes = max_bytes;
        self
    }

    /// Add allowed commands (restrict to only these).
    pub fn allow_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for cmd in commands {
            self.config.allowed_commands.insert(cmd.into());
        }
        self
    }

    pub fn build(self) -> ToolRunner {
        ToolRunner::new(self.config)
    }
}

// Duration as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
