//! fp8-probe - FP8 capability probe
//!
//! The main entry point for fp8-probe, handling:
//! - The FP8 support verdict for one device
//! - Raw signal diagnostics
//! - Configuration inspection and validation

use clap::{Args, Parser, Subcommand};
use fp8_common::error::format_error_human;
use fp8_common::{Fp8Verdict, OutputFormat, StructuredError, SCHEMA_VERSION};
use fp8_core::capabilities::Fp8Cache;
use fp8_core::config::{
    load_config, validate_config_file, ConfigOptions, ConfigSource, LoadedConfig,
    CONFIG_SCHEMA_VERSION,
};
use fp8_core::exit_codes::ExitCode;
use fp8_core::logging::config::ENV_LOG_FORMAT;
use fp8_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use fp8_core::probe::{CapabilityProbe, OverrideProbe, ProbeError, SystemProbe};
use serde_json::{json, Value};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{debug, error, info_span};

/// FP8 capability probe - can this CUDA device run FP8 kernels?
#[derive(Parser)]
#[command(name = "fp8-probe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// CUDA device index to probe
    #[arg(long, short = 'd', global = true)]
    device: Option<u32>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether FP8 execution is supported (default)
    Check(CheckArgs),

    /// Read each signal independently, without short-circuiting
    Signals(CheckArgs),

    /// Inspect or validate configuration
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug, Default)]
struct CheckArgs {
    /// Ignore FP8_PROBE_* signal overrides from the environment
    #[arg(long)]
    no_env_overrides: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration and where it came from
    Show,

    /// Load and validate a config file (defaults to the resolved one)
    Validate {
        /// Config file to validate
        path: Option<PathBuf>,
    },
}

/// Per-invocation context shared by all commands.
struct RunContext {
    run_id: String,
}

impl RunContext {
    /// JSON envelope every machine-readable payload starts from.
    fn envelope(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("schema_version".into(), json!(SCHEMA_VERSION));
        map.insert("run_id".into(), json!(self.run_id));
        map.insert(
            "generated_at".into(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        map
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::ArgsError.as_i32()
            } else {
                0
            };
            std::process::exit(code);
        }
    };

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else if cli.global.verbose > 0 {
        Some(LogLevel::from_verbosity(cli.global.verbose))
    } else {
        None
    };
    // JSON payloads pair with JSONL logs unless the environment says otherwise
    let cli_format = if cli.global.format.is_machine() && std::env::var_os(ENV_LOG_FORMAT).is_none()
    {
        Some(LogFormat::Jsonl)
    } else {
        None
    };
    init_logging(&LogConfig::from_env(cli_level, cli_format));

    let ctx = RunContext {
        run_id: generate_run_id(),
    };
    let span = info_span!("fp8_probe", run_id = %ctx.run_id);
    let _guard = span.enter();

    let exit_code = match &cli.command {
        None => run_check(&cli.global, &ctx, &CheckArgs::default()),
        Some(Commands::Check(args)) => run_check(&cli.global, &ctx, args),
        Some(Commands::Signals(args)) => run_signals(&cli.global, &ctx, args),
        Some(Commands::Config(args)) => run_config(&cli.global, &ctx, args),
        Some(Commands::Version) => print_version(&cli.global, &ctx),
    };

    debug!(exit_code = %exit_code, "done");
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn config_options(global: &GlobalOpts, args: &CheckArgs) -> ConfigOptions {
    ConfigOptions {
        config_path: global.config.clone(),
        device_index: global.device,
        ignore_env_overrides: args.no_env_overrides,
    }
}

fn build_probe(loaded: &LoadedConfig) -> OverrideProbe<SystemProbe> {
    OverrideProbe::new(
        SystemProbe::new(loaded.config.system_probe_config()),
        loaded.overrides.clone(),
    )
}

fn print_json(value: &Value) -> Result<(), ExitCode> {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "failed to serialize output");
            Err(ExitCode::InternalError)
        }
    }
}

/// Report a failure in the requested format and pick its exit code.
fn report_error(global: &GlobalOpts, ctx: &RunContext, err: &fp8_common::Error) -> ExitCode {
    let code = ExitCode::from_error(err);
    error!(error = %err, code = err.code(), "command failed");

    match global.format {
        OutputFormat::Json => {
            let mut out = ctx.envelope();
            out.insert("status".into(), json!("error"));
            out.insert("exit_code".into(), json!(code.code_name()));
            out.insert(
                "error".into(),
                json!(StructuredError::from(err).with_context("remediation", err.remediation())),
            );
            if let Err(internal) = print_json(&Value::Object(out)) {
                return internal;
            }
        }
        OutputFormat::Exitcode => {}
        _ => {
            eprintln!(
                "{}",
                format_error_human(err, std::io::stderr().is_terminal())
            );
        }
    }
    code
}

fn probe_error(global: &GlobalOpts, ctx: &RunContext, err: ProbeError) -> ExitCode {
    report_error(global, ctx, &err.into())
}

// ============================================================================
// Commands
// ============================================================================

fn run_check(global: &GlobalOpts, ctx: &RunContext, args: &CheckArgs) -> ExitCode {
    let loaded = match load_config(&config_options(global, args)) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(global, ctx, &e.into()),
    };
    let device = loaded.config.device_index;
    let cache = Fp8Cache::new(build_probe(&loaded));

    let verdict = match cache.query_fp8_support() {
        Ok(v) => v,
        Err(e) => return probe_error(global, ctx, e),
    };

    match global.format {
        OutputFormat::Json => {
            let mut out = ctx.envelope();
            out.insert("device_index".into(), json!(device));
            out.insert("supported".into(), json!(verdict.is_supported()));
            out.insert("reason".into(), json!(verdict.reason()));
            out.insert(
                "reason_code".into(),
                json!(verdict.unsupported_reason().map(|r| r.code())),
            );
            out.insert(
                "overrides_active".into(),
                json!(!cache.probe().overrides().is_empty()),
            );
            if let Err(code) = print_json(&Value::Object(out)) {
                return code;
            }
        }
        OutputFormat::Summary => match verdict {
            Fp8Verdict::Supported => println!("[{}] fp8: supported", ctx.run_id),
            Fp8Verdict::Unsupported(reason) => {
                println!("[{}] fp8: unsupported ({})", ctx.run_id, reason)
            }
        },
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# fp8-probe check");
            println!();
            match verdict {
                Fp8Verdict::Supported => println!("✓ FP8 supported on device {}", device),
                Fp8Verdict::Unsupported(reason) => {
                    println!("✗ FP8 not supported on device {}", device);
                    println!();
                    println!("Reason: {}", reason);
                }
            }
        }
    }

    ExitCode::from_verdict(&verdict)
}

fn signal_json<T: serde::Serialize, E: std::fmt::Display>(result: &Result<T, E>) -> Value {
    match result {
        Ok(value) => json!({ "status": "ok", "value": value }),
        Err(e) => json!({ "status": "error", "error": e.to_string() }),
    }
}

fn signal_text<T: std::fmt::Display, E: std::fmt::Display>(result: &Result<T, E>) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(e) => format!("error: {}", e),
    }
}

fn run_signals(global: &GlobalOpts, ctx: &RunContext, args: &CheckArgs) -> ExitCode {
    let loaded = match load_config(&config_options(global, args)) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(global, ctx, &e.into()),
    };
    let probe = build_probe(&loaded);

    let device = probe.device_capability().map(|c| c.to_string());
    let cublaslt = probe.cublaslt_version();
    let cuda = probe.cuda_version();
    let all_ok = device.is_ok() && cublaslt.is_ok() && cuda.is_ok();

    match global.format {
        OutputFormat::Json => {
            let mut out = ctx.envelope();
            out.insert("device_index".into(), json!(loaded.config.device_index));
            out.insert(
                "signals".into(),
                json!({
                    "device_capability": signal_json(&device),
                    "cublaslt_version": signal_json(&cublaslt.as_ref().map(|v| v.encoded())),
                    "cuda_version": signal_json(&cuda),
                }),
            );
            if let Err(code) = print_json(&Value::Object(out)) {
                return code;
            }
        }
        OutputFormat::Summary => {
            println!(
                "[{}] device={} cublaslt={} cuda={}",
                ctx.run_id,
                signal_text(&device),
                signal_text(&cublaslt),
                signal_text(&cuda.as_ref().map(|v| v.as_deref().unwrap_or("absent")))
            );
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# fp8-probe signals");
            println!();
            println!("| Signal | Value |");
            println!("|---|---|");
            println!("| device compute capability | {} |", signal_text(&device));
            println!("| cuBLASLt version | {} |", signal_text(&cublaslt));
            println!(
                "| CUDA version | {} |",
                signal_text(&cuda.as_ref().map(|v| v.as_deref().unwrap_or("absent")))
            );
        }
    }

    if all_ok {
        ExitCode::Supported
    } else {
        ExitCode::ProbeError
    }
}

fn run_config(global: &GlobalOpts, ctx: &RunContext, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => show_config(global, ctx),
        ConfigCommands::Validate { path } => validate_config(global, ctx, path.as_ref()),
    }
}

fn show_config(global: &GlobalOpts, ctx: &RunContext) -> ExitCode {
    let loaded = match load_config(&config_options(global, &CheckArgs::default())) {
        Ok(loaded) => loaded,
        Err(e) => return report_error(global, ctx, &e.into()),
    };

    match global.format {
        OutputFormat::Json => {
            let mut out = ctx.envelope();
            out.insert("source".into(), json!(loaded.source));
            out.insert("config".into(), json!(loaded.config));
            out.insert("effective_overrides".into(), json!(loaded.overrides));
            if let Err(code) = print_json(&Value::Object(out)) {
                return code;
            }
        }
        OutputFormat::Summary => {
            println!("[{}] config: {}", ctx.run_id, describe_source(&loaded.source));
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# fp8-probe config");
            println!();
            println!("Source: {}", describe_source(&loaded.source));
            println!();
            match toml::to_string_pretty(&loaded.config) {
                Ok(body) => {
                    println!("```toml");
                    print!("{}", body);
                    println!("```");
                }
                Err(e) => {
                    error!(error = %e, "failed to render config as TOML");
                    return ExitCode::InternalError;
                }
            }
        }
    }
    ExitCode::Supported
}

fn validate_config(global: &GlobalOpts, ctx: &RunContext, path: Option<&PathBuf>) -> ExitCode {
    let target = match path {
        Some(p) => Some(p.clone()),
        None => match load_config(&config_options(global, &CheckArgs::default())) {
            Ok(loaded) => loaded.source.path().map(|p| p.to_path_buf()),
            Err(e) => return report_error(global, ctx, &e.into()),
        },
    };

    if let Some(p) = &target {
        if let Err(e) = validate_config_file(p) {
            return report_error(global, ctx, &e.into());
        }
    }
    let shown = target
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());

    match global.format {
        OutputFormat::Json => {
            let mut out = ctx.envelope();
            out.insert("status".into(), json!("ok"));
            out.insert("path".into(), json!(target));
            out.insert("config_schema_version".into(), json!(CONFIG_SCHEMA_VERSION));
            if let Err(code) = print_json(&Value::Object(out)) {
                return code;
            }
        }
        OutputFormat::Summary => println!("[{}] config valid: {}", ctx.run_id, shown),
        OutputFormat::Exitcode => {}
        OutputFormat::Md => {
            println!("# fp8-probe config validate");
            println!();
            println!("✓ {}", shown);
        }
    }
    ExitCode::Supported
}

fn describe_source(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Explicit(p) => format!("{} (--config)", p.display()),
        ConfigSource::Env(p) => format!("{} (FP8_PROBE_CONFIG)", p.display()),
        ConfigSource::Xdg(p) => p.display().to_string(),
        ConfigSource::Defaults => "built-in defaults".to_string(),
    }
}

fn print_version(global: &GlobalOpts, ctx: &RunContext) -> ExitCode {
    let version = env!("CARGO_PKG_VERSION");
    match global.format {
        OutputFormat::Json => {
            let mut out = ctx.envelope();
            out.insert("name".into(), json!("fp8-probe"));
            out.insert("version".into(), json!(version));
            out.insert("config_schema_version".into(), json!(CONFIG_SCHEMA_VERSION));
            if let Err(code) = print_json(&Value::Object(out)) {
                return code;
            }
        }
        OutputFormat::Exitcode => {}
        _ => {
            println!("fp8-probe {}", version);
            println!("schema {}", SCHEMA_VERSION);
        }
    }
    ExitCode::Supported
}
