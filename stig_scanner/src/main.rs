//! # STIG Scanner CLI
//!
//! `stig-scan scan` runs a profile against the local host (or recorded
//! fixtures), `stig-scan report` re-renders a saved report and
//! `stig-scan list` prints a profile's controls.
//!
//! Exit status: 0 when no control failed or errored, 1 otherwise, 2 when
//! the run could not start.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stig_engine::prelude::*;
use stig_scanner::{create_fixture_registry, create_provider_registry};

/// Process bound for provider commands when probe timeouts are disabled
const UNBOUNDED_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

const EXIT_CLEAN: u8 = 0;
const EXIT_FINDINGS: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[derive(Parser)]
#[command(name = "stig-scan", version, about = "Compliance control scanner for STIG profiles")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every control of a profile
    Scan(ScanArgs),

    /// Render a saved JSON report
    Report {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// List the controls of a profile
    List {
        #[arg(long)]
        profile: PathBuf,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Profile directory or single control file
    #[arg(long)]
    profile: PathBuf,

    /// Attribute override file (TOML, or JSON by extension)
    #[arg(long)]
    attributes: Option<PathBuf>,

    /// Runner configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay recorded probe results instead of touching the host
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Per-probe timeout in seconds; 0 disables it
    #[arg(long)]
    timeout: Option<f64>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    deadline: Option<f64>,

    /// Write the JSON report here
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let outcome = match cli.command {
        Command::Scan(args) => scan(args),
        Command::Report { file, format } => show_report(&file, format),
        Command::List { profile } => list(&profile),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(message) => {
            error!("{}", message);
            eprintln!("Error: {}", message);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn scan(args: ScanArgs) -> Result<u8, String> {
    let start = Instant::now();

    let mut config = match &args.config {
        Some(path) => RunnerConfig::from_toml_file(path).map_err(|e| e.to_string())?,
        None => RunnerConfig::default(),
    };
    if let Some(threads) = args.threads {
        config = config.with_max_threads(threads);
    }
    if let Some(timeout) = args.timeout {
        config = config.with_probe_timeout(seconds("--timeout", timeout)?);
    }
    config.validate().map_err(|e| e.to_string())?;

    info!("Phase 1: Initializing provider registry");
    let registry = match &args.fixtures {
        Some(path) => create_fixture_registry(path),
        None => create_provider_registry(config.probe_timeout().unwrap_or(UNBOUNDED_COMMAND_TIMEOUT)),
    }
    .map_err(|e| e.to_string())?;
    info!("Registry ready with kinds: {}", registry.list_kinds().join(", "));

    let runner = ProfileRunner::new(Arc::new(registry))
        .with_config(config)
        .with_host(HostContext::from_system());

    if let Some(deadline) = args.deadline {
        runner
            .cancellation_token()
            .cancel_after(seconds("--deadline", deadline)?);
    }

    info!("Phase 2: Running profile {}", args.profile.display());
    let report = runner
        .run_path(&args.profile, args.attributes.as_deref())
        .map_err(|e| e.user_message())?;

    if let Some(output) = &args.output {
        report.write(output).map_err(|e| e.to_string())?;
        info!("Report written to {}", output.display());
    }
    print_report(&report, args.format)?;

    info!(
        "Scan completed in {:.2}s: {} controls",
        start.elapsed().as_secs_f64(),
        report.summary.total
    );
    Ok(exit_code(&report))
}

fn show_report(file: &Path, format: OutputFormat) -> Result<u8, String> {
    let report = Report::read(file).map_err(|e| e.to_string())?;
    print_report(&report, format)?;
    Ok(exit_code(&report))
}

fn list(profile: &Path) -> Result<u8, String> {
    let profile = load_profile(profile).map_err(|e| e.to_string())?;
    println!("{} ({} controls)", profile.name(), profile.controls().len());
    for control in profile.controls() {
        let mode = if control.defect.is_some() {
            "defective"
        } else if control.is_manual() {
            "manual"
        } else {
            "automated"
        };
        println!(
            "  {:<10} {:<8} {:<9} {}",
            control.id,
            control.severity().as_str(),
            mode,
            control.title.as_deref().unwrap_or("")
        );
    }
    Ok(EXIT_CLEAN)
}

fn print_report(report: &Report, format: OutputFormat) -> Result<(), String> {
    match format {
        OutputFormat::Summary => print!("{}", render_summary(report)),
        OutputFormat::Json => println!("{}", report.to_json().map_err(|e| e.to_string())?),
    }
    Ok(())
}

fn exit_code(report: &Report) -> u8 {
    if report.summary.is_clean() {
        EXIT_CLEAN
    } else {
        EXIT_FINDINGS
    }
}

fn seconds(flag: &str, value: f64) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| format!("{} expects a non-negative number of seconds, got {}", flag, value))
}
