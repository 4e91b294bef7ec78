//! SlimLO Worker - out-of-process PDF conversion over framed stdio.
//!
//! stdin/stdout carry the length-prefixed JSON protocol and nothing else.
//! Logs go to stderr, which the worker also redirects around each engine
//! call to collect font diagnostics.

#[cfg(feature = "native")]
mod native;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use slimlo_core::config::FrameConfig;
use slimlo_core::{EngineLauncher, PlatformProfile, StderrCapture, Worker, WorkerConfig};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "SLIMLO_LOG";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "slimlo-worker")]
#[command(version, about = "Out-of-process SlimLO PDF conversion worker")]
struct Args {
    /// Enable debug logging (overridden by SLIMLO_LOG)
    #[arg(short, long)]
    debug: bool,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Largest frame accepted on stdin, in bytes (capped at 256 MiB)
    #[arg(long, default_value_t = FrameConfig::MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Directory for temporary files used by buffer conversions
    #[arg(long)]
    spool_dir: Option<PathBuf>,
}

fn init_logging(args: &Args) -> Result<()> {
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false);

    match args.log_format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

#[cfg(feature = "native")]
fn engine_launcher() -> impl EngineLauncher {
    native::NativeLauncher
}

#[cfg(not(feature = "native"))]
fn engine_launcher() -> impl EngineLauncher {
    slimlo_core::UnavailableLauncher::new("native engine support not compiled in")
}

fn main() -> Result<()> {
    // Environment changes must happen while the process is single-threaded.
    let profile = PlatformProfile::detect();
    let applied = profile.apply_process_defaults();

    let args = Args::parse();
    init_logging(&args)?;

    info!(
        "Starting SlimLO worker {} on {}",
        env!("CARGO_PKG_VERSION"),
        profile.os().as_str()
    );
    debug!("Engine environment defaults applied: {:?}", applied);

    let mut config = WorkerConfig::default().with_max_frame_size(args.max_frame_size);
    if let Some(dir) = args.spool_dir {
        config = config.with_spool_dir(dir);
    }

    let capture = StderrCapture::new(config.capture_limit);
    let mut worker = Worker::new(engine_launcher(), capture, profile, config);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());

    let reason = worker.run(&mut input, &mut output);
    info!("Worker exited: {:?}", reason);

    Ok(())
}
