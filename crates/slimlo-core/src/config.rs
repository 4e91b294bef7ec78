//! Centralized configuration for the SlimLO worker.
//!
//! This module provides the protocol ceilings, capture limits, engine
//! environment variable names and client timeouts shared by the worker and
//! its supervisor.

use std::path::PathBuf;
use std::time::Duration;

/// Wire framing limits.
pub struct FrameConfig;

impl FrameConfig {
    /// Size of the little-endian length prefix.
    pub const HEADER_LEN: usize = 4;
    /// Frames declaring more than this are treated as a corrupt stream.
    pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024; // 256 MiB
}

/// Stderr capture limits.
pub struct CaptureConfig;

impl CaptureConfig {
    /// Bytes kept per conversion; anything beyond is dropped.
    pub const MAX_CAPTURE_BYTES: usize = 256 * 1024; // 256 KiB
    pub const READ_CHUNK_SIZE: usize = 8192;
}

/// Diagnostic parser limits.
pub struct DiagnosticConfig;

impl DiagnosticConfig {
    pub const MAX_MESSAGE_BYTES: usize = 1024;
}

/// Environment variables understood by the conversion engine.
pub struct EngineEnv;

impl EngineEnv {
    pub const VCL_PLUGIN: &'static str = "SAL_USE_VCLPLUGIN";
    pub const LOK_OPTIONS: &'static str = "SAL_LOK_OPTIONS";
    pub const LOG: &'static str = "SAL_LOG";
    pub const FONT_PATH: &'static str = "SAL_FONTPATH";

    /// Headless rendering backend (everything but macOS).
    pub const HEADLESS_PLUGIN: &'static str = "svp";
    /// Run engine initialization on the calling thread (macOS).
    pub const UNIPOLL: &'static str = "unipoll";
    /// Font warnings must be enabled for diagnostics to be extracted.
    pub const LOG_FILTER: &'static str = "+WARN.vcl.fonts+INFO.vcl+WARN.vcl";
}

/// Supervisor-side settings.
pub struct ClientConfig;

impl ClientConfig {
    /// Longest wait for a worker response before the process is killed.
    pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);
    pub const WORKER_BINARY_NAME: &'static str = "slimlo-worker";
}

/// Runtime configuration for one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Largest frame accepted on stdin.
    pub max_frame_size: usize,
    /// Largest amount of engine stderr kept per conversion.
    pub capture_limit: usize,
    /// Directory for spooled buffer conversions (system temp dir when unset).
    pub spool_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: FrameConfig::MAX_FRAME_SIZE,
            capture_limit: CaptureConfig::MAX_CAPTURE_BYTES,
            spool_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Clamp a requested frame ceiling to the protocol maximum.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size.min(FrameConfig::MAX_FRAME_SIZE);
        self
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }
}
