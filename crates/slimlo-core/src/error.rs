//! Error types for the SlimLO worker.
//!
//! Two layers live here: [`ErrorCode`], the numeric taxonomy that crosses the
//! protocol boundary inside `result`/`buffer_result` messages, and
//! [`WorkerError`], the Rust error used by the framing layer, the client and
//! anything else that can fail locally.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Numeric error codes reported to the supervisor.
///
/// The values are part of the wire protocol and match the native C API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum ErrorCode {
    Ok,
    InitFailed,
    LoadFailed,
    ExportFailed,
    InvalidFormat,
    FileNotFound,
    OutOfMemory,
    PermissionDenied,
    AlreadyInitialized,
    NotInitialized,
    InvalidArgument,
    Unknown,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::InitFailed => 1,
            ErrorCode::LoadFailed => 2,
            ErrorCode::ExportFailed => 3,
            ErrorCode::InvalidFormat => 4,
            ErrorCode::FileNotFound => 5,
            ErrorCode::OutOfMemory => 6,
            ErrorCode::PermissionDenied => 7,
            ErrorCode::AlreadyInitialized => 8,
            ErrorCode::NotInitialized => 9,
            ErrorCode::InvalidArgument => 10,
            ErrorCode::Unknown => 99,
        }
    }

    /// Decode a wire value. Values outside the taxonomy become `Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ErrorCode::Ok,
            1 => ErrorCode::InitFailed,
            2 => ErrorCode::LoadFailed,
            3 => ErrorCode::ExportFailed,
            4 => ErrorCode::InvalidFormat,
            5 => ErrorCode::FileNotFound,
            6 => ErrorCode::OutOfMemory,
            7 => ErrorCode::PermissionDenied,
            8 => ErrorCode::AlreadyInitialized,
            9 => ErrorCode::NotInitialized,
            10 => ErrorCode::InvalidArgument,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::InitFailed => "init_failed",
            ErrorCode::LoadFailed => "load_failed",
            ErrorCode::ExportFailed => "export_failed",
            ErrorCode::InvalidFormat => "invalid_format",
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::OutOfMemory => "out_of_memory",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::AlreadyInitialized => "already_initialized",
            ErrorCode::NotInitialized => "not_initialized",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Map an I/O failure on worker-owned temporary files to a resource code.
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::OutOfMemory => ErrorCode::OutOfMemory,
            _ => ErrorCode::PermissionDenied,
        }
    }
}

impl From<u32> for ErrorCode {
    fn from(value: u32) -> Self {
        ErrorCode::from_u32(value)
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.as_u32()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.as_u32())
    }
}

/// Main error type for the worker library.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Worker initialization failed: {0}")]
    InitFailed(String),

    #[error("Worker executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("Worker process exited (status: {status:?})")]
    WorkerExited { status: Option<i32> },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl WorkerError {
    /// True when the worker pipe is unusable and the process must be replaced.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Io { .. } | WorkerError::WorkerExited { .. } | WorkerError::Timeout(_)
        )
    }
}
