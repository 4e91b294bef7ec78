//! SlimLO Core - protocol, diagnostics and lifecycle for the out-of-process
//! PDF conversion worker.
//!
//! The conversion engine is single-threaded and bound to its process, so
//! conversions run inside a dedicated worker process. This crate holds both
//! ends of that arrangement: the [`Worker`] state machine the worker binary
//! runs over its stdio, and the [`WorkerClient`] a supervisor uses to drive
//! it. The engine binding plugs in through [`EngineLauncher`] and [`Engine`].
//!
//! # Example
//!
//! ```rust,ignore
//! use slimlo_core::{locate_worker, PlatformProfile, WorkerClient, WorkerLaunchConfig};
//! use slimlo_core::engine::DocumentFormat;
//! use std::path::Path;
//!
//! fn main() -> slimlo_core::Result<()> {
//!     let profile = PlatformProfile::detect();
//!     let resources = Path::new("/opt/slimlo");
//!     let worker = locate_worker(Some(resources), &profile)?;
//!
//!     let mut client = WorkerClient::launch(&WorkerLaunchConfig::new(worker, resources))?;
//!     let reply = client.convert_path(
//!         Path::new("report.docx"),
//!         Path::new("report.pdf"),
//!         DocumentFormat::Docx,
//!         Default::default(),
//!     )?;
//!     for diagnostic in &reply.diagnostics {
//!         println!("{:?}: {}", diagnostic.category, diagnostic.message);
//!     }
//!
//!     client.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod platform;
pub mod worker;

// Re-export commonly used types
pub use capture::{Capture, NullCapture, StderrCapture};
pub use client::{locate_worker, BufferConversion, WorkerClient, WorkerLaunchConfig};
pub use config::WorkerConfig;
pub use diagnostics::{Category, Diagnostic, Severity, PARSER_VERSION};
pub use engine::{
    ConversionGateway, ConversionOptions, DocumentFormat, Engine, EngineError, EngineLauncher,
    EngineSetup, PdfVersion, UnavailableLauncher,
};
pub use error::{ErrorCode, Result, WorkerError};
pub use platform::{HostOs, PlatformProfile};
pub use worker::{ExitReason, Phase, Worker};
