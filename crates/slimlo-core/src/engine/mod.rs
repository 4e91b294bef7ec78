//! Conversion engine seam.
//!
//! The engine itself is an external, non-reentrant component. This module
//! defines the traits a binding implements ([`EngineLauncher`] and
//! [`Engine`]) and the [`ConversionGateway`] that serializes access to it and
//! stages in-memory documents on disk.

pub mod gateway;
pub mod spool;
pub mod types;

pub use gateway::ConversionGateway;
pub use types::{ConversionOptions, DocumentFormat, EngineError, PdfVersion};

use crate::platform::PlatformProfile;
use std::path::{Path, PathBuf};

/// A live engine instance.
///
/// Every call returns its own outcome; implementations must not rely on a
/// shared "last error".
pub trait Engine {
    /// A loaded source document.
    type Document;

    /// Version string reported in the `ready` message.
    fn version(&self) -> String;

    fn load_document(
        &mut self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Self::Document, EngineError>;

    /// Export a loaded document as PDF. Consumes the document.
    fn export_pdf(
        &mut self,
        document: Self::Document,
        output: &Path,
        format: DocumentFormat,
        options: &ConversionOptions,
    ) -> Result<(), EngineError>;
}

/// Everything the engine needs to start.
#[derive(Debug, Clone)]
pub struct EngineSetup {
    pub resource_path: PathBuf,
    pub font_paths: Vec<String>,
    pub profile: PlatformProfile,
}

impl EngineSetup {
    /// Directory holding the engine libraries.
    pub fn program_dir(&self) -> PathBuf {
        self.profile.program_dir(&self.resource_path)
    }
}

/// Creates engine instances. Called once per successful `init`.
pub trait EngineLauncher {
    type Engine: Engine;

    fn launch(&mut self, setup: &EngineSetup) -> Result<Self::Engine, EngineError>;
}

/// Engine type for builds without an engine binding. Cannot be constructed.
#[derive(Debug)]
pub enum NoEngine {}

impl Engine for NoEngine {
    type Document = NoEngine;

    fn version(&self) -> String {
        match *self {}
    }

    fn load_document(&mut self, _: &Path, _: Option<&str>) -> Result<NoEngine, EngineError> {
        match *self {}
    }

    fn export_pdf(
        &mut self,
        _: NoEngine,
        _: &Path,
        _: DocumentFormat,
        _: &ConversionOptions,
    ) -> Result<(), EngineError> {
        match *self {}
    }
}

/// Launcher that fails every `init` with a fixed reason.
#[derive(Debug, Clone)]
pub struct UnavailableLauncher {
    reason: String,
}

impl UnavailableLauncher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl EngineLauncher for UnavailableLauncher {
    type Engine = NoEngine;

    fn launch(&mut self, _setup: &EngineSetup) -> Result<NoEngine, EngineError> {
        Err(EngineError::init_failed(self.reason.clone()))
    }
}
