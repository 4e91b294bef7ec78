//! Serialized access to the engine.
//!
//! Gateway calls run inside the stderr capture window, so nothing here logs.

use super::spool;
use super::{ConversionOptions, DocumentFormat, Engine, EngineError};
use crate::error::ErrorCode;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Owns the engine and holds its lock around each load/export pair.
pub struct ConversionGateway<E: Engine> {
    engine: Mutex<E>,
    version: String,
    spool_dir: Option<PathBuf>,
}

impl<E: Engine> ConversionGateway<E> {
    pub fn new(engine: E) -> Self {
        let version = engine.version();
        Self {
            engine: Mutex::new(engine),
            version,
            spool_dir: None,
        }
    }

    /// Stage buffer conversions under `dir` instead of the system temp dir.
    pub fn with_spool_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.spool_dir = dir;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn lock(&self) -> Result<MutexGuard<'_, E>, EngineError> {
        self.engine
            .lock()
            .map_err(|_| EngineError::new(ErrorCode::Unknown, "Engine lock poisoned"))
    }

    /// Convert a document on disk to a PDF on disk.
    pub fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        format: DocumentFormat,
        options: &ConversionOptions,
    ) -> Result<(), EngineError> {
        if !input.exists() {
            return Err(EngineError::new(
                ErrorCode::FileNotFound,
                format!("Input file not found: {}", input.display()),
            ));
        }

        let mut engine = self.lock()?;
        let document = engine.load_document(input, options.password())?;
        engine.export_pdf(document, output, format, options)
    }

    /// Convert an in-memory document and return the PDF bytes.
    ///
    /// The format must be known since it names the staged input file.
    pub fn convert_buffer(
        &self,
        data: &[u8],
        format: DocumentFormat,
        options: &ConversionOptions,
    ) -> Result<Vec<u8>, EngineError> {
        if data.is_empty() {
            return Err(EngineError::invalid_argument("Document data is empty"));
        }
        let extension = format.extension().ok_or_else(|| {
            EngineError::new(
                ErrorCode::InvalidFormat,
                "Buffer conversion requires an explicit document format",
            )
        })?;

        let spool_dir = self.spool_dir.as_deref();
        let input = spool::spool_input(spool_dir, data, extension)?;
        let output = spool::reserve_output(spool_dir)?;

        self.convert_file(&input, &output, format, options)?;
        spool::read_output(&output)
    }
}
