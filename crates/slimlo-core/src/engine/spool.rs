//! Temporary files for buffer conversions.
//!
//! The engine converts file to file. An in-memory document is written to a
//! named temporary file carrying the format's extension, converted into a
//! second temporary path, and the result is read back. [`TempPath`] removes
//! both files when dropped, whichever way the conversion ends.

use super::EngineError;
use crate::error::ErrorCode;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile, TempPath};

const PREFIX: &str = "slimlo_";

fn builder(suffix: &str) -> Builder<'_, '_> {
    let mut builder = Builder::new();
    builder.prefix(PREFIX).suffix(suffix);
    builder
}

fn create(dir: Option<&Path>, suffix: &str) -> std::io::Result<NamedTempFile> {
    match dir {
        Some(dir) => builder(suffix).tempfile_in(dir),
        None => builder(suffix).tempfile(),
    }
}

/// Write `data` to a new temporary file named `slimlo_*.{extension}`.
pub fn spool_input(
    dir: Option<&Path>,
    data: &[u8],
    extension: &str,
) -> Result<TempPath, EngineError> {
    let suffix = format!(".{}", extension);
    let mut file = create(dir, &suffix)
        .map_err(|e| EngineError::resource("Failed to create temporary input file", &e))?;
    file.write_all(data)
        .and_then(|()| file.flush())
        .map_err(|e| EngineError::resource("Failed to write temporary input file", &e))?;
    Ok(file.into_temp_path())
}

/// Reserve a temporary path for the exported PDF.
pub fn reserve_output(dir: Option<&Path>) -> Result<TempPath, EngineError> {
    let file = create(dir, ".pdf")
        .map_err(|e| EngineError::resource("Failed to create temporary output file", &e))?;
    Ok(file.into_temp_path())
}

fn read_failed(e: std::io::Error) -> EngineError {
    EngineError::export_failed(format!("Failed to read output PDF: {}", e))
}

/// Read the exported PDF back into memory.
///
/// The buffer is reserved up front so that an allocation failure is reported
/// as out-of-memory instead of aborting the worker.
pub fn read_output(path: &Path) -> Result<Vec<u8>, EngineError> {
    let mut file = std::fs::File::open(path).map_err(read_failed)?;
    let len = file.metadata().map_err(read_failed)?.len();
    if len == 0 {
        return Err(EngineError::export_failed("Engine produced an empty PDF"));
    }

    let len = usize::try_from(len).map_err(|_| {
        EngineError::new(ErrorCode::OutOfMemory, "Output PDF does not fit in memory")
    })?;
    let mut pdf = Vec::new();
    pdf.try_reserve_exact(len).map_err(|_| {
        EngineError::new(
            ErrorCode::OutOfMemory,
            format!("Failed to allocate {} bytes for output PDF", len),
        )
    })?;
    file.read_to_end(&mut pdf).map_err(read_failed)?;
    Ok(pdf)
}
