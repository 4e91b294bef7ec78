//! Engine binding over the SlimLO C API (`libslimlo`).
//!
//! The C library converts file to file in one call, so "loading" a document
//! only stages its path and password; the engine opens it during export and
//! load failures surface from that call with their own error code.

// FFI boundary: every unsafe block below documents its invariants.
#![allow(unsafe_code)]

use slimlo_core::engine::{
    ConversionOptions, DocumentFormat, Engine, EngineError, EngineLauncher, EngineSetup,
};
use slimlo_core::ErrorCode;
use std::ffi::{c_char, c_int, CStr, CString};
use std::path::Path;
use std::ptr::{self, NonNull};
use tracing::debug;

#[repr(C)]
struct SlimLOInstance {
    _private: [u8; 0],
}

#[repr(C)]
struct SlimLOPdfOptions {
    pdf_version: c_int,
    jpeg_quality: c_int,
    dpi: c_int,
    tagged_pdf: c_int,
    page_range: *const c_char,
    password: *const c_char,
}

#[link(name = "slimlo")]
extern "C" {
    fn slimlo_init(resource_path: *const c_char) -> *mut SlimLOInstance;
    fn slimlo_destroy(handle: *mut SlimLOInstance);
    fn slimlo_convert_file(
        handle: *mut SlimLOInstance,
        input_path: *const c_char,
        output_path: *const c_char,
        format_hint: c_int,
        options: *const SlimLOPdfOptions,
    ) -> c_int;
    fn slimlo_get_error_message(handle: *mut SlimLOInstance) -> *const c_char;
    fn slimlo_version() -> *const c_char;
}

/// Copy a C string owned by the library, if any.
fn owned_message(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null pointers returned by libslimlo are NUL-terminated and
    // stay valid until the next call on the same handle; we copy immediately.
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    (!text.is_empty()).then_some(text)
}

fn c_string(value: &str, what: &str) -> Result<CString, EngineError> {
    CString::new(value)
        .map_err(|_| EngineError::invalid_argument(format!("{} contains a NUL byte", what)))
}

fn c_path(path: &Path, what: &str) -> Result<CString, EngineError> {
    let text = path
        .to_str()
        .ok_or_else(|| EngineError::invalid_argument(format!("{} is not valid UTF-8", what)))?;
    c_string(text, what)
}

/// Launches the engine through `slimlo_init`.
#[derive(Debug, Default)]
pub struct NativeLauncher;

impl EngineLauncher for NativeLauncher {
    type Engine = NativeEngine;

    fn launch(&mut self, setup: &EngineSetup) -> Result<NativeEngine, EngineError> {
        let resource_path = c_path(&setup.resource_path, "resource_path")?;
        debug!(
            "Initializing libslimlo (program dir {})",
            setup.program_dir().display()
        );

        // SAFETY: `resource_path` is a valid NUL-terminated string for the
        // duration of the call.
        let raw = unsafe { slimlo_init(resource_path.as_ptr()) };
        match NonNull::new(raw) {
            Some(handle) => Ok(NativeEngine { handle }),
            None => {
                // SAFETY: a null handle asks for the last initialization error.
                let message = owned_message(unsafe { slimlo_get_error_message(ptr::null_mut()) });
                Err(EngineError::init_failed(
                    message.unwrap_or_else(|| "Failed to initialize".to_string()),
                ))
            }
        }
    }
}

/// A live `libslimlo` instance. Destroyed on drop.
pub struct NativeEngine {
    handle: NonNull<SlimLOInstance>,
}

/// Source document waiting for export.
pub struct StagedDocument {
    path: CString,
    password: Option<CString>,
}

impl NativeEngine {
    fn last_error(&self, fallback: &str) -> String {
        // SAFETY: `handle` is live until drop.
        owned_message(unsafe { slimlo_get_error_message(self.handle.as_ptr()) })
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl Engine for NativeEngine {
    type Document = StagedDocument;

    fn version(&self) -> String {
        // SAFETY: returns a static string or null.
        owned_message(unsafe { slimlo_version() }).unwrap_or_else(|| "unknown".to_string())
    }

    fn load_document(
        &mut self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<StagedDocument, EngineError> {
        Ok(StagedDocument {
            path: c_path(path, "input path")?,
            password: password.map(|p| c_string(p, "password")).transpose()?,
        })
    }

    fn export_pdf(
        &mut self,
        document: StagedDocument,
        output: &Path,
        format: DocumentFormat,
        options: &ConversionOptions,
    ) -> Result<(), EngineError> {
        let output = c_path(output, "output path")?;
        let page_range = options
            .page_range
            .as_deref()
            .map(|range| c_string(range, "page_range"))
            .transpose()?;

        let c_options = SlimLOPdfOptions {
            pdf_version: options.pdf_version.as_u32() as c_int,
            jpeg_quality: options.jpeg_quality.map_or(0, c_int::from),
            dpi: options
                .dpi
                .and_then(|dpi| c_int::try_from(dpi).ok())
                .unwrap_or(0),
            tagged_pdf: c_int::from(options.tagged_pdf),
            page_range: page_range.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            password: document
                .password
                .as_ref()
                .map_or(ptr::null(), |s| s.as_ptr()),
        };

        // SAFETY: the handle is live, every string pointer refers to a CString
        // owned by this frame, and `c_options` outlives the call.
        let rc = unsafe {
            slimlo_convert_file(
                self.handle.as_ptr(),
                document.path.as_ptr(),
                output.as_ptr(),
                format.as_u32() as c_int,
                &c_options,
            )
        };

        if rc == 0 {
            return Ok(());
        }
        let code = u32::try_from(rc).map_or(ErrorCode::Unknown, ErrorCode::from_u32);
        Err(EngineError::new(code, self.last_error("Conversion failed")))
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        debug!("Destroying libslimlo instance");
        // SAFETY: the handle came from `slimlo_init` and is destroyed once.
        unsafe { slimlo_destroy(self.handle.as_ptr()) };
    }
}
