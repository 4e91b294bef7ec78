//! Conversion request types shared by the protocol and the engine gateway.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Input format hint. `Unknown` lets the engine auto-detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum DocumentFormat {
    #[default]
    Unknown,
    Docx,
    Xlsx,
    Pptx,
}

impl DocumentFormat {
    pub fn as_u32(self) -> u32 {
        match self {
            DocumentFormat::Unknown => 0,
            DocumentFormat::Docx => 1,
            DocumentFormat::Xlsx => 2,
            DocumentFormat::Pptx => 3,
        }
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => DocumentFormat::Docx,
            2 => DocumentFormat::Xlsx,
            3 => DocumentFormat::Pptx,
            _ => DocumentFormat::Unknown,
        }
    }

    /// File extension used when the document has to be staged on disk.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            DocumentFormat::Unknown => None,
            DocumentFormat::Docx => Some("docx"),
            DocumentFormat::Xlsx => Some("xlsx"),
            DocumentFormat::Pptx => Some("pptx"),
        }
    }

    /// Lenient decode from a JSON field: anything but a known number is `Unknown`.
    pub fn from_json(value: Option<&Value>) -> Self {
        value
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .map(DocumentFormat::from_u32)
            .unwrap_or_default()
    }
}

impl From<u32> for DocumentFormat {
    fn from(value: u32) -> Self {
        DocumentFormat::from_u32(value)
    }
}

impl From<DocumentFormat> for u32 {
    fn from(format: DocumentFormat) -> Self {
        format.as_u32()
    }
}

/// Output PDF flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum PdfVersion {
    #[default]
    Default,
    PdfA1,
    PdfA2,
    PdfA3,
}

impl PdfVersion {
    pub fn as_u32(self) -> u32 {
        match self {
            PdfVersion::Default => 0,
            PdfVersion::PdfA1 => 1,
            PdfVersion::PdfA2 => 2,
            PdfVersion::PdfA3 => 3,
        }
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => PdfVersion::PdfA1,
            2 => PdfVersion::PdfA2,
            3 => PdfVersion::PdfA3,
            _ => PdfVersion::Default,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == PdfVersion::Default
    }
}

impl From<u32> for PdfVersion {
    fn from(value: u32) -> Self {
        PdfVersion::from_u32(value)
    }
}

impl From<PdfVersion> for u32 {
    fn from(version: PdfVersion) -> Self {
        version.as_u32()
    }
}

/// PDF export options. Unset fields fall back to the engine's defaults.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionOptions {
    #[serde(skip_serializing_if = "PdfVersion::is_default")]
    pub pdf_version: PdfVersion,
    /// 1-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub tagged_pdf: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,
    /// Unlocks the source document. Never echoed back or logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("pdf_version", &self.pdf_version)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("dpi", &self.dpi)
            .field("tagged_pdf", &self.tagged_pdf)
            .field("page_range", &self.page_range)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConversionOptions {
    /// Lenient decode of an `options` object.
    ///
    /// Out-of-range or mistyped fields are treated as absent so that a sloppy
    /// client still gets the engine defaults instead of a protocol error.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let pdf_version = obj
            .get("pdf_version")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .map(PdfVersion::from_u32)
            .unwrap_or_default();

        let jpeg_quality = obj
            .get("jpeg_quality")
            .and_then(Value::as_i64)
            .filter(|q| (1..=100).contains(q))
            .map(|q| q as u8);

        let dpi = obj
            .get("dpi")
            .and_then(Value::as_i64)
            .filter(|d| *d > 0)
            .and_then(|d| u32::try_from(d).ok());

        let tagged_pdf = obj
            .get("tagged_pdf")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let page_range = obj
            .get("page_range")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let password = obj
            .get("password")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            pdf_version,
            jpeg_quality,
            dpi,
            tagged_pdf,
            page_range,
            password,
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Failure reported by the engine or by the gateway around it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn init_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InitFailed, message)
    }

    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LoadFailed, message)
    }

    pub fn export_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExportFailed, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Wrap an I/O failure on a worker-owned temporary file.
    pub fn resource(context: &str, err: &std::io::Error) -> Self {
        Self::new(
            ErrorCode::from_io_kind(err.kind()),
            format!("{}: {}", context, err),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_from_full_object() {
        let options = ConversionOptions::from_json(&json!({
            "pdf_version": 2,
            "jpeg_quality": 85,
            "dpi": 150,
            "tagged_pdf": true,
            "page_range": "1-3",
            "password": "secret"
        }));

        assert_eq!(options.pdf_version, PdfVersion::PdfA2);
        assert_eq!(options.jpeg_quality, Some(85));
        assert_eq!(options.dpi, Some(150));
        assert!(options.tagged_pdf);
        assert_eq!(options.page_range.as_deref(), Some("1-3"));
        assert_eq!(options.password(), Some("secret"));
    }

    #[test]
    fn test_out_of_range_options_are_unset() {
        let options = ConversionOptions::from_json(&json!({
            "pdf_version": 9,
            "jpeg_quality": 0,
            "dpi": -72,
            "tagged_pdf": "yes",
            "page_range": "",
            "password": 1234
        }));

        assert_eq!(options, ConversionOptions::default());

        let options = ConversionOptions::from_json(&json!({ "jpeg_quality": 101 }));
        assert_eq!(options.jpeg_quality, None);
    }

    #[test]
    fn test_non_object_options_fall_back_to_defaults() {
        assert_eq!(
            ConversionOptions::from_json(&json!("fast")),
            ConversionOptions::default()
        );
    }

    #[test]
    fn test_password_is_redacted_from_debug() {
        let options = ConversionOptions {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", options);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_default_options_serialize_empty() {
        let json = serde_json::to_value(ConversionOptions::default()).unwrap();
        assert_eq!(json, json!({}));
    }

    #[test]
    fn test_document_format_decoding() {
        let decode = |value: serde_json::Value| DocumentFormat::from_json(Some(&value));
        assert_eq!(decode(json!(1)), DocumentFormat::Docx);
        assert_eq!(decode(json!(3)), DocumentFormat::Pptx);
        assert_eq!(decode(json!(17)), DocumentFormat::Unknown);
        assert_eq!(decode(json!("docx")), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::from_json(None), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::Xlsx.extension(), Some("xlsx"));
        assert_eq!(DocumentFormat::Unknown.extension(), None);
    }

    #[test]
    fn test_resource_error_codes() {
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let engine_err = EngineError::resource("Failed to create temporary input file", &err);
        assert_eq!(engine_err.code, ErrorCode::PermissionDenied);
        assert!(engine_err
            .message
            .starts_with("Failed to create temporary input file"));
    }
}
