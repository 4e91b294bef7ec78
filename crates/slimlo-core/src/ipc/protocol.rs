//! Control messages exchanged with the worker.
//!
//! Every control message is a JSON object carrying a string `type`. Requests
//! are decoded leniently: mistyped optional fields fall back to their
//! defaults, unknown types are skipped, and only a payload that is not a JSON
//! object at all is a protocol error. Responses are plain serde types so the
//! supervisor can decode them with the same definitions.

use crate::diagnostics::Diagnostic;
use crate::engine::{ConversionOptions, DocumentFormat, EngineError};
use crate::error::ErrorCode;
use crate::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request sent by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Init(InitRequest),
    Convert(ConvertRequest),
    ConvertBuffer(ConvertBufferRequest),
    Quit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub font_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertRequest {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub format: DocumentFormat,
    pub options: ConversionOptions,
}

/// Announces a raw document frame that follows immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertBufferRequest {
    pub id: i64,
    pub format: DocumentFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,
    pub options: ConversionOptions,
}

/// Outcome of decoding one control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Request(Request),
    /// A JSON object whose `type` is missing or not understood.
    Ignored(Option<String>),
}

impl Request {
    /// Decode a control frame.
    ///
    /// Returns an error only when the payload is not a JSON object.
    pub fn decode(payload: &[u8]) -> Result<Decoded> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(obj) = value else {
            return Err(WorkerError::Protocol(
                "control message is not a JSON object".into(),
            ));
        };
        Ok(Self::from_object(&obj))
    }

    fn from_object(obj: &Map<String, Value>) -> Decoded {
        let kind = match obj.get("type").and_then(Value::as_str) {
            Some(kind) => kind,
            None => return Decoded::Ignored(None),
        };

        let request = match kind {
            "init" => Request::Init(InitRequest {
                resource_path: string_field(obj, "resource_path"),
                font_paths: obj
                    .get("font_paths")
                    .and_then(Value::as_array)
                    .map(|paths| {
                        paths
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            "convert" => Request::Convert(ConvertRequest {
                id: id_field(obj),
                input: string_field(obj, "input"),
                output: string_field(obj, "output"),
                format: DocumentFormat::from_json(obj.get("format")),
                options: options_field(obj),
            }),
            "convert_buffer" => Request::ConvertBuffer(ConvertBufferRequest {
                id: id_field(obj),
                format: DocumentFormat::from_json(obj.get("format")),
                data_size: obj.get("data_size").and_then(Value::as_u64),
                options: options_field(obj),
            }),
            "quit" => Request::Quit,
            other => return Decoded::Ignored(Some(other.to_string())),
        };

        Decoded::Request(request)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Init(_) => "init",
            Request::Convert(_) => "convert",
            Request::ConvertBuffer(_) => "convert_buffer",
            Request::Quit => "quit",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn id_field(obj: &Map<String, Value>) -> i64 {
    obj.get("id").and_then(Value::as_i64).unwrap_or(0)
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn options_field(obj: &Map<String, Value>) -> ConversionOptions {
    obj.get("options")
        .map(ConversionOptions::from_json)
        .unwrap_or_default()
}

/// Response emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ready { version: String },
    Error { message: String },
    Result(ConversionReply),
    BufferResult(BufferReply),
}

impl Response {
    pub fn ready(version: impl Into<String>) -> Self {
        Response::Ready {
            version: version.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Reply to a `convert` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReply {
    pub id: i64,
    pub success: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionReply {
    pub fn ok(id: i64, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            id,
            success: true,
            error_code: None,
            error_message: None,
            diagnostics,
        }
    }

    pub fn failed(id: i64, err: EngineError, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            id,
            success: false,
            error_code: Some(err.code),
            error_message: Some(err.message),
            diagnostics,
        }
    }
}

/// Reply to a `convert_buffer` request. On success the PDF bytes follow in
/// the next frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferReply {
    pub id: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl BufferReply {
    pub fn ok(id: i64, data_size: u64, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            id,
            success: true,
            data_size: Some(data_size),
            error_code: None,
            error_message: None,
            diagnostics,
        }
    }

    pub fn failed(id: i64, err: EngineError, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            id,
            success: false,
            data_size: None,
            error_code: Some(err.code),
            error_message: Some(err.message),
            diagnostics,
        }
    }
}
