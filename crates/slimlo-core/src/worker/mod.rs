//! Protocol state machine.
//!
//! The worker reads one control frame at a time from its input, dispatches
//! on the message type and writes the response before reading again. Each
//! conversion is bracketed by the [`Capture`] so the engine's stderr chatter
//! comes back as structured diagnostics on the same response.
//!
//! ```text
//! Uninitialized ──init ok──▶ Ready ──quit / EOF──▶ ShuttingDown
//!       │                                               ▲
//!       └────────────────────quit / EOF─────────────────┘
//! ```

pub mod state;

pub use state::{ExitReason, LifecycleState, Phase};

use crate::capture::Capture;
use crate::config::{FrameConfig, WorkerConfig};
use crate::diagnostics::{self, Diagnostic, PARSER_VERSION};
use crate::engine::{ConversionGateway, EngineError, EngineLauncher, EngineSetup};
use crate::error::ErrorCode;
use crate::ipc::frame::{read_frame, write_frame, FrameRead};
use crate::ipc::protocol::{
    BufferReply, ConversionReply, ConvertBufferRequest, ConvertRequest, Decoded, InitRequest,
    Request, Response,
};
use crate::platform::PlatformProfile;
use crate::Result;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

enum Flow {
    Continue,
    Exit(ExitReason),
}

/// One worker process worth of protocol state.
pub struct Worker<L: EngineLauncher, C: Capture> {
    launcher: L,
    capture: C,
    profile: PlatformProfile,
    config: WorkerConfig,
    state: LifecycleState<L::Engine>,
}

impl<L: EngineLauncher, C: Capture> Worker<L, C> {
    pub fn new(launcher: L, capture: C, profile: PlatformProfile, config: WorkerConfig) -> Self {
        Self {
            launcher,
            capture,
            profile,
            config,
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Serve requests until `quit`, end of input, or an unusable stream.
    ///
    /// The engine, if any, is released before this returns.
    pub fn run<R, W>(&mut self, input: &mut R, output: &mut W) -> ExitReason
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        info!(
            "Worker started (diagnostics parser v{}, max frame {} bytes)",
            PARSER_VERSION, self.config.max_frame_size
        );

        let reason = loop {
            let payload = match read_frame(input, self.config.max_frame_size) {
                Ok(FrameRead::Frame(payload)) => payload,
                Ok(FrameRead::EndOfStream) => break ExitReason::EndOfInput,
                Ok(FrameRead::Oversized(len)) => {
                    warn!(
                        "Frame of {} bytes exceeds limit {}, closing stream",
                        len, self.config.max_frame_size
                    );
                    break ExitReason::OversizedFrame(len);
                }
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break ExitReason::InputFailed;
                }
            };

            match self.handle_message(&payload, input, output) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(reason)) => break reason,
                Err(e) => {
                    error!("Failed to write response: {}", e);
                    break ExitReason::OutputFailed;
                }
            }
        };

        if self.state.shut_down() {
            info!("Engine released");
        }
        info!("Worker stopping: {:?}", reason);
        reason
    }

    fn handle_message<R, W>(
        &mut self,
        payload: &[u8],
        input: &mut R,
        output: &mut W,
    ) -> Result<Flow>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let request = match Request::decode(payload) {
            Ok(Decoded::Request(request)) => request,
            Ok(Decoded::Ignored(kind)) => {
                debug!("Ignoring message of type {:?}", kind);
                return Ok(Flow::Continue);
            }
            Err(e) => {
                warn!("Invalid JSON message: {}", e);
                send(output, &Response::error("Invalid JSON message"))?;
                return Ok(Flow::Continue);
            }
        };

        debug!("Received {} while {}", request.kind(), self.phase());

        match request {
            Request::Init(init) => {
                let response = self.handle_init(init);
                send(output, &response)?;
                Ok(Flow::Continue)
            }
            Request::Convert(convert) => {
                let reply = self.handle_convert(convert);
                send(output, &Response::Result(reply))?;
                Ok(Flow::Continue)
            }
            Request::ConvertBuffer(convert) => self.handle_convert_buffer(convert, input, output),
            Request::Quit => {
                info!("Quit requested");
                Ok(Flow::Exit(ExitReason::Quit))
            }
        }
    }

    fn handle_init(&mut self, init: InitRequest) -> Response {
        match self.state.phase() {
            Phase::Uninitialized => {}
            Phase::Ready => {
                warn!("init rejected: {}", ErrorCode::AlreadyInitialized);
                return Response::error("Already initialized");
            }
            Phase::ShuttingDown => return Response::error("Worker is shutting down"),
        }

        let Some(resource_path) = init.resource_path.filter(|p| !p.is_empty()) else {
            warn!("init rejected: no resource_path");
            return Response::error("Missing resource_path in init message");
        };

        if let Some(font_path) = self.profile.apply_font_paths(&init.font_paths) {
            debug!("Font path set to {}", font_path);
        }

        let setup = EngineSetup {
            resource_path: PathBuf::from(resource_path),
            font_paths: init.font_paths,
            profile: self.profile,
        };

        match self.launcher.launch(&setup) {
            Ok(engine) => {
                let gateway = ConversionGateway::new(engine)
                    .with_spool_dir(self.config.spool_dir.clone());
                let version = gateway.version().to_string();
                info!(
                    "Engine {} initialized from {}",
                    version,
                    setup.resource_path.display()
                );
                self.state = LifecycleState::Ready(gateway);
                Response::ready(version)
            }
            Err(e) => {
                warn!("Engine initialization failed: {}", e);
                if e.message.is_empty() {
                    Response::error("Failed to initialize")
                } else {
                    Response::error(e.message)
                }
            }
        }
    }

    fn handle_convert(&mut self, request: ConvertRequest) -> ConversionReply {
        let id = request.id;
        let Some(gateway) = self.state.gateway() else {
            return ConversionReply::failed(id, not_initialized(), Vec::new());
        };

        let paths = (
            request.input.as_deref().filter(|p| !p.is_empty()),
            request.output.as_deref().filter(|p| !p.is_empty()),
        );
        let (Some(input), Some(output)) = paths else {
            return ConversionReply::failed(
                id,
                EngineError::invalid_argument("Missing input or output path"),
                Vec::new(),
            );
        };

        let (outcome, diagnostics) = captured(&mut self.capture, || {
            gateway.convert_file(
                Path::new(input),
                Path::new(output),
                request.format,
                &request.options,
            )
        });

        match outcome {
            Ok(()) => {
                debug!(
                    "convert {} succeeded ({} diagnostics)",
                    id,
                    diagnostics.len()
                );
                ConversionReply::ok(id, diagnostics)
            }
            Err(e) => {
                debug!("convert {} failed: {} ({})", id, e, e.code);
                ConversionReply::failed(id, e, diagnostics)
            }
        }
    }

    fn handle_convert_buffer<R, W>(
        &mut self,
        request: ConvertBufferRequest,
        input: &mut R,
        output: &mut W,
    ) -> Result<Flow>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        // The data frame is consumed in every state to keep the stream aligned.
        let mut exit = None;
        let data = match read_frame(input, self.config.max_frame_size) {
            Ok(FrameRead::Frame(data)) => Some(data),
            Ok(FrameRead::EndOfStream) => None,
            Ok(FrameRead::Oversized(len)) => {
                warn!("Document frame of {} bytes exceeds limit", len);
                exit = Some(ExitReason::OversizedFrame(len));
                None
            }
            Err(e) => {
                warn!("Failed to read document frame: {}", e);
                exit = Some(ExitReason::InputFailed);
                None
            }
        };

        let (reply, pdf) = self.buffer_conversion(&request, data);
        send(output, &Response::BufferResult(reply))?;
        if let Some(pdf) = pdf {
            write_frame(output, &pdf)?;
        }

        Ok(exit.map_or(Flow::Continue, Flow::Exit))
    }

    fn buffer_conversion(
        &mut self,
        request: &ConvertBufferRequest,
        data: Option<Vec<u8>>,
    ) -> (BufferReply, Option<Vec<u8>>) {
        let id = request.id;
        let reject = |err: EngineError| (BufferReply::failed(id, err, Vec::new()), None);

        let Some(gateway) = self.state.gateway() else {
            return reject(not_initialized());
        };
        let Some(expected) = request.data_size else {
            return reject(EngineError::invalid_argument(
                "Missing data_size in convert_buffer",
            ));
        };
        let Some(data) = data else {
            return reject(EngineError::invalid_argument(
                "Failed to read document data frame",
            ));
        };
        if data.len() as u64 != expected {
            debug!(
                "convert_buffer {}: declared {} bytes, received {}",
                id,
                expected,
                data.len()
            );
            return reject(EngineError::invalid_argument("Data frame size mismatch"));
        }

        let (outcome, diagnostics) = captured(&mut self.capture, || {
            gateway.convert_buffer(&data, request.format, &request.options)
        });

        match outcome {
            Ok(pdf) if pdf.len() > FrameConfig::MAX_FRAME_SIZE => {
                let err = EngineError::export_failed(format!(
                    "PDF of {} bytes exceeds the {} byte frame limit",
                    pdf.len(),
                    FrameConfig::MAX_FRAME_SIZE
                ));
                (BufferReply::failed(id, err, diagnostics), None)
            }
            Ok(pdf) => {
                debug!(
                    "convert_buffer {} produced {} bytes ({} diagnostics)",
                    id,
                    pdf.len(),
                    diagnostics.len()
                );
                let size = pdf.len() as u64;
                (BufferReply::ok(id, size, diagnostics), Some(pdf))
            }
            Err(e) => {
                debug!("convert_buffer {} failed: {} ({})", id, e, e.code);
                (BufferReply::failed(id, e, diagnostics), None)
            }
        }
    }
}

fn not_initialized() -> EngineError {
    EngineError::new(ErrorCode::NotInitialized, "Worker not initialized")
}

fn send<W: Write + ?Sized>(output: &mut W, response: &Response) -> Result<()> {
    write_frame(output, &response.encode()?)
}

/// Run `call` with stderr captured and parse what it wrote.
///
/// Nothing may log between `start` and the end of `read`.
fn captured<C, T>(capture: &mut C, call: impl FnOnce() -> T) -> (T, Vec<Diagnostic>)
where
    C: Capture + ?Sized,
{
    let started = capture.start();
    let outcome = call();

    let diagnostics = match started {
        Ok(()) => {
            let stopped = capture.stop();
            let raw = capture.read();
            if let Err(e) = stopped {
                warn!("Failed to restore stderr after conversion: {}", e);
            }
            diagnostics::parse_bytes(&raw)
        }
        Err(e) => {
            warn!(
                "Stderr capture unavailable, converting without diagnostics: {}",
                e
            );
            Vec::new()
        }
    };

    (outcome, diagnostics)
}
