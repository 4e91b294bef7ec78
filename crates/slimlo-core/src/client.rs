//! Supervisor side of the worker protocol.
//!
//! [`WorkerClient`] owns one worker process: it spawns the executable with
//! piped stdio, performs the `init` handshake, sends conversions one at a
//! time and shuts the process down with `quit`, killing it if it does not
//! exit in time.
//!
//! Responses are read on a background thread and awaited with a deadline.
//! A worker that misses it is killed, and so is one whose stream can no
//! longer be trusted, for example after a half-sent `convert_buffer`. Later
//! calls fail with [`WorkerError::WorkerExited`].

use crate::config::{ClientConfig, FrameConfig};
use crate::engine::ConversionOptions;
use crate::engine::DocumentFormat;
use crate::ipc::frame::{read_frame, write_frame, FrameRead};
use crate::ipc::protocol::{
    BufferReply, ConversionReply, ConvertBufferRequest, ConvertRequest, InitRequest, Request,
    Response,
};
use crate::platform::PlatformProfile;
use crate::{Result, WorkerError};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Environment variable naming the worker executable explicitly.
pub const WORKER_PATH_ENV: &str = "SLIMLO_WORKER_PATH";

/// How to start a worker process.
#[derive(Debug, Clone)]
pub struct WorkerLaunchConfig {
    pub executable: PathBuf,
    pub resource_path: PathBuf,
    pub font_paths: Vec<String>,
    /// Forward the worker's own stderr (logs) to ours; discarded otherwise.
    pub inherit_stderr: bool,
    /// Extra environment for the worker process.
    pub env_vars: Vec<(String, String)>,
    /// Longest wait for any single response, the `init` handshake included.
    pub conversion_timeout: Duration,
    pub profile: PlatformProfile,
}

impl WorkerLaunchConfig {
    pub fn new(executable: impl Into<PathBuf>, resource_path: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            resource_path: resource_path.into(),
            font_paths: Vec::new(),
            inherit_stderr: false,
            env_vars: Vec::new(),
            conversion_timeout: ClientConfig::CONVERSION_TIMEOUT,
            profile: PlatformProfile::detect(),
        }
    }

    pub fn with_font_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.font_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_inherited_stderr(mut self, inherit: bool) -> Self {
        self.inherit_stderr = inherit;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn with_conversion_timeout(mut self, timeout: Duration) -> Self {
        self.conversion_timeout = timeout;
        self
    }

    fn init_request(&self) -> Request {
        Request::Init(InitRequest {
            resource_path: Some(self.resource_path.to_string_lossy().into_owned()),
            font_paths: self.font_paths.clone(),
        })
    }
}

/// Find the worker executable.
///
/// Checked in order: `SLIMLO_WORKER_PATH`, next to the current executable,
/// then the engine program directory under `resource_path`.
pub fn locate_worker(resource_path: Option<&Path>, profile: &PlatformProfile) -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(WORKER_PATH_ENV).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(WorkerError::ExecutableNotFound(path));
    }

    let name = profile.worker_executable_name();
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(&name));
        }
    }
    if let Some(resource_path) = resource_path {
        let program_dir = profile.program_dir(resource_path);
        candidates.push(program_dir.join(&name));
    }

    let fallback = match candidates.first() {
        Some(first) => first.clone(),
        None => PathBuf::from(&name),
    };
    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or(WorkerError::ExecutableNotFound(fallback))
}

/// Outcome of a buffer conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConversion {
    pub reply: BufferReply,
    /// Present exactly when `reply.success` is true.
    pub pdf: Option<Vec<u8>>,
}

/// Forward frames from the worker's stdout until it closes or misbehaves.
fn spawn_reader(stdout: ChildStdout) -> Receiver<Result<FrameRead>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            let frame = read_frame(&mut reader, FrameConfig::MAX_FRAME_SIZE);
            let more = matches!(frame, Ok(FrameRead::Frame(_)));
            if tx.send(frame).is_err() || !more {
                break;
            }
        }
    });
    rx
}

/// A running worker process.
pub struct WorkerClient {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    frames: Receiver<Result<FrameRead>>,
    conversion_timeout: Duration,
    version: Option<String>,
    next_id: i64,
    finished: bool,
}

impl WorkerClient {
    /// Spawn the worker and complete the `init` handshake.
    pub fn launch(config: &WorkerLaunchConfig) -> Result<Self> {
        let mut client = Self::spawn(config)?;
        client.initialize(config.init_request())?;
        Ok(client)
    }

    /// Spawn the worker without sending `init`.
    pub fn spawn(config: &WorkerLaunchConfig) -> Result<Self> {
        if !config.executable.is_file() {
            return Err(WorkerError::ExecutableNotFound(config.executable.clone()));
        }

        let mut cmd = Command::new(&config.executable);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
        if config.inherit_stderr {
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stderr(Stdio::null());
        }

        if let Some(var) = config.profile.library_path_var() {
            let mut dirs = Vec::new();
            if let Some(dir) = config.executable.parent() {
                dirs.push(dir.to_path_buf());
            }
            dirs.push(config.profile.program_dir(&config.resource_path));
            if let Some(value) = config
                .profile
                .library_search_path(&dirs, std::env::var_os(var))
            {
                cmd.env(var, value);
            }
        }
        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| WorkerError::Io {
            message: format!("spawn {}: {}", config.executable.display(), e),
            source: Some(e),
        })?;
        info!(
            "Spawned worker {} (PID {})",
            config.executable.display(),
            child.id()
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WorkerError::Protocol("worker stdio was not piped".into()));
        };

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            frames: spawn_reader(stdout),
            conversion_timeout: config.conversion_timeout,
            version: None,
            next_id: 1,
            finished: false,
        })
    }

    /// Send `init` and wait for `ready`. Returns the engine version.
    pub fn initialize(&mut self, init: Request) -> Result<String> {
        self.send(&init)?;
        match self.read_response()? {
            Response::Ready { version } => {
                info!("Worker {} ready (engine {})", self.pid(), version);
                self.version = Some(version.clone());
                Ok(version)
            }
            Response::Error { message } => Err(WorkerError::InitFailed(message)),
            other => Err(unexpected("ready", &other)),
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn is_alive(&mut self) -> bool {
        !self.finished && matches!(self.child.try_wait(), Ok(None))
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Convert a file on disk. A zero `id` is replaced with a fresh one.
    pub fn convert(&mut self, mut request: ConvertRequest) -> Result<ConversionReply> {
        if request.id == 0 {
            request.id = self.next_id();
        }
        self.send(&Request::Convert(request))?;
        match self.read_response()? {
            Response::Result(reply) => Ok(reply),
            other => Err(unexpected("result", &other)),
        }
    }

    /// Convenience wrapper around [`convert`](Self::convert).
    pub fn convert_path(
        &mut self,
        input: &Path,
        output: &Path,
        format: DocumentFormat,
        options: ConversionOptions,
    ) -> Result<ConversionReply> {
        self.convert(ConvertRequest {
            id: 0,
            input: Some(input.to_string_lossy().into_owned()),
            output: Some(output.to_string_lossy().into_owned()),
            format,
            options,
        })
    }

    /// Convert an in-memory document. `data_size` is filled in from `data`.
    ///
    /// Documents larger than a frame are refused before anything is sent.
    pub fn convert_buffer(
        &mut self,
        mut request: ConvertBufferRequest,
        data: &[u8],
    ) -> Result<BufferConversion> {
        if data.len() > FrameConfig::MAX_FRAME_SIZE {
            return Err(WorkerError::FrameTooLarge {
                size: data.len(),
                max: FrameConfig::MAX_FRAME_SIZE,
            });
        }
        if request.id == 0 {
            request.id = self.next_id();
        }
        request.data_size = Some(data.len() as u64);
        self.send(&Request::ConvertBuffer(request))?;

        // The worker now treats the next frame as the document.
        if let Err(e) = self.send_frame(data) {
            self.abandon();
            return Err(e);
        }

        let reply = match self.read_response()? {
            Response::BufferResult(reply) => reply,
            other => return Err(unexpected("buffer_result", &other)),
        };
        if !reply.success {
            return Ok(BufferConversion { reply, pdf: None });
        }

        let pdf = self.read_payload()?;
        if reply.data_size != Some(pdf.len() as u64) {
            warn!(
                "Worker announced {:?} PDF bytes but sent {}",
                reply.data_size,
                pdf.len()
            );
        }
        Ok(BufferConversion {
            reply,
            pdf: Some(pdf),
        })
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        debug!("Sending {} to worker {}", request.kind(), self.pid());
        let payload = request.encode()?;
        self.send_frame(&payload)
    }

    /// Write one raw frame to the worker.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.exited());
        };
        match write_frame(stdin, payload) {
            Ok(()) => Ok(()),
            Err(WorkerError::Io {
                source: Some(e), ..
            }) if e.kind() == ErrorKind::BrokenPipe => Err(self.exited()),
            Err(e) => {
                if e.is_fatal() {
                    self.abandon();
                }
                Err(e)
            }
        }
    }

    fn read_payload(&mut self) -> Result<Vec<u8>> {
        let frame = match self.frames.recv_timeout(self.conversion_timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Worker {} did not answer within {:?}, killing it",
                    self.pid(),
                    self.conversion_timeout
                );
                self.abandon();
                return Err(WorkerError::Timeout(self.conversion_timeout));
            }
            Err(RecvTimeoutError::Disconnected) => Ok(FrameRead::EndOfStream),
        };

        match frame {
            Ok(FrameRead::Frame(payload)) => Ok(payload),
            Ok(FrameRead::EndOfStream) => Err(self.exited()),
            Ok(FrameRead::Oversized(len)) => {
                self.abandon();
                Err(WorkerError::Protocol(format!(
                    "worker sent a frame of {} bytes",
                    len
                )))
            }
            Err(e) => {
                self.abandon();
                Err(e)
            }
        }
    }

    /// Read and decode the next control frame.
    pub fn read_response(&mut self) -> Result<Response> {
        let payload = self.read_payload()?;
        let response = Response::decode(&payload)?;
        if let Response::Error { message } = &response {
            debug!("Worker {} reported: {}", self.pid(), message);
        }
        Ok(response)
    }

    /// Report the worker as gone and make sure it is.
    fn exited(&mut self) -> WorkerError {
        let status = self
            .child
            .try_wait()
            .ok()
            .flatten()
            .and_then(|status| status.code());
        self.abandon();
        WorkerError::WorkerExited { status }
    }

    /// Kill the worker without a handshake. Later calls fail fast.
    fn abandon(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.stdin = None;
        if let Err(e) = self.child.kill() {
            debug!("kill worker {}: {}", self.pid(), e);
        }
        let _ = self.child.wait();
    }

    /// Ask the worker to quit and wait for it.
    pub fn shutdown(&mut self) -> Result<Option<i32>> {
        self.shutdown_within(ClientConfig::SHUTDOWN_TIMEOUT)
    }

    /// Like [`shutdown`](Self::shutdown) with a custom grace period. The
    /// process is killed once `timeout` elapses.
    pub fn shutdown_within(&mut self, timeout: Duration) -> Result<Option<i32>> {
        self.finished = true;

        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = Request::Quit
                .encode()
                .and_then(|quit| write_frame(&mut stdin, &quit))
            {
                debug!("quit not delivered to worker {}: {}", self.pid(), e);
            }
            // Closing stdin is an end-of-input for the worker either way.
            drop(stdin);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("Worker {} exited with {}", self.pid(), status);
                return Ok(status.code());
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(ClientConfig::SHUTDOWN_POLL_INTERVAL);
        }

        warn!(
            "Worker {} did not exit within {:?}, killing it",
            self.pid(),
            timeout
        );
        self.child.kill()?;
        self.child.wait()?;
        Err(WorkerError::Timeout(timeout))
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.shutdown();
        }
    }
}

fn unexpected(expected: &str, got: &Response) -> WorkerError {
    let got = match got {
        Response::Ready { .. } => "ready".to_string(),
        Response::Error { message } => format!("error ({})", message),
        Response::Result(_) => "result".to_string(),
        Response::BufferResult(_) => "buffer_result".to_string(),
    };
    WorkerError::Protocol(format!("expected {}, worker sent {}", expected, got))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HostOs;

    #[test]
    fn test_launch_config_builder() {
        let config = WorkerLaunchConfig::new("/opt/slimlo/program/slimlo-worker", "/opt/slimlo")
            .with_font_paths(["/fonts/a", "/fonts/b"])
            .with_inherited_stderr(true)
            .with_env("SLIMLO_LOG", "debug")
            .with_conversion_timeout(Duration::from_secs(30));

        assert!(config.inherit_stderr);
        assert_eq!(config.conversion_timeout, Duration::from_secs(30));
        assert_eq!(config.env_vars, vec![("SLIMLO_LOG".into(), "debug".into())]);
        assert_eq!(
            config.init_request(),
            Request::Init(InitRequest {
                resource_path: Some("/opt/slimlo".into()),
                font_paths: vec!["/fonts/a".into(), "/fonts/b".into()],
            })
        );
    }

    #[test]
    fn test_default_conversion_timeout() {
        let config = WorkerLaunchConfig::new("slimlo-worker", "/opt/slimlo");
        assert_eq!(config.conversion_timeout, ClientConfig::CONVERSION_TIMEOUT);
    }

    #[test]
    fn test_spawn_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerLaunchConfig::new(dir.path().join("absent"), dir.path());
        match WorkerClient::spawn(&config) {
            Err(WorkerError::ExecutableNotFound(path)) => {
                assert_eq!(path, dir.path().join("absent"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[test]
    fn test_locate_worker_in_program_dir() {
        if std::env::var_os(WORKER_PATH_ENV).is_some() {
            return;
        }
        let profile = PlatformProfile::for_os(HostOs::Linux);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("program")).unwrap();
        let worker = dir.path().join("program").join("slimlo-worker");
        std::fs::write(&worker, b"").unwrap();

        assert_eq!(locate_worker(Some(dir.path()), &profile).unwrap(), worker);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            locate_worker(Some(empty.path()), &profile),
            Err(WorkerError::ExecutableNotFound(_))
        ));
    }

    #[test]
    fn test_unexpected_response_message() {
        let err = unexpected("result", &Response::error("Invalid JSON message"));
        assert_eq!(
            err.to_string(),
            "Protocol error: expected result, worker sent error (Invalid JSON message)"
        );
    }
}
