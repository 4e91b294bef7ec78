//! Integration tests for the slimlo-worker binary.
//!
//! These drive the built executable over real pipes and check framing,
//! lifecycle and exit status. Without the `native` feature every `init`
//! fails, which still exercises the full protocol surface.

use serde_json::{json, Value};
use slimlo_core::config::FrameConfig;
use slimlo_core::ipc::frame::{read_frame, write_frame, FrameRead};
use slimlo_core::ipc::protocol::{ConvertBufferRequest, ConvertRequest};
use slimlo_core::{DocumentFormat, ErrorCode, WorkerClient, WorkerError, WorkerLaunchConfig};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

fn worker_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_slimlo-worker"))
}

fn frame(value: Value) -> Vec<u8> {
    let payload = serde_json::to_vec(&value).unwrap();
    raw_frame(&payload)
}

fn raw_frame(bytes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_frame(&mut buf, bytes).unwrap();
    buf
}

/// Run the worker with `input` on stdin (closed afterwards).
fn run_worker(args: &[&str], input: &[u8]) -> Output {
    let mut child = Command::new(worker_path())
        .args(args)
        .env("SLIMLO_LOG", "debug")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn worker");

    {
        let mut stdin = child.stdin.take().unwrap();
        // The worker may exit before consuming everything.
        let _ = stdin.write_all(input);
    }
    child.wait_with_output().expect("Failed to wait for worker")
}

fn responses(stdout: &[u8]) -> Vec<Value> {
    let mut cursor = Cursor::new(stdout);
    let mut out = Vec::new();
    loop {
        let payload = match read_frame(&mut cursor, FrameConfig::MAX_FRAME_SIZE).unwrap() {
            FrameRead::Frame(payload) => payload,
            _ => return out,
        };
        out.push(serde_json::from_slice(&payload).expect("response is JSON"));
    }
}

#[test]
fn test_quit_exits_cleanly() {
    let output = run_worker(&[], &frame(json!({ "type": "quit" })));
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_end_of_input_exits_cleanly() {
    let output = run_worker(&[], &[]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_truncated_frame_is_end_of_input() {
    let output = run_worker(&[], &[0x10, 0x00, 0x00, 0x00, b'{']);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_convert_before_init_reports_not_initialized() {
    let mut input = frame(json!({
        "type": "convert",
        "id": 42,
        "input": "/nonexistent.docx",
        "output": "/nonexistent.pdf"
    }));
    input.extend(frame(json!({
        "type": "convert_buffer",
        "id": 43,
        "format": 1,
        "data_size": 3
    })));
    input.extend(raw_frame(b"doc"));
    input.extend(frame(json!({ "type": "quit" })));

    let output = run_worker(&[], &input);
    assert!(output.status.success());

    let responses = responses(&output.stdout);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["type"], "result");
    assert_eq!(responses[0]["id"], 42);
    assert_eq!(responses[0]["success"], false);
    assert_eq!(responses[0]["error_code"], 9);
    assert_eq!(responses[0]["diagnostics"], json!([]));
    assert_eq!(responses[1]["type"], "buffer_result");
    assert_eq!(responses[1]["id"], 43);
    assert_eq!(responses[1]["error_code"], 9);
}

#[test]
fn test_malformed_and_unknown_messages() {
    let mut input = raw_frame(b"this is not json");
    input.extend(frame(json!({ "type": "status" })));
    input.extend(frame(json!({ "id": 1 })));
    input.extend(frame(json!({ "type": "quit" })));

    let output = run_worker(&[], &input);
    assert!(output.status.success());

    let responses = responses(&output.stdout);
    assert_eq!(
        responses,
        vec![json!({ "type": "error", "message": "Invalid JSON message" })]
    );
}

#[cfg(not(feature = "native"))]
#[test]
fn test_init_without_engine_reports_error_and_continues() {
    let mut input = frame(json!({ "type": "init", "resource_path": "/opt/slimlo" }));
    input.extend(frame(json!({ "type": "init" })));
    input.extend(frame(json!({ "type": "quit" })));

    let output = run_worker(&[], &input);
    assert!(output.status.success());

    let responses = responses(&output.stdout);
    assert_eq!(
        responses,
        vec![
            json!({
                "type": "error",
                "message": "native engine support not compiled in"
            }),
            json!({
                "type": "error",
                "message": "Missing resource_path in init message"
            }),
        ]
    );
}

#[test]
fn test_oversized_frame_ends_worker() {
    let declared = FrameConfig::MAX_FRAME_SIZE as u32 + 1;
    let mut input = declared.to_le_bytes().to_vec();
    input.extend_from_slice(b"garbage");

    let output = run_worker(&[], &input);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_max_frame_size_flag() {
    let input = frame(json!({
        "type": "convert",
        "id": 1,
        "input": "/a",
        "output": "/b"
    }));
    let output = run_worker(&["--max-frame-size", "16"], &input);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_json_logs_stay_on_stderr() {
    let mut input = raw_frame(b"{");
    input.extend(frame(json!({ "type": "quit" })));
    let output = run_worker(&["--log-format", "json"], &input);
    assert!(output.status.success());

    assert_eq!(responses(&output.stdout).len(), 1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first = stderr.lines().next().expect("worker logged something");
    let log: Value = serde_json::from_str(first).expect("log line is JSON");
    assert!(log.get("level").is_some());
}

#[test]
fn test_client_drives_worker_lifecycle() {
    let resources = tempfile::tempdir().unwrap();
    let config = WorkerLaunchConfig::new(worker_path(), resources.path());

    let mut client = WorkerClient::spawn(&config).expect("spawn worker");
    assert!(client.is_alive());
    assert!(client.pid() > 0);

    #[cfg(not(feature = "native"))]
    {
        let init = slimlo_core::ipc::protocol::Request::Init(
            slimlo_core::ipc::protocol::InitRequest {
                resource_path: Some(resources.path().to_string_lossy().into_owned()),
                font_paths: vec![resources.path().to_string_lossy().into_owned()],
            },
        );
        match client.initialize(init) {
            Err(WorkerError::InitFailed(message)) => {
                assert_eq!(message, "native engine support not compiled in")
            }
            other => panic!("unexpected init outcome: {:?}", other.map(|_| ())),
        }

        let reply = client
            .convert(ConvertRequest {
                input: Some("/in.docx".into()),
                output: Some("/out.pdf".into()),
                ..Default::default()
            })
            .expect("worker replies");
        assert!(!reply.success);
        assert_eq!(reply.id, 1);
        assert_eq!(reply.error_code, Some(ErrorCode::NotInitialized));
    }

    let status = client
        .shutdown_within(Duration::from_secs(10))
        .expect("worker exits on quit");
    assert_eq!(status, Some(0));
    assert!(!client.is_alive());
}

#[test]
fn test_client_reports_missing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerLaunchConfig::new(dir.path().join("missing-worker"), dir.path());
    assert!(matches!(
        WorkerClient::launch(&config),
        Err(WorkerError::ExecutableNotFound(_))
    ));
}

#[test]
fn test_oversized_document_is_refused_before_sending() {
    let resources = tempfile::tempdir().unwrap();
    let config = WorkerLaunchConfig::new(worker_path(), resources.path());
    let mut client = WorkerClient::spawn(&config).expect("spawn worker");

    let document = vec![0u8; FrameConfig::MAX_FRAME_SIZE + 1];
    let request = ConvertBufferRequest {
        format: DocumentFormat::Docx,
        ..Default::default()
    };
    match client.convert_buffer(request, &document) {
        Err(WorkerError::FrameTooLarge { size, max }) => {
            assert_eq!(size, FrameConfig::MAX_FRAME_SIZE + 1);
            assert_eq!(max, FrameConfig::MAX_FRAME_SIZE);
        }
        other => panic!("unexpected outcome: {:?}", other.map(|c| c.reply)),
    }
    assert!(client.is_alive());

    // The worker saw nothing, so the next request gets its own reply.
    let reply = client
        .convert(ConvertRequest {
            input: Some("/in.docx".into()),
            output: Some("/out.pdf".into()),
            ..Default::default()
        })
        .expect("worker replies");
    assert_eq!(reply.id, 1);
    assert_eq!(reply.error_code, Some(ErrorCode::NotInitialized));

    let status = client
        .shutdown_within(Duration::from_secs(10))
        .expect("worker exits on quit");
    assert_eq!(status, Some(0));
}

/// Reads stdin until it closes and never writes a frame.
#[cfg(unix)]
fn silent_worker() -> Option<PathBuf> {
    ["/usr/bin/tail", "/bin/tail"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

#[cfg(unix)]
#[test]
fn test_unanswered_conversion_times_out_and_kills_worker() {
    let Some(executable) = silent_worker() else {
        return;
    };
    let resources = tempfile::tempdir().unwrap();
    let timeout = Duration::from_millis(300);
    let config = WorkerLaunchConfig::new(executable, resources.path())
        .with_conversion_timeout(timeout);
    let mut client = WorkerClient::spawn(&config).expect("spawn silent worker");

    let started = Instant::now();
    let result = client.convert(ConvertRequest {
        input: Some("/in.docx".into()),
        output: Some("/out.pdf".into()),
        ..Default::default()
    });
    match result {
        Err(WorkerError::Timeout(waited)) => assert_eq!(waited, timeout),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(!client.is_alive());

    // A killed worker is never asked again.
    let again = client.convert(ConvertRequest::default());
    assert!(matches!(again, Err(WorkerError::WorkerExited { .. })));
}
