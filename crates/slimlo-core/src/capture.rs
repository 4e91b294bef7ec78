//! Per-conversion capture of the process error stream.
//!
//! The engine writes its diagnostics straight to file descriptor 2, so the
//! only way to see them is to point fd 2 at a pipe for the duration of one
//! engine call:
//!
//! ```text
//! start()  ─ pipe(), save fd 2, dup2(pipe.write, 2)
//! <engine call>
//! stop()   ─ flush, dup2(saved, 2), close pipe.write
//! read()   ─ drain pipe.read up to the ceiling, close it
//! ```
//!
//! Both pipe ends are non-blocking. The reader side lets `read()` stop as
//! soon as the pipe is empty; the writer side makes engine writes past the
//! pipe capacity fail instead of blocking the only thread that could drain
//! them.

use std::io::{ErrorKind, Read};

/// Bracket for one engine call.
///
/// Implementations must leave the process error stream exactly as they found
/// it once `stop()` has returned.
pub trait Capture {
    /// Begin capturing. A failure leaves the error stream untouched.
    fn start(&mut self) -> std::io::Result<()>;

    /// Restore the error stream. Safe to call when not capturing.
    fn stop(&mut self) -> std::io::Result<()>;

    /// Everything captured since `start()`, bounded by the capture ceiling.
    /// Stops first if still capturing. Returns an empty buffer when idle.
    fn read(&mut self) -> Vec<u8>;
}

/// Capture that never redirects anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCapture;

impl Capture for NullCapture {
    fn start(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn read(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

/// Drain `reader` until it is empty, closed, or `limit` bytes were kept.
///
/// Errors (including `WouldBlock` from a non-blocking pipe) end the drain;
/// whatever was read so far is returned.
pub fn drain_bounded<R: Read + ?Sized>(reader: &mut R, limit: usize, chunk_size: usize) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];

    while captured.len() < limit {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let take = n.min(limit - captured.len());
                captured.extend_from_slice(&chunk[..take]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    captured
}

#[cfg(unix)]
pub use unix::StderrCapture;

#[cfg(unix)]
mod unix {
    use super::{drain_bounded, Capture};
    use crate::config::CaptureConfig;
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    use nix::unistd::{dup2, pipe};
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::{AsFd, AsRawFd, OwnedFd};

    struct ActiveCapture {
        /// Duplicate of the original fd 2.
        saved: OwnedFd,
        /// Dropped (closed) on stop so the reader sees end-of-file.
        writer: Option<OwnedFd>,
        reader: File,
    }

    /// Redirects the process-wide fd 2 into a bounded pipe.
    pub struct StderrCapture {
        limit: usize,
        active: Option<ActiveCapture>,
    }

    impl Default for StderrCapture {
        fn default() -> Self {
            Self::new(CaptureConfig::MAX_CAPTURE_BYTES)
        }
    }

    impl StderrCapture {
        pub fn new(limit: usize) -> Self {
            Self {
                limit,
                active: None,
            }
        }

        pub fn is_active(&self) -> bool {
            self.active.as_ref().is_some_and(|a| a.writer.is_some())
        }
    }

    fn set_nonblocking(fd: &OwnedFd) -> std::io::Result<()> {
        let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags))?;
        Ok(())
    }

    impl Capture for StderrCapture {
        fn start(&mut self) -> std::io::Result<()> {
            // A previous capture that was never read is discarded.
            if self.active.is_some() {
                self.stop()?;
                self.active = None;
            }

            let (read_end, write_end) = pipe()?;
            set_nonblocking(&read_end)?;
            set_nonblocking(&write_end)?;

            // Best effort: room for the whole ceiling so nothing is dropped
            // before it is reached.
            #[cfg(target_os = "linux")]
            {
                let size = libc::c_int::try_from(self.limit).unwrap_or(libc::c_int::MAX);
                let _ = fcntl(write_end.as_raw_fd(), FcntlArg::F_SETPIPE_SZ(size));
            }

            let saved = std::io::stderr().as_fd().try_clone_to_owned()?;
            let _ = std::io::stderr().flush();
            dup2(write_end.as_raw_fd(), libc::STDERR_FILENO)?;

            self.active = Some(ActiveCapture {
                saved,
                writer: Some(write_end),
                reader: File::from(read_end),
            });
            Ok(())
        }

        fn stop(&mut self) -> std::io::Result<()> {
            let Some(active) = self.active.as_mut() else {
                return Ok(());
            };
            let Some(writer) = active.writer.take() else {
                return Ok(());
            };

            let _ = std::io::stderr().flush();
            let restored = dup2(active.saved.as_raw_fd(), libc::STDERR_FILENO);
            drop(writer);
            restored?;
            Ok(())
        }

        fn read(&mut self) -> Vec<u8> {
            let _ = self.stop();
            let Some(mut active) = self.active.take() else {
                return Vec::new();
            };
            let chunk = CaptureConfig::READ_CHUNK_SIZE;
            drain_bounded(&mut active.reader, self.limit, chunk)
        }
    }

    impl Drop for StderrCapture {
        fn drop(&mut self) {
            let _ = self.stop();
        }
    }
}

/// Platforms without descriptor redirection run conversions uncaptured.
#[cfg(not(unix))]
#[derive(Debug, Default)]
pub struct StderrCapture(NullCapture);

#[cfg(not(unix))]
impl StderrCapture {
    pub fn new(_limit: usize) -> Self {
        Self(NullCapture)
    }

    pub fn is_active(&self) -> bool {
        false
    }
}

#[cfg(not(unix))]
impl Capture for StderrCapture {
    fn start(&mut self) -> std::io::Result<()> {
        self.0.start()
    }

    fn stop(&mut self) -> std::io::Result<()> {
        self.0.stop()
    }

    fn read(&mut self) -> Vec<u8> {
        self.0.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_drain_stops_at_limit() {
        let mut reader = Cursor::new(vec![b'x'; 10_000]);
        let captured = drain_bounded(&mut reader, 4096, 1000);
        assert_eq!(captured.len(), 4096);
    }

    #[test]
    fn test_drain_reads_everything_below_limit() {
        let mut reader = Cursor::new(b"warn:vcl:1:hello\n".to_vec());
        let captured = drain_bounded(&mut reader, 4096, 4);
        assert_eq!(captured, b"warn:vcl:1:hello\n");
    }

    struct WouldBlockAfter {
        data: Option<Vec<u8>>,
    }

    impl Read for WouldBlockAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                None => Err(std::io::Error::from(ErrorKind::WouldBlock)),
            }
        }
    }

    #[test]
    fn test_drain_stops_on_would_block() {
        let mut reader = WouldBlockAfter {
            data: Some(b"abc".to_vec()),
        };
        assert_eq!(drain_bounded(&mut reader, 100, 16), b"abc");
    }

    #[test]
    fn test_null_capture_is_empty() {
        let mut capture = NullCapture;
        capture.start().unwrap();
        capture.stop().unwrap();
        assert!(capture.read().is_empty());
    }

    #[test]
    fn test_idle_stderr_capture_reads_nothing() {
        let mut capture = StderrCapture::default();
        assert!(!capture.is_active());
        capture.stop().unwrap();
        assert!(capture.read().is_empty());
    }
}
