//! Length-prefixed framing over byte streams.
//!
//! ```text
//! [u32 LE: len][len bytes of payload]
//! ```
//!
//! The payload is UTF-8 JSON for control messages and raw bytes for the
//! document/PDF frames that follow a `convert_buffer` exchange.

use crate::config::FrameConfig;
use crate::{Result, WorkerError};
use std::io::{ErrorKind, Read, Write};

/// Outcome of reading one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// A complete payload.
    Frame(Vec<u8>),
    /// The peer closed the stream, cleanly or in the middle of a frame.
    EndOfStream,
    /// The header declared more than the allowed ceiling; nothing was read
    /// past the header.
    Oversized(u32),
}

/// Fill `buf` completely. Returns `false` if the stream ended first.
fn fill_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Read a length-prefixed frame.
///
/// A short read anywhere in the frame is reported as `EndOfStream`. A length
/// above `max_size` is reported as `Oversized` before any payload allocation.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R, max_size: usize) -> Result<FrameRead> {
    let mut len_buf = [0u8; FrameConfig::HEADER_LEN];
    if !fill_exact(reader, &mut len_buf)? {
        return Ok(FrameRead::EndOfStream);
    }

    let declared = u32::from_le_bytes(len_buf);
    let len = declared as usize;
    if len > max_size {
        return Ok(FrameRead::Oversized(declared));
    }

    let mut payload = vec![0u8; len];
    if !fill_exact(reader, &mut payload)? {
        return Ok(FrameRead::EndOfStream);
    }

    Ok(FrameRead::Frame(payload))
}

/// Write a length-prefixed frame and flush.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > FrameConfig::MAX_FRAME_SIZE {
        return Err(WorkerError::FrameTooLarge {
            size: payload.len(),
            max: FrameConfig::MAX_FRAME_SIZE,
        });
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}
