//! Stdio IPC between a supervisor and the worker.
//!
//! Both directions use the same framing ([`frame`]); control frames carry the
//! JSON messages defined in [`protocol`].

pub mod frame;
pub mod protocol;

pub use frame::{read_frame, write_frame, FrameRead};
pub use protocol::{
    BufferReply, ConversionReply, ConvertBufferRequest, ConvertRequest, Decoded, InitRequest,
    Request, Response,
};
