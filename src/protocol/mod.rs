//! Protocol module - STOMP wire format, framing, and frame types.
//!
//! This module implements the text protocol spoken on every connection:
//! - Frame parse/serialize (`COMMAND\n(key:value\n)*\n(body)?\0`)
//! - Heartbeat marker detection (a single LF)
//! - Frame buffer for splitting byte streams into frames
//! - Frame struct with ordered headers

mod command;
mod frame;
mod frame_buffer;
mod wire_format;

pub use command::{Command, UnknownCommand};
pub use frame::{Frame, Headers};
pub use frame_buffer::{FrameBuffer, StreamItem};
pub use wire_format::{
    header, is_heartbeat, parse, serialize, DEFAULT_MAX_FRAME_SIZE, HEARTBEAT, NUL,
};
