//! Wire format encoding and decoding.
//!
//! Implements the STOMP text framing:
//! ```text
//! COMMAND\n
//! key:value\n        (zero or more)
//! \n
//! body\0             (body optional, NUL always present on output)
//! ```
//!
//! A payload consisting of a single line feed is the heartbeat marker and is
//! never parsed as a frame.

use bytes::{BufMut, Bytes, BytesMut};

use super::Frame;
use crate::error::ParseError;

/// Heartbeat marker (single line feed).
pub const HEARTBEAT: &[u8] = b"\n";

/// Frame terminator.
pub const NUL: u8 = 0;

/// Default maximum frame size accepted from stream transports (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Header names used by the broker.
pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const ID: &str = "id";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SERVER: &str = "server";
    pub const SESSION: &str = "session";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const VERSION: &str = "version";
}

/// Check if a raw payload is the heartbeat marker.
///
/// Accepts a bare LF and the CRLF variant some clients send.
#[inline]
pub fn is_heartbeat(raw: &[u8]) -> bool {
    raw == HEARTBEAT || raw == b"\r\n"
}

/// Parse one complete frame.
///
/// # Example
///
/// ```
/// use stomp_broker::protocol::parse;
///
/// let frame = parse(b"SEND\ndestination:/topic/a\n\nhello\0").unwrap();
/// assert_eq!(frame.command, "SEND");
/// assert_eq!(frame.get_header("destination"), Some("/topic/a"));
/// assert_eq!(frame.body(), Some(&b"hello"[..]));
/// ```
pub fn parse(raw: &[u8]) -> Result<Frame, ParseError> {
    // Leading EOLs are heartbeats glued to the frame
    let start = raw
        .iter()
        .position(|&b| b != b'\n' && b != b'\r')
        .ok_or(ParseError::Empty)?;
    let raw = &raw[start..];

    let eol = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(ParseError::UnterminatedCommand)?;
    let command = std::str::from_utf8(strip_cr(&raw[..eol]))
        .map_err(|_| ParseError::InvalidUtf8)?
        .trim();
    if command.is_empty() {
        return Err(ParseError::MissingCommand);
    }

    let mut frame = Frame::with_command(command);
    let mut pos = eol + 1;

    loop {
        let rest = &raw[pos..];
        let nl = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ParseError::UnterminatedHeaders)?;
        let line = strip_cr(&rest[..nl]);
        pos += nl + 1;

        if line.is_empty() {
            break;
        }

        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
        if let Some((key, value)) = line.split_once(':') {
            // STOMP 1.2: the first occurrence of a repeated header wins
            frame.headers.insert_if_absent(key.trim(), value.trim());
        }
    }

    let remaining = &raw[pos..];
    let body = match frame.get_header(header::CONTENT_LENGTH) {
        Some(value) => {
            let declared: usize = value
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?;
            frame.binary = true;
            if declared <= remaining.len() {
                &remaining[..declared]
            } else {
                until_nul(remaining)
            }
        }
        None => until_nul(remaining),
    };

    if !body.is_empty() {
        frame.body = Some(Bytes::copy_from_slice(body));
    }

    Ok(frame)
}

/// Serialize a frame to its wire representation.
///
/// Binary frames (and text frames whose body is not valid UTF-8) are built
/// as head bytes + raw body + NUL so the payload is never reinterpreted.
///
/// # Example
///
/// ```
/// use stomp_broker::protocol::{serialize, Command, Frame};
///
/// let frame = Frame::new(Command::Receipt).header("receipt-id", "77");
/// assert_eq!(&serialize(&frame)[..], b"RECEIPT\nreceipt-id:77\n\n\0");
/// ```
pub fn serialize(frame: &Frame) -> Bytes {
    let mut head = String::with_capacity(64);
    head.push_str(&frame.command);
    head.push('\n');
    for (key, value) in frame.headers.iter() {
        head.push_str(key);
        head.push(':');
        head.push_str(value);
        head.push('\n');
    }
    head.push('\n');

    match &frame.body {
        Some(body) if frame.binary || std::str::from_utf8(body).is_err() => {
            let mut buf = BytesMut::with_capacity(head.len() + body.len() + 1);
            buf.put_slice(head.as_bytes());
            buf.put_slice(body);
            buf.put_u8(NUL);
            buf.freeze()
        }
        Some(body) => {
            // Checked above
            let text = std::str::from_utf8(body).unwrap_or_default();
            head.push_str(text);
            head.push('\0');
            Bytes::from(head)
        }
        None => {
            head.push('\0');
            Bytes::from(head)
        }
    }
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[inline]
fn until_nul(data: &[u8]) -> &[u8] {
    match data.iter().position(|&b| b == NUL) {
        Some(end) => &data[..end],
        None => data,
    }
}
