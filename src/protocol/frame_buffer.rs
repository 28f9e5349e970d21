//! Frame buffer for accumulating partial reads.
//!
//! Stream transports (TCP, pipes) carry no message boundaries, so frames
//! arrive fragmented or glued together. The buffer uses a small state
//! machine:
//! - `WaitingForHead`: need the command line and header block
//! - `WaitingForBody`: head parsed, body is either `content-length` bytes
//!   followed by NUL, or everything up to the next NUL
//!
//! Line feeds seen between frames are yielded as heartbeat items.
//!
//! # Example
//!
//! ```
//! use stomp_broker::protocol::{FrameBuffer, StreamItem};
//!
//! let mut buffer = FrameBuffer::new();
//! let items = buffer.push(b"\nSEND\ndestination:/topic/a\n\nhi\0").unwrap();
//!
//! assert_eq!(items.len(), 2);
//! assert!(matches!(items[0], StreamItem::Heartbeat));
//! assert!(matches!(items[1], StreamItem::Frame(_)));
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{header, DEFAULT_MAX_FRAME_SIZE, NUL};
use crate::error::{BrokerError, ParseError, Result};

/// One complete unit extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A heartbeat EOL between frames.
    Heartbeat,
    /// Raw bytes of one frame, including its NUL terminator.
    Frame(Bytes),
}

/// State machine for frame extraction.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the blank line ending the header block.
    WaitingForHead,
    /// Head complete at `body_start`; body length known if declared.
    WaitingForBody {
        body_start: usize,
        content_length: Option<usize>,
    },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed size of a single frame.
    max_frame_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 16MB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHead,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete items.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::FrameTooLarge`] if a frame grows past the
    /// limit, or a parse error for an unreadable `content-length`.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<StreamItem>> {
        self.buffer.extend_from_slice(data);

        let mut items = Vec::new();
        while let Some(item) = self.try_extract_one()? {
            items.push(item);
        }

        Ok(items)
    }

    fn try_extract_one(&mut self) -> Result<Option<StreamItem>> {
        match self.state {
            State::WaitingForHead => {
                match self.buffer.first().copied() {
                    None => return Ok(None),
                    Some(b'\n') => {
                        let _ = self.buffer.split_to(1);
                        return Ok(Some(StreamItem::Heartbeat));
                    }
                    Some(b'\r') => {
                        if self.buffer.len() < 2 {
                            return Ok(None);
                        }
                        if self.buffer[1] == b'\n' {
                            let _ = self.buffer.split_to(2);
                            return Ok(Some(StreamItem::Heartbeat));
                        }
                    }
                    Some(_) => {}
                }

                let Some(body_start) = find_head_end(&self.buffer) else {
                    self.check_size(self.buffer.len())?;
                    return Ok(None);
                };

                let content_length = declared_content_length(&self.buffer[..body_start])?;
                self.state = State::WaitingForBody {
                    body_start,
                    content_length,
                };
                self.try_extract_one()
            }
            State::WaitingForBody {
                body_start,
                content_length,
            } => {
                let end = match content_length {
                    Some(len) => {
                        self.check_size(len)?;
                        let needed = body_start
                            .checked_add(len)
                            .and_then(|n| n.checked_add(1))
                            .ok_or(BrokerError::FrameTooLarge {
                                size: usize::MAX,
                                max: self.max_frame_size,
                            })?;
                        self.check_size(needed)?;
                        if self.buffer.len() < needed {
                            return Ok(None);
                        }
                        if self.buffer[needed - 1] != NUL {
                            return Err(ParseError::UnterminatedBody.into());
                        }
                        needed
                    }
                    None => match self.buffer[body_start..].iter().position(|&b| b == NUL) {
                        Some(offset) => body_start + offset + 1,
                        None => {
                            self.check_size(self.buffer.len())?;
                            return Ok(None);
                        }
                    },
                };

                let frame = self.buffer.split_to(end).freeze();
                self.state = State::WaitingForHead;
                Ok(Some(StreamItem::Frame(frame)))
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(BrokerError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    /// Check if the buffer holds no partial data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered data and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHead;
    }

    /// Current state name (for debugging).
    pub fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHead => "WaitingForHead",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset just past the blank line that ends the header block.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    let mut first_line = true;
    for (i, &b) in buf.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &buf[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() && !first_line {
            return Some(i + 1);
        }
        first_line = false;
        line_start = i + 1;
    }
    None
}

fn declared_content_length(head: &[u8]) -> Result<Option<usize>> {
    let head = String::from_utf8_lossy(head);
    // Skip the command line; first occurrence wins
    for line in head.lines().skip(1) {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == header::CONTENT_LENGTH {
                return value
                    .trim()
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| ParseError::InvalidContentLength(value.trim().to_string()).into());
            }
        }
    }
    Ok(None)
}
