//! Transport module - the connection capability the broker consumes.
//!
//! The broker never owns sockets. Each transport connection is handed to
//! [`Broker::open`](crate::Broker::open) as an `Arc<dyn Connection>`; the
//! transport then forwards inbound bytes with
//! [`Broker::receive`](crate::Broker::receive) and reports closure with
//! [`Broker::close`](crate::Broker::close).
//!
//! Provided adapters:
//! - [`ChannelConnection`] - outbound payloads go to a bounded mpsc channel
//! - [`serve_stream`] / [`serve_tcp`] - run a STOMP connection over any
//!   `AsyncRead + AsyncWrite` stream

mod channel;
mod stream;

pub use channel::{ChannelConnection, Outbound, DEFAULT_CHANNEL_CAPACITY};
pub use stream::{serve_stream, serve_tcp};

use bytes::Bytes;

/// Connection state as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Payloads can be sent.
    Open,
    /// Close was requested but has not completed.
    Closing,
    /// The connection is gone.
    Closed,
}

impl ReadyState {
    #[inline]
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ReadyState::Open => 0,
            ReadyState::Closing => 1,
            ReadyState::Closed => 2,
        }
    }

    #[inline]
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Open,
            1 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Capability exposed by one transport connection.
///
/// `send` and `close` are fire-and-forget: the broker never waits for them
/// and may call them from any thread. Implementations must not call back
/// into the broker synchronously from `close`.
pub trait Connection: Send + Sync + 'static {
    /// Queue a raw payload (a serialized frame or the heartbeat marker).
    fn send(&self, payload: Bytes);

    /// Request the connection be closed.
    fn close(&self);

    /// Current state.
    fn ready_state(&self) -> ReadyState;

    /// Check if payloads can still be sent.
    #[inline]
    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}
