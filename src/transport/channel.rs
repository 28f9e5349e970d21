//! Channel-backed connection.
//!
//! Outbound payloads are pushed into a bounded mpsc channel that a writer
//! task (or a test) drains. Sending never blocks: when the channel is full
//! the payload is dropped with a warning, the same way a slow consumer is
//! treated in fan-out.
//!
//! ```text
//! Broker ─► ChannelConnection ─► mpsc::Sender<Outbound> ─► Writer Task ─► Socket
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Connection, ReadyState};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// An item queued for the transport writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes to write.
    Data(Bytes),
    /// Close the connection after everything queued before it.
    Close,
}

/// Connection whose outbound side is an mpsc channel.
#[derive(Debug)]
pub struct ChannelConnection {
    tx: mpsc::Sender<Outbound>,
    state: AtomicU8,
    dropped: AtomicU64,
}

impl ChannelConnection {
    /// Create a connection with the default channel capacity.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a connection with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(Self {
            tx,
            state: AtomicU8::new(ReadyState::Open.to_u8()),
            dropped: AtomicU64::new(0),
        });
        (conn, rx)
    }

    /// Mark the connection closed (called by the transport once the socket is gone).
    pub fn mark_closed(&self) {
        self.state
            .store(ReadyState::Closed.to_u8(), Ordering::Release);
    }

    /// Number of payloads dropped because the channel was full.
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Connection for ChannelConnection {
    fn send(&self, payload: Bytes) {
        if !self.is_open() {
            return;
        }
        match self.tx.try_send(Outbound::Data(payload)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped = total, "outbound channel full, dropping payload");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => self.mark_closed(),
        }
    }

    fn close(&self) {
        let swapped = self.state.compare_exchange(
            ReadyState::Open.to_u8(),
            ReadyState::Closing.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if swapped.is_ok() && self.tx.try_send(Outbound::Close).is_err() {
            // Writer is gone or saturated; nothing more will be written
            self.mark_closed();
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }
}
