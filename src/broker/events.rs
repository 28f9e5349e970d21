//! Broker lifecycle events.
//!
//! Events are published on a `tokio::sync::broadcast` channel. Publishing
//! never blocks; a receiver that falls behind sees `RecvError::Lagged`.

use crate::protocol::{Frame, Headers};
use crate::subscription::Subscription;

/// A lifecycle event of a broker.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A transport connection was attached.
    Connecting { session_id: String },
    /// The CONNECT handshake completed.
    Connected { session_id: String, headers: Headers },
    /// A session was torn down.
    Disconnected { session_id: String },
    /// A subscription was registered.
    Subscribe(Subscription),
    /// A subscription was removed.
    Unsubscribe(Subscription),
    /// A message was fanned out to `destination`.
    Send { destination: String, frame: Frame },
    /// A command failed, or the transport reported an error.
    Error {
        session_id: Option<String>,
        message: String,
    },
}

impl BrokerEvent {
    /// Short name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            BrokerEvent::Connecting { .. } => "connecting",
            BrokerEvent::Connected { .. } => "connected",
            BrokerEvent::Disconnected { .. } => "disconnected",
            BrokerEvent::Subscribe(_) => "subscribe",
            BrokerEvent::Unsubscribe(_) => "unsubscribe",
            BrokerEvent::Send { .. } => "send",
            BrokerEvent::Error { .. } => "error",
        }
    }

    /// Session the event concerns, when there is one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            BrokerEvent::Connecting { session_id }
            | BrokerEvent::Connected { session_id, .. }
            | BrokerEvent::Disconnected { session_id } => Some(session_id),
            BrokerEvent::Subscribe(sub) | BrokerEvent::Unsubscribe(sub) => Some(&sub.session_id),
            BrokerEvent::Send { .. } => None,
            BrokerEvent::Error { session_id, .. } => session_id.as_deref(),
        }
    }
}
