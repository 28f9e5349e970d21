//! Per-connection session state.

use std::sync::Arc;

use crate::heartbeat::Heartbeat;
use crate::transport::Connection;

/// State the broker keeps for one transport connection.
pub(crate) struct Session {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) heartbeat: Heartbeat,
    /// Whether the CONNECT handshake completed.
    pub(crate) connected: bool,
}

impl Session {
    pub(crate) fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            heartbeat: Heartbeat::disabled(),
            connected: false,
        }
    }
}

/// Mint a session id.
pub(crate) fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
