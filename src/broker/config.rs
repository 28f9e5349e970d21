//! Broker configuration and builder.
//!
//! [`BrokerConfig`] can be assembled in code with [`BrokerBuilder`] or loaded
//! from JSON; missing fields take their defaults.
//!
//! ```
//! use stomp_broker::BrokerConfig;
//!
//! let config = BrokerConfig::from_json_str(r#"{"heartbeat": [0, 5000], "path": "/ws"}"#).unwrap();
//! assert_eq!(config.heartbeat, (0, 5000));
//! assert_eq!(config.path, "/ws");
//! assert_eq!(config.protocol_version, "1.1");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Broker;
use crate::error::Result;
use crate::heartbeat::DEFAULT_ERROR_MARGIN;
use crate::middleware::{Middleware, MiddlewareCommand};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default `server` header value.
pub const DEFAULT_SERVER_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default heartbeat capability `(server-send, server-receive)` in milliseconds.
pub const DEFAULT_HEARTBEAT: (u64, u64) = (10_000, 10_000);

/// Default STOMP protocol version announced in CONNECTED.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.1";

/// Default endpoint path.
pub const DEFAULT_PATH: &str = "/stomp";

/// Default lifecycle event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Value of the `server` header in CONNECTED.
    pub server_name: String,
    /// Heartbeat capability `(sx, sy)`: how often the broker can send, and
    /// how often it wants to receive, in milliseconds. 0 disables a direction.
    pub heartbeat: (u64, u64),
    /// Grace period added to the interval before a silent client is closed.
    pub heartbeat_error_margin_ms: u64,
    /// Value of the `version` header in CONNECTED.
    pub protocol_version: String,
    /// Endpoint path for hosts that mount the broker behind a URL (for
    /// example a WebSocket upgrade route). Reported in `serve_tcp` logs.
    pub path: String,
    /// Largest frame accepted by stream transports.
    pub max_frame_size: usize,
    /// Answer unparsable frames with ERROR instead of dropping them.
    pub error_on_parse_failure: bool,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            heartbeat: DEFAULT_HEARTBEAT,
            heartbeat_error_margin_ms: DEFAULT_ERROR_MARGIN.as_millis() as u64,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            path: DEFAULT_PATH.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            error_on_parse_failure: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl BrokerConfig {
    /// Load a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the document is malformed or a field has the
    /// wrong type.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[inline]
    pub fn heartbeat_error_margin(&self) -> Duration {
        Duration::from_millis(self.heartbeat_error_margin_ms)
    }
}

/// Builder for creating a [`Broker`] with a fluent API.
///
/// # Example
///
/// ```
/// use stomp_broker::middleware::{middleware, MiddlewareCommand};
/// use stomp_broker::Broker;
///
/// let broker = Broker::builder()
///     .server_name("edge-1")
///     .heartbeat(0, 5000)
///     .middleware(
///         MiddlewareCommand::Subscribe,
///         middleware(|_ctx, args, next| next.proceed(args)),
///     )
///     .build();
///
/// assert_eq!(broker.config().server_name, "edge-1");
/// ```
#[derive(Default)]
pub struct BrokerBuilder {
    config: BrokerConfig,
    middleware: Vec<(MiddlewareCommand, Middleware)>,
}

impl BrokerBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: BrokerConfig) -> Self {
        Self {
            config,
            middleware: Vec::new(),
        }
    }

    /// Set the `server` header value.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Set the heartbeat capability `(send, receive)` in milliseconds.
    pub fn heartbeat(mut self, send_ms: u64, receive_ms: u64) -> Self {
        self.config.heartbeat = (send_ms, receive_ms);
        self
    }

    /// Set the grace period before a silent client is closed.
    pub fn heartbeat_error_margin(mut self, margin: Duration) -> Self {
        self.config.heartbeat_error_margin_ms = margin.as_millis() as u64;
        self
    }

    /// Set the announced protocol version.
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.config.protocol_version = version.into();
        self
    }

    /// Set the endpoint path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the largest frame stream transports accept.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Choose between ERROR replies and silent drops for unparsable frames.
    pub fn error_on_parse_failure(mut self, enabled: bool) -> Self {
        self.config.error_on_parse_failure = enabled;
        self
    }

    /// Set the lifecycle event channel capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Append an interceptor to a command's chain.
    pub fn middleware(mut self, command: MiddlewareCommand, handler: Middleware) -> Self {
        self.middleware.push((command, handler));
        self
    }

    /// Build the broker.
    pub fn build(self) -> Broker {
        let broker = Broker::new(self.config);
        for (command, handler) in self.middleware {
            broker.add_middleware(command, handler);
        }
        broker
    }
}
