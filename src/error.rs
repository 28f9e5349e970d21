//! Error types for stomp-broker.

use thiserror::Error;

/// Errors produced while parsing a raw STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The payload was empty.
    #[error("empty frame")]
    Empty,

    /// The command line was not terminated by a line feed.
    #[error("command line is not terminated")]
    UnterminatedCommand,

    /// The command line was blank.
    #[error("missing command")]
    MissingCommand,

    /// The header block was not terminated by a blank line.
    #[error("header block is not terminated")]
    UnterminatedHeaders,

    /// A body of declared length was not followed by NUL.
    #[error("body is not terminated by NUL")]
    UnterminatedBody,

    /// The command or header block was not valid UTF-8.
    #[error("frame head is not valid UTF-8")]
    InvalidUtf8,

    /// The `content-length` header could not be parsed.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
}

/// Main error type for all broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed inbound frame.
    #[error("Protocol parse error: {0}")]
    Parse(#[from] ParseError),

    /// A `connect` interceptor rejected the handshake.
    #[error("Handshake rejected for session {0}")]
    HandshakeRejected(String),

    /// UNSUBSCRIBE for an id the session does not own.
    #[error("Subscription not found: {id}")]
    SubscriptionNotFound {
        /// Subscription id named by the client.
        id: String,
    },

    /// The SEND body was invalid or the `send` chain rejected it.
    #[error("Send rejected: {0}")]
    SendRejected(String),

    /// The client stopped sending heartbeats in client-drives mode.
    #[error("Heartbeat timeout for session {0}")]
    HeartbeatTimeout(String),

    /// The frame command is not one the broker handles.
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// A required header was missing from the frame.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// The session id is unknown to this broker.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// A subscribe or disconnect interceptor rejected the command.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// An inbound frame exceeded the configured size limit.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Bytes buffered for the frame so far.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Error reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on stream transports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using BrokerError.
pub type Result<T> = std::result::Result<T, BrokerError>;
