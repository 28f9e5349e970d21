//! Middleware module - per-command interceptor chains.
//!
//! Each client command that changes broker state (connect, disconnect,
//! send, subscribe, unsubscribe) runs through its own chain before the
//! broker acts on it. Interceptors can inspect and rewrite the arguments or
//! reject the command outright; a rejected command turns into an ERROR
//! frame for the originating connection.

mod chain;
mod registry;

pub use chain::{middleware, run_chain, Middleware, Next, SessionContext, Verdict};
pub use registry::MiddlewareRegistry;

use std::fmt;
use std::str::FromStr;

use crate::protocol::{Frame, Headers};
use crate::subscription::Subscription;

/// Commands that carry an interceptor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewareCommand {
    Connect,
    Disconnect,
    Send,
    Subscribe,
    Unsubscribe,
}

impl MiddlewareCommand {
    /// All chain-carrying commands.
    pub const ALL: [MiddlewareCommand; 5] = [
        MiddlewareCommand::Connect,
        MiddlewareCommand::Disconnect,
        MiddlewareCommand::Send,
        MiddlewareCommand::Subscribe,
        MiddlewareCommand::Unsubscribe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MiddlewareCommand::Connect => "connect",
            MiddlewareCommand::Disconnect => "disconnect",
            MiddlewareCommand::Send => "send",
            MiddlewareCommand::Subscribe => "subscribe",
            MiddlewareCommand::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for MiddlewareCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MiddlewareCommand {
    type Err = crate::error::BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connect" | "stomp" => Ok(MiddlewareCommand::Connect),
            "disconnect" => Ok(MiddlewareCommand::Disconnect),
            "send" => Ok(MiddlewareCommand::Send),
            "subscribe" => Ok(MiddlewareCommand::Subscribe),
            "unsubscribe" => Ok(MiddlewareCommand::Unsubscribe),
            _ => Err(crate::error::BrokerError::CommandNotFound(s.to_string())),
        }
    }
}

/// Arguments an interceptor sees and may rewrite.
#[derive(Debug, Clone)]
pub enum CommandArgs {
    /// CONNECT: the client's heart-beat pair and all frame headers.
    Connect {
        heartbeat: (u64, u64),
        headers: Headers,
    },
    /// DISCONNECT: requested receipt id, if any.
    Disconnect {
        receipt: Option<String>,
        headers: Headers,
    },
    /// SEND: resolved destination and the outgoing frame (headers merged, body encoded).
    Send { destination: String, frame: Frame },
    /// SUBSCRIBE: the subscription about to be registered.
    Subscribe { subscription: Subscription },
    /// UNSUBSCRIBE: subscription id to remove.
    Unsubscribe { id: String },
}

impl CommandArgs {
    /// Chain these arguments belong to.
    pub fn command(&self) -> MiddlewareCommand {
        match self {
            CommandArgs::Connect { .. } => MiddlewareCommand::Connect,
            CommandArgs::Disconnect { .. } => MiddlewareCommand::Disconnect,
            CommandArgs::Send { .. } => MiddlewareCommand::Send,
            CommandArgs::Subscribe { .. } => MiddlewareCommand::Subscribe,
            CommandArgs::Unsubscribe { .. } => MiddlewareCommand::Unsubscribe,
        }
    }
}
