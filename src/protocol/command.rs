//! STOMP command verbs.

use std::fmt;
use std::str::FromStr;

/// A STOMP command handled or emitted by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// STOMP 1.1+ spelling of the client handshake.
    Stomp,
    /// Server handshake reply.
    Connected,
    /// Client is leaving.
    Disconnect,
    /// Register interest in a destination.
    Subscribe,
    /// Drop a subscription.
    Unsubscribe,
    /// Publish to a destination.
    Send,
    /// Delivery to a subscriber.
    Message,
    /// Acknowledges a client frame that carried a `receipt` header.
    Receipt,
    /// Something went wrong.
    Error,
}

impl Command {
    /// The wire spelling of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Disconnect => "DISCONNECT",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// Check if clients may send this command to the broker.
    #[inline]
    pub fn is_client_command(&self) -> bool {
        matches!(
            self,
            Command::Connect
                | Command::Stomp
                | Command::Disconnect
                | Command::Subscribe
                | Command::Unsubscribe
                | Command::Send
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a command string is not a known STOMP verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Command::Connect),
            "STOMP" => Ok(Command::Stomp),
            "CONNECTED" => Ok(Command::Connected),
            "DISCONNECT" => Ok(Command::Disconnect),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "SEND" => Ok(Command::Send),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        for cmd in [
            Command::Connect,
            Command::Stomp,
            Command::Connected,
            Command::Disconnect,
            Command::Subscribe,
            Command::Unsubscribe,
            Command::Send,
            Command::Message,
            Command::Receipt,
            Command::Error,
        ] {
            assert_eq!(cmd.as_str().parse::<Command>(), Ok(cmd));
        }
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            "BEGIN".parse::<Command>(),
            Err(UnknownCommand("BEGIN".to_string()))
        );
        // Commands are case sensitive on the wire
        assert!("send".parse::<Command>().is_err());
    }

    #[test]
    fn test_client_commands() {
        assert!(Command::Send.is_client_command());
        assert!(Command::Stomp.is_client_command());
        assert!(!Command::Message.is_client_command());
        assert!(!Command::Connected.is_client_command());
    }
}
