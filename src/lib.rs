//! # stomp-broker
//!
//! Embeddable STOMP message broker.
//!
//! Clients speak the STOMP text protocol over any bidirectional byte
//! transport. Published messages are routed to topic subscribers with
//! wildcard matching (`*` for one segment, `**` for the rest), heartbeats
//! are negotiated per connection, and every state-changing command runs
//! through a configurable interceptor chain.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): frame parse/serialize and stream framing
//! - **Topics** ([`topic`]): destination tokenizing and wildcard matching
//! - **Subscriptions** ([`subscription`]): registry and snapshot fan-out
//! - **Heartbeats** ([`heartbeat`]): negotiation and the per-session monitor
//! - **Middleware** ([`middleware`]): per-command interceptor chains
//! - **Broker** ([`Broker`]): sessions, dispatch and the in-process API
//! - **Transport** ([`transport`]): the connection trait plus channel and
//!   stream adapters
//!
//! ## Example
//!
//! ```no_run
//! use stomp_broker::transport::serve_tcp;
//! use stomp_broker::Broker;
//!
//! #[tokio::main]
//! async fn main() -> stomp_broker::Result<()> {
//!     let broker = Broker::builder().heartbeat(0, 10_000).build();
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:61613").await?;
//!     serve_tcp(broker, listener).await
//! }
//! ```

pub mod broker;
pub mod codec;
pub mod error;
pub mod heartbeat;
pub mod middleware;
pub mod protocol;
pub mod subscription;
pub mod topic;
pub mod transport;

pub use broker::{callback, Broker, BrokerBuilder, BrokerConfig, BrokerEvent, MessageCallback};
pub use codec::MessageBody;
pub use error::{BrokerError, ParseError, Result};
pub use protocol::{Command, Frame, Headers};
pub use subscription::SELF_SESSION;
