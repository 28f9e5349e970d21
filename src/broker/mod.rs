//! Broker module - sessions, command dispatch and the in-process API.
//!
//! A [`Broker`] is a cheap, cloneable handle to one broker instance. All
//! state (sessions, subscriptions, in-process callbacks, interceptor
//! chains) lives behind a single mutex that is only held for short,
//! non-blocking sections. Transport sends, interceptors and callbacks run
//! after the lock is released, so they may call back into the broker.
//!
//! # Lifecycle
//!
//! ```text
//! transport accepts ──► open(conn) ──► session id
//! inbound bytes     ──► receive(session, bytes) ──► CONNECT / SEND / ...
//! socket closed     ──► close(session)           ──► teardown (idempotent)
//! ```
//!
//! # Example
//!
//! ```
//! use stomp_broker::{callback, Broker, Headers};
//!
//! let broker = Broker::builder().build();
//! let id = broker
//!     .subscribe("/topic/news.*", Some(callback(|body, headers| {
//!         println!("{:?} on {:?}", body, headers.get("destination"));
//!     })), Headers::new())
//!     .unwrap();
//!
//! assert_eq!(broker.subscription_count(), 1);
//! assert!(broker.unsubscribe(&id));
//! ```

mod config;
mod dispatch;
mod events;
mod session;

pub use config::{
    BrokerBuilder, BrokerConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_HEARTBEAT, DEFAULT_PATH,
    DEFAULT_PROTOCOL_VERSION, DEFAULT_SERVER_NAME,
};
pub use events::BrokerEvent;

pub(crate) use dispatch::error_frame;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::codec::MessageBody;
use crate::error::{BrokerError, Result};
use crate::middleware::{Middleware, MiddlewareCommand, MiddlewareRegistry, SessionContext};
use crate::protocol::{is_heartbeat, parse, serialize, Headers};
use crate::subscription::{Delivery, Subscription, SubscriptionRegistry, SELF_SESSION};
use crate::transport::Connection;
use session::{new_session_id, Session};

/// Callback invoked for messages delivered to an in-process subscriber.
pub type MessageCallback = Arc<dyn Fn(&MessageBody, &Headers) + Send + Sync>;

/// Wrap a closure as a [`MessageCallback`].
pub fn callback<F>(f: F) -> MessageCallback
where
    F: Fn(&MessageBody, &Headers) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Everything guarded by the broker lock.
pub(crate) struct State {
    pub(crate) sessions: HashMap<String, Session>,
    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) callbacks: HashMap<String, MessageCallback>,
    pub(crate) middleware: MiddlewareRegistry,
}

struct Inner {
    config: BrokerConfig,
    state: Mutex<State>,
    events: broadcast::Sender<BrokerEvent>,
}

/// Handle to a broker instance.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Broker {
    /// Create a broker with `config`.
    pub fn new(config: BrokerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    sessions: HashMap::new(),
                    subscriptions: SubscriptionRegistry::new(),
                    callbacks: HashMap::new(),
                    middleware: MiddlewareRegistry::new(),
                }),
                events,
            }),
        }
    }

    /// Create a new broker builder.
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    #[inline]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        // Callbacks never run under the lock, so a poisoned guard is still consistent
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: BrokerEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn emit_error(&self, session_id: Option<&str>, err: &BrokerError) {
        self.emit(BrokerEvent::Error {
            session_id: session_id.map(str::to_string),
            message: err.to_string(),
        });
    }

    // ---- Middleware ----

    /// Append an interceptor to a command's chain.
    pub fn add_middleware(&self, command: MiddlewareCommand, handler: Middleware) {
        self.state().middleware.add(command, handler);
    }

    /// Replace a command's chain with a single interceptor.
    pub fn set_middleware(&self, command: MiddlewareCommand, handler: Middleware) {
        self.state().middleware.set(command, handler);
    }

    /// Remove an interceptor by identity.
    pub fn remove_middleware(&self, command: MiddlewareCommand, handler: &Middleware) -> bool {
        self.state().middleware.remove(command, handler)
    }

    /// Number of interceptors registered for `command`.
    pub fn middleware_count(&self, command: MiddlewareCommand) -> usize {
        self.state().middleware.len(command)
    }

    pub(crate) fn chain(&self, command: MiddlewareCommand) -> Vec<Middleware> {
        self.state().middleware.chain(command)
    }

    // ---- Transport side ----

    /// Attach a transport connection and mint its session id.
    pub fn open(&self, connection: Arc<dyn Connection>) -> String {
        let session_id = new_session_id();
        self.state()
            .sessions
            .insert(session_id.clone(), Session::new(connection));
        tracing::debug!(session_id = %session_id, "session opened");
        self.emit(BrokerEvent::Connecting {
            session_id: session_id.clone(),
        });
        session_id
    }

    /// Process one inbound payload (a whole frame or the heartbeat marker).
    ///
    /// Any payload counts as liveness for client-driven heartbeats. Failures
    /// are answered with an ERROR frame, published as an
    /// [`BrokerEvent::Error`], and returned.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::UnknownSession`] if the session is not open
    /// - [`BrokerError::Parse`] for malformed frames
    /// - any error of the command handler
    pub fn receive(&self, session_id: &str, data: &[u8]) -> Result<()> {
        let connection = {
            let mut state = self.state();
            let session = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;
            session.heartbeat.observe(Instant::now());
            session.connection.clone()
        };

        if is_heartbeat(data) {
            return Ok(());
        }

        let frame = match parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                let err = BrokerError::Parse(e);
                tracing::warn!(session_id, error = %err, "malformed frame");
                if self.inner.config.error_on_parse_failure {
                    connection.send(serialize(&error_frame(&err, None)));
                }
                self.emit_error(Some(session_id), &err);
                return Err(err);
            }
        };

        self.dispatch(session_id, &connection, frame)
    }

    /// Report that the transport connection closed.
    ///
    /// Cancels the heartbeat and purges the session's subscriptions. Returns
    /// `false` if the session was already gone.
    pub fn close(&self, session_id: &str) -> bool {
        self.teardown(session_id)
    }

    /// Report a transport failure; the session is torn down.
    pub fn transport_error(&self, session_id: &str, error: impl fmt::Display) {
        let err = BrokerError::Transport(error.to_string());
        tracing::error!(session_id, error = %err, "transport error");
        self.emit_error(Some(session_id), &err);
        self.teardown(session_id);
    }

    /// Remove a session exactly once. Never closes the connection itself.
    pub(crate) fn teardown(&self, session_id: &str) -> bool {
        let removed = {
            let mut state = self.state();
            let Some(mut session) = state.sessions.remove(session_id) else {
                return false;
            };
            session.heartbeat.off();
            state.subscriptions.remove_all_for_session(session_id)
        };

        tracing::debug!(
            session_id,
            subscriptions = removed.len(),
            "session closed"
        );
        for subscription in removed {
            self.emit(BrokerEvent::Unsubscribe(subscription));
        }
        self.emit(BrokerEvent::Disconnected {
            session_id: session_id.to_string(),
        });
        true
    }

    // ---- In-process API ----

    /// Subscribe an in-process callback to `topic`.
    ///
    /// The subscription id comes from the `id` header when given, otherwise
    /// a UUID is generated. The `subscribe` chain runs with a local session
    /// context. Without a callback the subscription still exists but
    /// deliveries to it are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Rejected`] if an interceptor rejected it.
    pub fn subscribe(
        &self,
        topic: &str,
        callback: Option<MessageCallback>,
        headers: Headers,
    ) -> Result<String> {
        let id = headers
            .get(crate::protocol::header::ID)
            .map(str::to_string)
            .unwrap_or_else(dispatch::new_id);
        let subscription = Subscription::new(
            id.clone(),
            SELF_SESSION,
            topic,
            Delivery::ToCallback(id),
        )
        .with_headers(headers);
        self.register_subscription(&SessionContext::local(SELF_SESSION), subscription, callback)
    }

    /// Remove an in-process subscription. Returns whether one was removed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.remove_subscription(&SessionContext::local(SELF_SESSION), id.to_string())
            .is_ok()
    }

    /// Publish a message from the embedding process.
    ///
    /// In-process subscribers never see these messages, since they share
    /// the sending session.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SendRejected`] if the body cannot be encoded
    /// or an interceptor rejected the message.
    pub fn send(&self, topic: &str, headers: Headers, body: impl Into<MessageBody>) -> Result<()> {
        self.publish(
            &SessionContext::local(SELF_SESSION),
            topic.to_string(),
            &headers,
            &body.into(),
        )
    }

    // ---- Introspection ----

    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Subscriptions owned by `session_id` (use [`SELF_SESSION`] for in-process ones).
    pub fn subscriptions_for(&self, session_id: &str) -> Vec<Subscription> {
        self.state()
            .subscriptions
            .for_session(session_id)
            .cloned()
            .collect()
    }

    /// Check if a session completed its CONNECT handshake.
    pub fn is_connected(&self, session_id: &str) -> bool {
        self.state()
            .sessions
            .get(session_id)
            .is_some_and(|s| s.connected)
    }

    /// Check if a session has a running heartbeat.
    pub fn has_heartbeat(&self, session_id: &str) -> bool {
        self.state()
            .sessions
            .get(session_id)
            .is_some_and(|s| s.heartbeat.is_active())
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Broker")
            .field("server_name", &self.inner.config.server_name)
            .field("sessions", &state.sessions.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("middleware", &state.middleware)
            .finish()
    }
}
