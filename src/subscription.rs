//! Subscription registry and fan-out.
//!
//! The registry exclusively owns every live subscription of one broker.
//! Entries reference their connection but never own it. Fan-out works on a
//! snapshot: [`SubscriptionRegistry::publish`] returns the deliveries to make,
//! and the broker performs them after releasing its state lock, so
//! subscriptions added or removed while deliveries run are never visited
//! twice.

use std::fmt;
use std::sync::Arc;

use crate::protocol::{header, Command, Frame, Headers};
use crate::topic::{matches, tokenize};
use crate::transport::Connection;

/// Session id used for in-process subscribers and publishers.
pub const SELF_SESSION: &str = "self";

/// How a subscription receives messages.
#[derive(Clone)]
pub enum Delivery {
    /// Write MESSAGE frames to a transport connection.
    ToConnection(Arc<dyn Connection>),
    /// Invoke the in-process callback registered under this subscription id.
    ToCallback(String),
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::ToConnection(conn) => f
                .debug_tuple("ToConnection")
                .field(&conn.ready_state())
                .finish(),
            Delivery::ToCallback(id) => f.debug_tuple("ToCallback").field(id).finish(),
        }
    }
}

/// A live topic registration.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Unique per owning session.
    pub id: String,
    /// Owning session ([`SELF_SESSION`] for in-process subscribers).
    pub session_id: String,
    /// Destination pattern as given by the subscriber.
    pub topic: String,
    /// Pattern segments.
    pub tokens: Vec<String>,
    /// Where messages go.
    pub delivery: Delivery,
    /// Headers of the SUBSCRIBE frame (e.g. `ack`), kept for inspection.
    pub headers: Headers,
}

impl Subscription {
    /// Create a subscription; the topic is tokenized here.
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        topic: impl Into<String>,
        delivery: Delivery,
    ) -> Self {
        let topic = topic.into();
        Self {
            id: id.into(),
            session_id: session_id.into(),
            tokens: tokenize(&topic),
            topic,
            delivery,
            headers: Headers::new(),
        }
    }

    /// Attach the subscriber's headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Check if this subscription matches tokenized destination segments.
    #[inline]
    pub fn matches(&self, destination: &[String]) -> bool {
        matches(&self.tokens, destination)
    }

    /// Check if this subscription belongs to an in-process subscriber.
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self.delivery, Delivery::ToCallback(_))
    }
}

/// One delivery computed by fan-out.
#[derive(Debug, Clone)]
pub struct PendingDelivery {
    /// Target of the delivery.
    pub delivery: Delivery,
    /// MESSAGE frame with the `subscription` header set.
    pub frame: Frame,
}

/// Registry of active subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription.
    ///
    /// A subscription with the same `(id, session)` is replaced.
    pub fn add(&mut self, subscription: Subscription) {
        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id && s.session_id == subscription.session_id)
        {
            *existing = subscription;
            return;
        }
        self.subscriptions.push(subscription);
    }

    /// Remove the subscription matching both `id` and `session_id`.
    pub fn remove(&mut self, id: &str, session_id: &str) -> Option<Subscription> {
        let pos = self
            .subscriptions
            .iter()
            .position(|s| s.id == id && s.session_id == session_id)?;
        Some(self.subscriptions.remove(pos))
    }

    /// Remove every subscription owned by `session_id`.
    pub fn remove_all_for_session(&mut self, session_id: &str) -> Vec<Subscription> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.subscriptions)
            .into_iter()
            .partition(|s| s.session_id == session_id);
        self.subscriptions = kept;
        removed
    }

    /// Look up a subscription by `(id, session)`.
    pub fn get(&self, id: &str, session_id: &str) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|s| s.id == id && s.session_id == session_id)
    }

    /// Subscriptions owned by `session_id`.
    pub fn for_session<'a>(&'a self, session_id: &'a str) -> impl Iterator<Item = &'a Subscription> {
        self.subscriptions
            .iter()
            .filter(move |s| s.session_id == session_id)
    }

    /// Compute deliveries of `frame` published to `destination`.
    ///
    /// Every subscription of another session whose pattern matches gets a
    /// copy of the frame with `command` forced to MESSAGE and the
    /// `subscription` header set to its id. The sender's own subscriptions
    /// are always skipped.
    pub fn publish(&self, sender_session_id: &str, destination: &str, frame: &Frame) -> Vec<PendingDelivery> {
        let tokens = tokenize(destination);
        self.subscriptions
            .iter()
            .filter(|s| s.session_id != sender_session_id && s.matches(&tokens))
            .map(|s| {
                let mut message = frame.clone();
                message.command = Command::Message.as_str().to_string();
                message.headers.set(header::SUBSCRIPTION, s.id.as_str());
                PendingDelivery {
                    delivery: s.delivery.clone(),
                    frame: message,
                }
            })
            .collect()
    }

    /// Iterate all subscriptions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
