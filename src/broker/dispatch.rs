//! Command dispatch.
//!
//! One handler per client command. Each handler builds the command's
//! [`CommandArgs`], runs the interceptor chain and performs the terminal
//! action. Failures are returned to [`Broker::dispatch`], which turns them
//! into ERROR frames for the originating connection.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{Broker, BrokerEvent, MessageCallback};
use crate::codec::{MessageBody, TEXT_PLAIN};
use crate::error::{BrokerError, Result};
use crate::heartbeat::{self, Heartbeat, Negotiated, TickAction};
use crate::middleware::{run_chain, CommandArgs, MiddlewareCommand, SessionContext};
use crate::protocol::{header, serialize, Command, Frame, Headers, HEARTBEAT};
use crate::subscription::{Delivery, PendingDelivery, Subscription};
use crate::topic::tokenize;
use crate::transport::Connection;

/// Fresh id for subscriptions and messages.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short reason placed in the `message` header of an ERROR frame.
fn error_summary(err: &BrokerError) -> &'static str {
    match err {
        BrokerError::Parse(_) => "Malformed frame",
        BrokerError::HandshakeRejected(_) => "Handshake rejected",
        BrokerError::SubscriptionNotFound { .. } => "Subscription not found",
        BrokerError::SendRejected(_) => "Send rejected",
        BrokerError::HeartbeatTimeout(_) => "Heartbeat timeout",
        BrokerError::CommandNotFound(_) => "Command not found",
        BrokerError::MissingHeader(_) => "Missing header",
        BrokerError::UnknownSession(_) => "Unknown session",
        BrokerError::Rejected(_) => "Command rejected",
        BrokerError::FrameTooLarge { .. } => "Frame too large",
        BrokerError::Transport(_) | BrokerError::Io(_) => "Transport error",
        BrokerError::Json(_) => "Invalid JSON",
    }
}

/// Build the ERROR frame reporting `err`.
pub(crate) fn error_frame(err: &BrokerError, receipt: Option<&str>) -> Frame {
    let mut frame = Frame::new(Command::Error)
        .header(header::MESSAGE, error_summary(err))
        .header(header::CONTENT_TYPE, TEXT_PLAIN)
        .text_body(err.to_string());
    if let Some(receipt) = receipt {
        frame.headers.set(header::RECEIPT_ID, receipt);
    }
    frame
}

/// Build the outgoing frame of a published message.
///
/// Broker defaults (`destination`, `message-id`, `content-type`) are merged
/// under the sender's headers. `message-id` and `content-length` are always
/// assigned by the broker and `receipt` is stripped.
pub(crate) fn build_message(destination: &str, headers: &Headers, body: &MessageBody) -> Result<Frame> {
    let encoded = body.encode()?;

    let mut message = Frame::new(Command::Message)
        .header(header::DESTINATION, destination)
        .header(header::MESSAGE_ID, "");
    if let Some(content_type) = body.default_content_type() {
        message.headers.set(header::CONTENT_TYPE, content_type);
    }
    message.headers.merge(headers);

    message.headers.set(header::DESTINATION, destination);
    message.headers.set(header::MESSAGE_ID, new_id());
    message.headers.remove(header::RECEIPT);
    if encoded.is_empty() {
        message.headers.remove(header::CONTENT_LENGTH);
    } else {
        message
            .headers
            .set(header::CONTENT_LENGTH, encoded.len().to_string());
        message.body = Some(encoded);
        message.binary = body.is_binary();
    }
    Ok(message)
}

impl Broker {
    /// Route a parsed frame and answer failures with ERROR.
    pub(crate) fn dispatch(
        &self,
        session_id: &str,
        connection: &Arc<dyn Connection>,
        frame: Frame,
    ) -> Result<()> {
        let receipt = frame.get_header(header::RECEIPT).map(str::to_string);
        let command = frame.command();

        match self.handle_frame(session_id, connection, frame) {
            Ok(()) => {
                if let Some(receipt) = receipt {
                    if !matches!(command, Some(Command::Connect | Command::Stomp)) {
                        let reply = Frame::new(Command::Receipt).header(header::RECEIPT_ID, receipt);
                        connection.send(serialize(&reply));
                    }
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session_id, error = %err, "command failed");
                connection.send(serialize(&error_frame(&err, receipt.as_deref())));
                self.emit_error(Some(session_id), &err);
                Err(err)
            }
        }
    }

    fn handle_frame(
        &self,
        session_id: &str,
        connection: &Arc<dyn Connection>,
        frame: Frame,
    ) -> Result<()> {
        let command = match frame.command() {
            Some(command) if command.is_client_command() => command,
            _ => return Err(BrokerError::CommandNotFound(frame.command)),
        };

        let ctx = SessionContext {
            session_id,
            connection: Some(connection),
        };

        if !matches!(command, Command::Connect | Command::Stomp) && !self.is_connected(session_id) {
            tracing::debug!(session_id, %command, "frame before CONNECT");
        }

        match command {
            Command::Connect | Command::Stomp => self.handle_connect(&ctx, frame),
            Command::Disconnect => self.handle_disconnect(&ctx, frame),
            Command::Subscribe => self.handle_subscribe(&ctx, connection, frame),
            Command::Unsubscribe => self.handle_unsubscribe(&ctx, frame),
            Command::Send => self.handle_send(&ctx, frame),
            other => Err(BrokerError::CommandNotFound(other.to_string())),
        }
    }

    fn handle_connect(&self, ctx: &SessionContext<'_>, frame: Frame) -> Result<()> {
        let session_id = ctx.session_id;
        let mut args = CommandArgs::Connect {
            heartbeat: heartbeat::parse_header(frame.get_header(header::HEART_BEAT)),
            headers: frame.headers,
        };

        let chain = self.chain(MiddlewareCommand::Connect);
        let accepted = run_chain(&chain, ctx, &mut args, &mut |_| true);
        let CommandArgs::Connect { heartbeat: client, headers } = args else {
            return Err(BrokerError::HandshakeRejected(session_id.to_string()));
        };
        if !accepted {
            return Err(BrokerError::HandshakeRejected(session_id.to_string()));
        }

        let config = self.config();
        let mut negotiated = heartbeat::negotiate(client, config.heartbeat);
        let connection = {
            let mut state = self.state();
            let session = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;
            session.connected = true;
            let timer = self.spawn_heartbeat(session_id, &negotiated);
            // An announced interval needs a running timer
            if timer.is_none() {
                negotiated = Negotiated::DISABLED;
            }
            session.heartbeat =
                Heartbeat::start(negotiated, config.heartbeat_error_margin(), Instant::now());
            if let Some(timer) = timer {
                session.heartbeat.set_timer(timer);
            }
            session.connection.clone()
        };

        let reply = Frame::new(Command::Connected)
            .header(header::SESSION, session_id)
            .header(header::SERVER, config.server_name.as_str())
            .header(header::HEART_BEAT, negotiated.header_value())
            .header(header::VERSION, config.protocol_version.as_str());
        connection.send(serialize(&reply));

        tracing::debug!(
            session_id,
            heartbeat = %negotiated.header_value(),
            "session connected"
        );
        self.emit(BrokerEvent::Connected {
            session_id: session_id.to_string(),
            headers,
        });
        Ok(())
    }

    fn handle_disconnect(&self, ctx: &SessionContext<'_>, frame: Frame) -> Result<()> {
        let receipt = frame.get_header(header::RECEIPT).map(str::to_string);
        let mut args = CommandArgs::Disconnect {
            receipt: receipt.clone(),
            headers: frame.headers,
        };

        let chain = self.chain(MiddlewareCommand::Disconnect);
        let accepted = run_chain(&chain, ctx, &mut args, &mut |_| {
            self.purge_session(ctx.session_id);
            true
        });

        if accepted {
            Ok(())
        } else {
            Err(BrokerError::Rejected(
                receipt.unwrap_or_else(|| "disconnect".to_string()),
            ))
        }
    }

    fn handle_subscribe(
        &self,
        ctx: &SessionContext<'_>,
        connection: &Arc<dyn Connection>,
        frame: Frame,
    ) -> Result<()> {
        let destination = frame
            .get_header(header::DESTINATION)
            .ok_or(BrokerError::MissingHeader(header::DESTINATION))?
            .to_string();
        let id = frame
            .get_header(header::ID)
            .map(str::to_string)
            .unwrap_or_else(new_id);

        let subscription = Subscription::new(
            id,
            ctx.session_id,
            destination,
            Delivery::ToConnection(connection.clone()),
        )
        .with_headers(frame.headers);
        self.register_subscription(ctx, subscription, None)
            .map(|_| ())
    }

    fn handle_unsubscribe(&self, ctx: &SessionContext<'_>, frame: Frame) -> Result<()> {
        let id = frame
            .get_header(header::ID)
            .ok_or(BrokerError::MissingHeader(header::ID))?
            .to_string();
        self.remove_subscription(ctx, id)
    }

    fn handle_send(&self, ctx: &SessionContext<'_>, frame: Frame) -> Result<()> {
        let destination = frame
            .get_header(header::DESTINATION)
            .ok_or(BrokerError::MissingHeader(header::DESTINATION))?
            .to_string();
        let body = MessageBody::decode(
            frame.get_header(header::CONTENT_TYPE),
            frame.body().unwrap_or_default(),
        )
        .map_err(|e| BrokerError::SendRejected(format!("invalid body: {}", e)))?;

        self.publish(ctx, destination, &frame.headers, &body)
    }

    // ---- Shared by frame handlers and the in-process API ----

    pub(crate) fn register_subscription(
        &self,
        ctx: &SessionContext<'_>,
        subscription: Subscription,
        callback: Option<MessageCallback>,
    ) -> Result<String> {
        let topic = subscription.topic.clone();
        let mut args = CommandArgs::Subscribe { subscription };
        let mut callback = callback;
        let mut registered = None;

        let chain = self.chain(MiddlewareCommand::Subscribe);
        let accepted = run_chain(&chain, ctx, &mut args, &mut |args| {
            let CommandArgs::Subscribe { subscription } = args else {
                return false;
            };
            let mut subscription = subscription.clone();
            subscription.tokens = tokenize(&subscription.topic);
            {
                let mut state = self.state();
                if let (Delivery::ToCallback(key), Some(cb)) = (&subscription.delivery, callback.take()) {
                    state.callbacks.insert(key.clone(), cb);
                }
                state.subscriptions.add(subscription.clone());
            }
            tracing::debug!(
                session_id = %subscription.session_id,
                id = %subscription.id,
                topic = %subscription.topic,
                "subscribed"
            );
            registered = Some(subscription.id.clone());
            self.emit(BrokerEvent::Subscribe(subscription));
            true
        });

        match registered {
            Some(id) if accepted => Ok(id),
            _ => Err(BrokerError::Rejected(format!("subscription to {}", topic))),
        }
    }

    pub(crate) fn remove_subscription(&self, ctx: &SessionContext<'_>, id: String) -> Result<()> {
        let mut args = CommandArgs::Unsubscribe { id: id.clone() };
        let mut found = None;

        let chain = self.chain(MiddlewareCommand::Unsubscribe);
        let accepted = run_chain(&chain, ctx, &mut args, &mut |args| {
            let CommandArgs::Unsubscribe { id } = args else {
                return false;
            };
            let removed = {
                let mut state = self.state();
                let removed = state.subscriptions.remove(id, ctx.session_id);
                if let Some(Delivery::ToCallback(key)) = removed.as_ref().map(|s| &s.delivery) {
                    state.callbacks.remove(key);
                }
                removed
            };
            found = Some(removed.is_some());
            match removed {
                Some(subscription) => {
                    self.emit(BrokerEvent::Unsubscribe(subscription));
                    true
                }
                None => false,
            }
        });

        if accepted {
            Ok(())
        } else if found == Some(false) {
            Err(BrokerError::SubscriptionNotFound { id })
        } else {
            Err(BrokerError::Rejected(format!("unsubscribe {}", id)))
        }
    }

    pub(crate) fn publish(
        &self,
        ctx: &SessionContext<'_>,
        destination: String,
        headers: &Headers,
        body: &MessageBody,
    ) -> Result<()> {
        let message = build_message(&destination, headers, body)
            .map_err(|e| BrokerError::SendRejected(e.to_string()))?;
        let mut args = CommandArgs::Send {
            destination,
            frame: message,
        };

        let chain = self.chain(MiddlewareCommand::Send);
        let accepted = run_chain(&chain, ctx, &mut args, &mut |args| {
            let CommandArgs::Send { destination, frame } = args else {
                return false;
            };
            let deliveries = self
                .state()
                .subscriptions
                .publish(ctx.session_id, destination, frame);
            tracing::debug!(
                destination = %destination,
                recipients = deliveries.len(),
                "fan-out"
            );
            self.emit(BrokerEvent::Send {
                destination: destination.clone(),
                frame: frame.clone(),
            });
            self.deliver(deliveries);
            true
        });

        if accepted {
            Ok(())
        } else {
            let destination = match &args {
                CommandArgs::Send { destination, .. } => destination.as_str(),
                _ => "",
            };
            Err(BrokerError::SendRejected(format!(
                "message to {} rejected",
                destination
            )))
        }
    }

    /// Perform computed deliveries. Must be called without the state lock.
    pub(crate) fn deliver(&self, deliveries: Vec<PendingDelivery>) {
        for PendingDelivery { delivery, frame } in deliveries {
            match delivery {
                Delivery::ToConnection(connection) => {
                    if connection.is_open() {
                        connection.send(serialize(&frame));
                    } else {
                        tracing::debug!(
                            subscription = ?frame.get_header(header::SUBSCRIPTION),
                            "skipping closed connection"
                        );
                    }
                }
                Delivery::ToCallback(id) => {
                    let Some(callback) = self.state().callbacks.get(&id).cloned() else {
                        continue;
                    };
                    match MessageBody::decode(
                        frame.get_header(header::CONTENT_TYPE),
                        frame.body().unwrap_or_default(),
                    ) {
                        Ok(body) => callback(&body, &frame.headers),
                        Err(e) => {
                            tracing::warn!(subscription = %id, error = %e, "undecodable body")
                        }
                    }
                }
            }
        }
    }

    /// DISCONNECT terminal: stop the heartbeat and purge subscriptions,
    /// keeping the session until the transport closes.
    fn purge_session(&self, session_id: &str) {
        let removed = {
            let mut state = self.state();
            if let Some(session) = state.sessions.get_mut(session_id) {
                session.heartbeat.off();
                session.connected = false;
            }
            state.subscriptions.remove_all_for_session(session_id)
        };
        tracing::debug!(session_id, subscriptions = removed.len(), "session disconnected");
        for subscription in removed {
            self.emit(BrokerEvent::Unsubscribe(subscription));
        }
    }

    // ---- Heartbeat ----

    fn spawn_heartbeat(&self, session_id: &str, negotiated: &Negotiated) -> Option<JoinHandle<()>> {
        if negotiated.mode == heartbeat::HeartbeatMode::Disabled {
            return None;
        }
        let weak = Arc::downgrade(&self.inner);
        let session_id = session_id.to_string();
        heartbeat::spawn_timer(negotiated.interval(), move || match weak.upgrade() {
            Some(inner) => Broker { inner }.heartbeat_tick(&session_id),
            None => false,
        })
    }

    /// One timer tick for `session_id`. Returns `false` to stop the timer.
    fn heartbeat_tick(&self, session_id: &str) -> bool {
        let (action, connection) = {
            let mut state = self.state();
            let Some(session) = state.sessions.get_mut(session_id) else {
                return false;
            };
            (session.heartbeat.tick(Instant::now()), session.connection.clone())
        };

        match action {
            TickAction::Idle => true,
            TickAction::SendPing => {
                if connection.is_open() {
                    connection.send(Bytes::from_static(HEARTBEAT));
                }
                true
            }
            TickAction::Close => {
                let err = BrokerError::HeartbeatTimeout(session_id.to_string());
                tracing::warn!(session_id, "no heartbeat from client, closing connection");
                self.emit_error(Some(session_id), &err);
                self.teardown(session_id);
                connection.close();
                false
            }
        }
    }
}
