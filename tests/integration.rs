//! Integration tests for stomp-broker.
//!
//! These tests drive a broker end to end through its transport-facing API
//! and check the frames that come out of each connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use stomp_broker::middleware::{middleware, CommandArgs, MiddlewareCommand};
use stomp_broker::protocol::{parse, serialize, FrameBuffer, StreamItem};
use stomp_broker::topic::{matches, tokenize};
use stomp_broker::transport::{serve_stream, ChannelConnection, Connection, Outbound, ReadyState};
use stomp_broker::{
    callback, Broker, BrokerError, BrokerEvent, Command, Frame, Headers, MessageBody, SELF_SESSION,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

/// A connection whose outbound frames are collected for inspection.
struct TestClient {
    session: String,
    conn: Arc<ChannelConnection>,
    rx: mpsc::Receiver<Outbound>,
}

impl TestClient {
    fn open(broker: &Broker) -> Self {
        let (conn, rx) = ChannelConnection::new();
        let session = broker.open(conn.clone());
        Self { session, conn, rx }
    }

    fn send(&self, broker: &Broker, frame: &Frame) -> stomp_broker::Result<()> {
        broker.receive(&self.session, &serialize(frame))
    }

    fn frames(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let Outbound::Data(bytes) = item {
                if bytes.as_ref() != b"\n" {
                    out.push(parse(&bytes).unwrap());
                }
            }
        }
        out
    }
}

fn subscribe_frame(id: &str, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", id)
        .header("destination", destination)
}

fn send_frame(destination: &str, body: &str) -> Frame {
    Frame::new(Command::Send)
        .header("destination", destination)
        .text_body(body)
}

/// Round-trip: serialize then parse preserves command, headers and body.
#[test]
fn test_frame_round_trip() {
    let frame = Frame::new(Command::Send)
        .header("destination", "/topic/a.b")
        .header("x-trace", "abc123")
        .header("content-type", "text/plain")
        .text_body("hello world");

    let parsed = parse(&serialize(&frame)).unwrap();

    assert_eq!(parsed.command, frame.command);
    assert_eq!(
        parsed.headers.iter().collect::<Vec<_>>(),
        frame.headers.iter().collect::<Vec<_>>()
    );
    assert_eq!(parsed.body_text(), Some("hello world"));
}

/// Topic matching over the documented cases.
#[test]
fn test_topic_match_totality() {
    let dest = ["a", "b", "c"];
    assert!(matches(&["a", "*", "c"], &dest));
    assert!(!matches(&["a", "*", "d"], &dest));
    assert!(matches(&["a", "**"], &["a"]));
    assert!(matches(&["a", "**"], &["a", "b"]));
    assert!(matches(&["a", "**"], &dest));
    assert!(!matches(&["a", "b"], &dest));
    assert_eq!(tokenize("/topic/a.b.c"), vec!["topic/a", "b", "c"]);
}

/// Client A subscribes `/topic/foo.*` as `s1`, client B sends to `/topic/foo.bar`.
#[test]
fn test_wildcard_delivery_scenario() {
    let broker = Broker::builder().build();
    let mut a = TestClient::open(&broker);
    let mut b = TestClient::open(&broker);

    a.send(&broker, &subscribe_frame("s1", "/topic/foo.*")).unwrap();
    b.send(&broker, &send_frame("/topic/foo.bar", "grüße")).unwrap();

    let received = a.frames();
    assert_eq!(received.len(), 1);
    let message = &received[0];
    assert_eq!(message.command(), Some(Command::Message));
    assert_eq!(message.get_header("subscription"), Some("s1"));
    assert_eq!(message.get_header("destination"), Some("/topic/foo.bar"));
    assert!(!message.get_header("message-id").unwrap().is_empty());
    assert_eq!(
        message.get_header("content-length"),
        Some("grüße".len().to_string().as_str())
    );
    assert_eq!(message.body_text(), Some("grüße"));

    assert!(b.frames().is_empty());
}

/// Each message gets its own id.
#[test]
fn test_message_ids_are_fresh() {
    let broker = Broker::builder().build();
    let mut a = TestClient::open(&broker);
    let b = TestClient::open(&broker);
    a.send(&broker, &subscribe_frame("s1", "/topic/x")).unwrap();

    b.send(&broker, &send_frame("/topic/x", "1")).unwrap();
    b.send(&broker, &send_frame("/topic/x", "2")).unwrap();

    let frames = a.frames();
    assert_eq!(frames.len(), 2);
    assert_ne!(
        frames[0].get_header("message-id"),
        frames[1].get_header("message-id")
    );
}

/// Senders never receive their own publications.
#[test]
fn test_self_exclusion() {
    let broker = Broker::builder().build();
    let mut a = TestClient::open(&broker);
    let mut b = TestClient::open(&broker);

    a.send(&broker, &subscribe_frame("s1", "/topic/chat")).unwrap();
    b.send(&broker, &subscribe_frame("s1", "/topic/chat")).unwrap();
    a.send(&broker, &send_frame("/topic/chat", "hi")).unwrap();

    assert!(a.frames().is_empty());
    assert_eq!(b.frames().len(), 1);
}

/// Heartbeat negotiation as seen in CONNECTED.
#[tokio::test]
async fn test_heartbeat_negotiation_via_connect() {
    let broker = Broker::builder().heartbeat(0, 10_000).build();
    let mut client = TestClient::open(&broker);

    client
        .send(
            &broker,
            &Frame::new(Command::Connect).header("heart-beat", "5000,5000"),
        )
        .unwrap();

    let frames = client.frames();
    assert_eq!(frames[0].command(), Some(Command::Connected));
    assert_eq!(frames[0].get_header("heart-beat"), Some("0,10000"));
    assert!(broker.has_heartbeat(&client.session));
}

/// JSON bodies are parsed on the way in and re-serialized identically.
#[test]
fn test_json_round_trip() {
    let broker = Broker::builder().build();
    let mut a = TestClient::open(&broker);
    let b = TestClient::open(&broker);
    a.send(&broker, &subscribe_frame("s1", "/topic/json")).unwrap();

    let mut events = broker.events();
    b.send(
        &broker,
        &send_frame("/topic/json", r#"{"a":1}"#).header("content-type", "application/json"),
    )
    .unwrap();

    let frames = a.frames();
    assert_eq!(frames[0].body(), Some(&br#"{"a":1}"#[..]));
    assert_eq!(frames[0].get_header("content-type"), Some("application/json"));
    assert_eq!(frames[0].get_header("content-length"), Some("7"));

    let sent = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| matches!(e, BrokerEvent::Send { .. }))
        .unwrap();
    if let BrokerEvent::Send { destination, frame } = sent {
        assert_eq!(destination, "/topic/json");
        assert_eq!(frame.body(), Some(&br#"{"a":1}"#[..]));
    }
}

/// UNSUBSCRIBE for an unknown id fails with ERROR and leaves the registry alone.
#[test]
fn test_unknown_unsubscribe() {
    let broker = Broker::builder().build();
    let mut client = TestClient::open(&broker);
    client.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();
    client.frames();

    let result = client.send(&broker, &Frame::new(Command::Unsubscribe).header("id", "never"));

    assert!(matches!(
        result,
        Err(BrokerError::SubscriptionNotFound { ref id }) if id == "never"
    ));
    let frames = client.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Some(Command::Error));
    assert_eq!(frames[0].get_header("message"), Some("Subscription not found"));
    assert_eq!(broker.subscription_count(), 1);
}

/// Teardown twice ends in the same state without error.
#[test]
fn test_teardown_idempotent() {
    let broker = Broker::builder().heartbeat(10_000, 0).build();
    let mut events = broker.events();
    let client = TestClient::open(&broker);
    client
        .send(&broker, &Frame::new(Command::Connect).header("heart-beat", "0,10000"))
        .unwrap();
    client.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();
    client.send(&broker, &subscribe_frame("s2", "/topic/b")).unwrap();

    assert!(broker.close(&client.session));
    assert!(!broker.close(&client.session));

    assert_eq!(broker.subscription_count(), 0);
    assert_eq!(broker.session_count(), 0);
    assert!(!broker.has_heartbeat(&client.session));
    // Closing never closes the transport itself
    assert_eq!(client.conn.ready_state(), ReadyState::Open);

    let disconnected = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, BrokerEvent::Disconnected { .. }))
        .count();
    assert_eq!(disconnected, 1);
}

/// A `send` interceptor can veto delivery.
#[test]
fn test_middleware_rejects_send() {
    let broker = Broker::builder()
        .middleware(
            MiddlewareCommand::Send,
            middleware(|_ctx, args, next| match args {
                CommandArgs::Send { destination, .. } if destination.ends_with(".private") => {
                    next.reject()
                }
                _ => next.proceed(args),
            }),
        )
        .build();
    let mut a = TestClient::open(&broker);
    let mut b = TestClient::open(&broker);
    a.send(&broker, &subscribe_frame("s1", "/topic/**")).unwrap();

    assert!(b.send(&broker, &send_frame("/topic/x.private", "no")).is_err());
    b.send(&broker, &send_frame("/topic/x.public", "yes")).unwrap();

    let delivered = a.frames();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].body_text(), Some("yes"));
    assert_eq!(b.frames()[0].command(), Some(Command::Error));
}

/// Interceptors run in order and can be removed by identity.
#[test]
fn test_middleware_order_and_removal() {
    let broker = Broker::builder().build();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first_log = log.clone();
    let first = middleware(move |_ctx, args, next| {
        first_log.lock().unwrap().push("first");
        next.proceed(args)
    });
    let second_log = log.clone();
    let second = middleware(move |_ctx, args, next| {
        second_log.lock().unwrap().push("second");
        next.proceed(args)
    });
    broker.add_middleware(MiddlewareCommand::Subscribe, first.clone());
    broker.add_middleware(MiddlewareCommand::Subscribe, second.clone());

    let client = TestClient::open(&broker);
    client.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    assert!(broker.remove_middleware(MiddlewareCommand::Subscribe, &first));
    assert!(!broker.remove_middleware(MiddlewareCommand::Subscribe, &first));
    client.send(&broker, &subscribe_frame("s2", "/topic/b")).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "second"]);
}

/// In-process subscribers get decoded bodies; in-process sends reach remote subscribers.
#[test]
fn test_in_process_api() {
    let broker = Broker::builder().build();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let id = broker
        .subscribe(
            "/topic/orders.*",
            Some(callback(move |body, headers| {
                sink.lock()
                    .unwrap()
                    .push((body.clone(), headers.get("destination").map(str::to_string)));
            })),
            Headers::new(),
        )
        .unwrap();
    assert_eq!(broker.subscriptions_for(SELF_SESSION).len(), 1);

    let mut remote = TestClient::open(&broker);
    remote.send(&broker, &subscribe_frame("r1", "/topic/orders.*")).unwrap();
    remote
        .send(&broker, &send_frame("/topic/orders.new", "order-1"))
        .unwrap();

    broker
        .send(
            "/topic/orders.paid",
            Headers::from_iter([("x-source", "billing")]),
            serde_json::json!({"order": 1}),
        )
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, MessageBody::Text("order-1".into()));
    assert_eq!(received[0].1.as_deref(), Some("/topic/orders.new"));

    let frames = remote.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get_header("x-source"), Some("billing"));
    assert_eq!(frames[0].body_text(), Some(r#"{"order":1}"#));

    assert!(broker.unsubscribe(&id));
    assert!(!broker.unsubscribe(&id));
}

/// Binary bodies survive fan-out byte for byte.
#[test]
fn test_binary_body_delivery() {
    let broker = Broker::builder().build();
    let mut a = TestClient::open(&broker);
    let b = TestClient::open(&broker);
    a.send(&broker, &subscribe_frame("s1", "/topic/bin")).unwrap();

    let payload = vec![0u8, 159, 146, 150, 0, 1];
    b.send(
        &broker,
        &Frame::new(Command::Send)
            .header("destination", "/topic/bin")
            .header("content-length", payload.len().to_string())
            .binary_body(payload.clone()),
    )
    .unwrap();

    let frames = a.frames();
    assert_eq!(frames[0].body(), Some(&payload[..]));
    assert_eq!(frames[0].get_header("content-length"), Some("6"));
}

/// A client that stops heartbeating is closed.
#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_closes_client() {
    let broker = Broker::builder()
        .heartbeat(0, 1000)
        .heartbeat_error_margin(Duration::from_millis(200))
        .build();
    let client = TestClient::open(&broker);
    client
        .send(&broker, &Frame::new(Command::Connect).header("heart-beat", "1000,0"))
        .unwrap();
    client.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(900)).await;
        broker.receive(&client.session, b"\n").unwrap();
    }
    assert_eq!(broker.session_count(), 1);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(broker.session_count(), 0);
    assert_eq!(broker.subscription_count(), 0);
    assert_ne!(client.conn.ready_state(), ReadyState::Open);
    assert!(matches!(
        broker.receive(&client.session, b"\n"),
        Err(BrokerError::UnknownSession(_))
    ));
}

/// Full STOMP conversation over an in-memory stream.
#[tokio::test]
async fn test_stream_adapter_conversation() {
    let broker = Broker::builder().heartbeat(0, 0).build();
    let (mut alice, alice_io) = tokio::io::duplex(8192);
    let (mut bob, bob_io) = tokio::io::duplex(8192);
    let alice_task = tokio::spawn(serve_stream(broker.clone(), alice_io));
    let bob_task = tokio::spawn(serve_stream(broker.clone(), bob_io));

    async fn read_frames(io: &mut tokio::io::DuplexStream, buffer: &mut FrameBuffer, count: usize) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut buf = vec![0u8; 4096];
        while frames.len() < count {
            let n = io.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed early");
            for item in buffer.push(&buf[..n]).unwrap() {
                if let StreamItem::Frame(bytes) = item {
                    frames.push(parse(&bytes).unwrap());
                }
            }
        }
        frames
    }

    let mut alice_buf = FrameBuffer::new();
    let mut bob_buf = FrameBuffer::new();

    alice
        .write_all(b"CONNECT\naccept-version:1.1\n\n\0SUBSCRIBE\nid:a1\ndestination:/topic/room.*\nreceipt:sub-ok\n\n\0")
        .await
        .unwrap();
    let frames = read_frames(&mut alice, &mut alice_buf, 2).await;
    assert_eq!(frames[0].command(), Some(Command::Connected));
    assert_eq!(frames[1].command(), Some(Command::Receipt));
    assert_eq!(frames[1].get_header("receipt-id"), Some("sub-ok"));

    // Split across writes, with a heartbeat in between
    bob.write_all(b"CONNECT\n\n\0\nSEND\ndestination:/topic/ro").await.unwrap();
    bob.write_all(b"om.lobby\n\nhello alice\0").await.unwrap();
    let frames = read_frames(&mut bob, &mut bob_buf, 1).await;
    assert_eq!(frames[0].command(), Some(Command::Connected));

    let frames = read_frames(&mut alice, &mut alice_buf, 1).await;
    assert_eq!(frames[0].command(), Some(Command::Message));
    assert_eq!(frames[0].get_header("subscription"), Some("a1"));
    assert_eq!(frames[0].body_text(), Some("hello alice"));

    alice
        .write_all(b"DISCONNECT\nreceipt:bye\n\n\0")
        .await
        .unwrap();
    let frames = read_frames(&mut alice, &mut alice_buf, 1).await;
    assert_eq!(frames[0].get_header("receipt-id"), Some("bye"));

    drop(alice);
    alice_task.await.unwrap().unwrap();
    drop(bob);
    bob_task.await.unwrap().unwrap();

    assert_eq!(broker.session_count(), 0);
    assert_eq!(broker.subscription_count(), 0);
}

/// Lifecycle events arrive in order for a simple session.
#[test]
fn test_lifecycle_events() {
    let broker = Broker::builder().heartbeat(0, 0).build();
    let mut events = broker.events();
    let client = TestClient::open(&broker);

    client.send(&broker, &Frame::new(Command::Connect)).unwrap();
    client.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();
    client
        .send(&broker, &Frame::new(Command::Unsubscribe).header("id", "s1"))
        .unwrap();
    broker.close(&client.session);

    let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.name())
        .collect();
    assert_eq!(
        names,
        vec!["connecting", "connected", "subscribe", "unsubscribe", "disconnected"]
    );
}

/// Closed connections are skipped during fan-out.
#[test]
fn test_closed_subscriber_is_skipped() {
    let broker = Broker::builder().build();
    let mut a = TestClient::open(&broker);
    let mut c = TestClient::open(&broker);
    let b = TestClient::open(&broker);
    a.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();
    c.send(&broker, &subscribe_frame("s1", "/topic/a")).unwrap();
    a.conn.close();
    a.frames();

    b.send(&broker, &send_frame("/topic/a", "x")).unwrap();

    assert!(a.frames().is_empty());
    assert_eq!(c.frames().len(), 1);
}
