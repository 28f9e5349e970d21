//! In-process pub/sub - an embedded broker without sockets.
//!
//! A [`ChannelConnection`] stands in for a remote client while the host
//! process subscribes and publishes through the in-process API.

use std::time::Duration;

use stomp_broker::protocol::{parse, serialize};
use stomp_broker::transport::{ChannelConnection, Outbound};
use stomp_broker::{callback, Broker, Command, Frame, Headers};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let broker = Broker::builder().heartbeat(0, 0).build();

    // Host-side subscriber
    broker.subscribe(
        "/topic/sensors.**",
        Some(callback(|body, headers| {
            println!(
                "host got {:?} from {}",
                body,
                headers.get("destination").unwrap_or("?")
            );
        })),
        Headers::new(),
    )?;

    // A "remote" client over a channel
    let (conn, mut rx) = ChannelConnection::new();
    let session = broker.open(conn);
    broker.receive(&session, &serialize(&Frame::new(Command::Connect)))?;
    broker.receive(
        &session,
        &serialize(
            &Frame::new(Command::Subscribe)
                .header("id", "alerts")
                .header("destination", "/topic/alerts"),
        ),
    )?;

    // Remote publishes, host receives
    broker.receive(
        &session,
        &serialize(
            &Frame::new(Command::Send)
                .header("destination", "/topic/sensors.kitchen.temp")
                .header("content-type", "application/json")
                .text_body(r#"{"celsius":21.5}"#),
        ),
    )?;

    // Host publishes, remote receives
    broker.send("/topic/alerts", Headers::new(), "door open")?;

    while let Ok(Some(Outbound::Data(bytes))) =
        tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
    {
        let frame = parse(&bytes)?;
        println!("remote got {}", frame.command);
        if let Some(body) = frame.body_text() {
            println!("  {}", body);
        }
    }

    broker.close(&session);
    Ok(())
}
