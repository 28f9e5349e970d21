//! TCP broker - serve STOMP on a plain TCP socket.
//!
//! This example demonstrates:
//! - Loading configuration from JSON and building a broker from it
//! - Logging every SEND with a `send` interceptor
//! - Watching lifecycle events
//! - Serving connections with [`serve_tcp`]
//!
//! # Trying it out
//!
//! ```text
//! cargo run --example tcp_broker
//! printf 'CONNECT\naccept-version:1.1\n\n\0SUBSCRIBE\nid:0\ndestination:/topic/demo.*\n\n\0' | nc 127.0.0.1 61613
//! ```

use stomp_broker::middleware::{middleware, CommandArgs, MiddlewareCommand};
use stomp_broker::transport::serve_tcp;
use stomp_broker::{BrokerBuilder, BrokerConfig, BrokerEvent};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
    "server_name": "demo-broker",
    "heartbeat": [10000, 10000],
    "path": "/stomp"
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BrokerConfig::from_json_str(CONFIG)?;
    let broker = BrokerBuilder::from_config(config)
        .middleware(
            MiddlewareCommand::Send,
            middleware(|ctx, args, next| {
                if let CommandArgs::Send { destination, frame } = &*args {
                    tracing::info!(
                        session = ctx.session_id,
                        destination = %destination,
                        bytes = frame.body_len(),
                        "publish"
                    );
                }
                next.proceed(args)
            }),
        )
        .build();

    let mut events = broker.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BrokerEvent::Connected { session_id, .. } => tracing::info!(%session_id, "connected"),
                BrokerEvent::Disconnected { session_id } => tracing::info!(%session_id, "disconnected"),
                BrokerEvent::Error { session_id, message } => {
                    tracing::warn!(?session_id, %message, "broker error")
                }
                _ => {}
            }
        }
    });

    let listener = TcpListener::bind("127.0.0.1:61613").await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    serve_tcp(broker, listener).await?;
    Ok(())
}
