//! Stream transport - STOMP over any `AsyncRead + AsyncWrite`.
//!
//! Each connection gets a [`ChannelConnection`] and a dedicated writer task.
//! The read loop runs on the calling task and feeds the broker in arrival
//! order.
//!
//! ```text
//! Socket ─► read loop ─► FrameBuffer ─► Broker::receive
//! Broker ─► ChannelConnection ─► mpsc ─► writer task ─► Socket
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ChannelConnection, Connection, Outbound};
use crate::broker::{error_frame, Broker};
use crate::error::{BrokerError, Result};
use crate::protocol::{serialize, FrameBuffer, StreamItem, HEARTBEAT};

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum payloads written before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// How long queued output may take to drain once the session ended.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve one STOMP connection until either side closes it.
///
/// The session is opened on `broker` before the first read and torn down
/// when the function returns.
///
/// # Errors
///
/// Returns the I/O or framing error that ended the connection. A clean
/// close by the peer, or a close requested by the broker, returns `Ok`.
pub async fn serve_stream<S>(broker: Broker, stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (connection, rx) = ChannelConnection::new();
    let mut writer_task: JoinHandle<Result<()>> = tokio::spawn(writer_loop(rx, writer));

    let session_id = broker.open(connection.clone());

    let mut writer_done = false;
    let result = tokio::select! {
        read = read_loop(&broker, &session_id, reader) => read,
        written = &mut writer_task => {
            writer_done = true;
            flatten(written)
        }
    };

    match &result {
        Ok(()) => {
            broker.close(&session_id);
        }
        Err(err) => {
            let reply = match err {
                BrokerError::FrameTooLarge { .. } => true,
                BrokerError::Parse(_) => broker.config().error_on_parse_failure,
                _ => false,
            };
            if reply {
                connection.send(serialize(&error_frame(err, None)));
            }
            broker.transport_error(&session_id, err);
        }
    }

    connection.close();
    if !writer_done {
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut writer_task).await {
            Ok(written) => {
                if let Err(e) = flatten(written) {
                    tracing::debug!(session_id = %session_id, error = %e, "writer ended with error");
                }
            }
            Err(_) => {
                tracing::warn!(session_id = %session_id, "output not drained, aborting writer");
                writer_task.abort();
            }
        }
    }
    connection.mark_closed();

    result
}

/// Accept TCP connections forever, serving each on its own task.
///
/// # Errors
///
/// Returns an error only if accepting fails.
pub async fn serve_tcp(broker: Broker, listener: TcpListener) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        tracing::debug!(%local, path = %broker.config().path, "serving STOMP over TCP");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }
        tracing::debug!(%peer, "accepted connection");

        let broker = broker.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_stream(broker, stream).await {
                tracing::warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

async fn read_loop<R>(broker: &Broker, session_id: &str, mut reader: R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::with_max_frame_size(broker.config().max_frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()), // Peer closed
            Ok(n) => n,
            Err(e) => return Err(BrokerError::Io(e)),
        };

        for item in frames.push(&buf[..n])? {
            let payload: &[u8] = match &item {
                StreamItem::Heartbeat => HEARTBEAT,
                StreamItem::Frame(frame) => frame,
            };
            match broker.receive(session_id, payload) {
                Ok(()) => {}
                // Torn down by the broker (heartbeat timeout)
                Err(BrokerError::UnknownSession(_)) => return Ok(()),
                // Already answered with ERROR
                Err(e) => tracing::debug!(session_id, error = %e, "frame failed"),
            }
        }
    }
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Outbound>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        let mut close = false;
        for item in batch {
            match item {
                Outbound::Data(payload) => writer.write_all(&payload).await?,
                Outbound::Close => {
                    close = true;
                    break;
                }
            }
        }
        writer.flush().await?;

        if close {
            break;
        }
    }

    writer.shutdown().await?;
    Ok(())
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| BrokerError::Transport(format!("writer task failed: {}", e)))?
}
