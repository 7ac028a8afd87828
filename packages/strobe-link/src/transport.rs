// Line transport - one TCP connection to the controller
//
// The connection is split: the write half stays with `LineTransport` for
// `send`, the read half moves into a dedicated reader task. The reader only
// ever posts `TransportEvent`s into a channel; it never touches any other
// state, so the consumer (the session loop) remains the single owner of
// everything mutable.

use crate::error::TransportError;
use crate::protocol::{encode_line, LineBuffer};
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Connection establishment deadline. Reads have no deadline once connected.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const READ_CHUNK_SIZE: usize = 1024;

/// Events posted by the reader task, in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum TransportEvent {
    /// A decoded line, trailing whitespace trimmed
    Line(String),
    /// Always the last event of a connection. `reason` carries the I/O fault
    /// when the stream did not end cleanly.
    Disconnected { reason: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

struct Connection {
    peer: String,
    writer: OwnedWriteHalf,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// Single-connection line-protocol client.
///
/// Every successful `connect` hands back the receiving end of a channel
/// dedicated to that connection, so events of a replaced connection can never
/// be mistaken for events of the current one.
pub struct LineTransport {
    connection: Option<Connection>,
    connect_timeout: Duration,
}

impl Default for LineTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LineTransport {
    pub fn new() -> Self {
        Self {
            connection: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connect to `host:port`, replacing any existing connection, and return
    /// the stream of events for the new connection.
    ///
    /// A single attempt is made; retrying is left to the caller.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError> {
        self.close();

        let addr = format!("{}:{}", host, port);
        log::info!("Connecting to {}", addr);

        let stream = match tokio::time::timeout(self.connect_timeout, open_stream(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::Connection {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TransportError::Connection {
                    addr,
                    reason: format!("timed out after {:?}", self.connect_timeout),
                })
            }
        };

        let (reader, writer) = stream.into_split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        tokio::spawn(read_lines(
            reader,
            Arc::clone(&alive),
            cancel.clone(),
            events_tx,
        ));

        self.connection = Some(Connection {
            peer: addr.clone(),
            writer,
            alive,
            cancel,
        });

        log::info!("Connected to {}", addr);
        Ok(events_rx)
    }

    /// Send `text` exactly as given, adding a single `\n` if it lacks one.
    pub async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let live = self
            .connection
            .as_ref()
            .map(|c| c.alive.load(Ordering::Acquire))
            .unwrap_or(false);
        if !live {
            // The reader may have seen EOF already; release what is left.
            self.close();
            return Err(TransportError::NotConnected);
        }

        let conn = self.connection.as_mut().ok_or(TransportError::NotConnected)?;
        let data = encode_line(text);
        conn.writer.write_all(&data).await?;
        conn.writer.flush().await?;
        log::debug!(">> {}", text.trim_end_matches('\n'));
        Ok(())
    }

    /// Drop the connection. Idempotent.
    ///
    /// The reader task is cancelled and still delivers its `Disconnected` event.
    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            log::info!("Closing connection to {}", conn.peer);
            conn.alive.store(false, Ordering::Release);
            conn.cancel.cancel();
            // Dropping the write half shuts down the sending direction.
            drop(conn.writer);
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.connection {
            Some(conn) if conn.alive.load(Ordering::Acquire) => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// `host:port` of the live connection.
    pub fn peer(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .filter(|c| c.alive.load(Ordering::Acquire))
            .map(|c| c.peer.as_str())
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn open_stream(addr: &str) -> io::Result<TcpStream> {
    let mut last_err = None;
    for target in tokio::net::lookup_host(addr).await? {
        match connect_one(target).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("Connect to {} failed: {}", target, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address resolved for {}", addr))
    }))
}

async fn connect_one(target: SocketAddr) -> io::Result<TcpStream> {
    let socket = if target.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Err(e) = socket.set_keepalive(true) {
        log::debug!("SO_KEEPALIVE unavailable: {}", e);
    }
    socket.connect(target).await
}

/// Reader task body: split the byte stream into lines until EOF, an I/O
/// fault, or cancellation, then report the disconnect.
async fn read_lines(
    mut reader: OwnedReadHalf,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    let reason = 'read: loop {
        let read = tokio::select! {
            biased;

            _ = cancel.cancelled() => break 'read None,
            read = reader.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                log::info!("Connection closed by peer");
                break 'read None;
            }
            Ok(n) => {
                for line in lines.push(&chunk[..n]) {
                    log::debug!("<< {}", line);
                    if events.send(TransportEvent::Line(line)).is_err() {
                        log::warn!("Line receiver dropped, stopping reader");
                        break 'read None;
                    }
                }
            }
            Err(e) => {
                log::error!("Read error: {}", e);
                break 'read Some(e.to_string());
            }
        }
    };

    alive.store(false, Ordering::Release);
    drop(reader);

    if lines.pending_len() > 0 {
        log::debug!("Discarding {} bytes of unterminated input", lines.pending_len());
    }
    let _ = events.send(TransportEvent::Disconnected { reason });
}
