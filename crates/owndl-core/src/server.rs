//! WebSocket relay endpoint
//!
//! Accepts worker connections, performs the registration handshake and feeds
//! every reply through the [`ResponseHandler`]. Each connection runs in its
//! own task with a dedicated writer draining the registry's outbound channel.

use crate::error::RelayError;
use crate::handler::ResponseHandler;
use crate::registry::{ConnectionId, ConnectionRegistry};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Close reason sent to workers with a bad first message.
pub const INVALID_REGISTRATION_REASON: &str = "Invalid registration";

/// Lifecycle of one worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, waiting for `platform:<name>`.
    AwaitingRegistration,
    /// Registered, waiting for the next reply.
    Idle,
    /// A reply is being decoded and delivered.
    AwaitingDecode,
    /// Removed from the registry.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingRegistration => "awaiting_registration",
            Self::Idle => "idle",
            Self::AwaitingDecode => "awaiting_decode",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct ConnectionTrace {
    addr: SocketAddr,
    state: ConnectionState,
}

impl ConnectionTrace {
    const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: ConnectionState::AwaitingRegistration,
        }
    }

    fn enter(&mut self, next: ConnectionState) {
        debug!(addr = %self.addr, from = %self.state, to = %next, "Connection state change");
        self.state = next;
    }
}

/// The relay's WebSocket listener.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<ResponseHandler>,
}

impl RelayServer {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Io` if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<ResponseHandler>,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            registry,
            handler,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Io` if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Relay listening for workers");
        }

        loop {
            let accepted = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&self.registry);
                    let handler = Arc::clone(&self.handler);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, addr, registry, handler, shutdown).await;
                    });
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            }
        }

        info!("Relay server stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<ResponseHandler>,
    shutdown: CancellationToken,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket upgrade failed");
            return;
        }
    };
    debug!(%addr, "WebSocket connection established");

    let mut trace = ConnectionTrace::new(addr);
    let (mut write, mut read) = ws_stream.split();

    let Some(registration) = read_registration(&mut read, addr).await else {
        return;
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let id = match registry.register(&registration, outbound_tx).await {
        Ok(id) => id,
        Err(e) => {
            warn!(%addr, error = %e, "Rejecting worker");
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: INVALID_REGISTRATION_REASON.into(),
            };
            if let Err(e) = write.send(Message::Close(Some(frame))).await {
                debug!(%addr, error = %e, "Failed to send close frame");
            }
            return;
        }
    };
    trace.enter(ConnectionState::Idle);

    let writer = spawn_writer(write, outbound_rx, id);
    serve_replies(&mut read, id, &handler, &mut trace, &shutdown).await;

    trace.enter(ConnectionState::Closed);
    registry.remove(id).await;
    // Dropping the registry entry closes the outbound channel and ends the writer
    if let Err(e) = writer.await {
        warn!(connection = %id, error = %e, "Writer task failed");
    }
}

/// Waits for the first text frame. Any other first frame counts as an empty
/// registration so the worker still receives the policy close.
async fn read_registration(read: &mut WsSource, addr: SocketAddr) -> Option<String> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                debug!(%addr, "Connection closed before registration");
                return None;
            }
            Some(Ok(_)) => return Some(String::new()),
            Some(Err(e)) => {
                warn!(%addr, error = %e, "Read error before registration");
                return None;
            }
        }
    }
}

fn spawn_writer(
    mut write: WsSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    id: ConnectionId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if let Err(e) = write.send(Message::Text(payload.into())).await {
                warn!(connection = %id, error = %e, "Failed to write to worker");
                break;
            }
        }
        let _ = write.close().await;
    })
}

async fn serve_replies(
    read: &mut WsSource,
    id: ConnectionId,
    handler: &ResponseHandler,
    trace: &mut ConnectionTrace,
    shutdown: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                trace.enter(ConnectionState::AwaitingDecode);
                let outcome = handler.handle(id, text.as_str()).await;
                debug!(connection = %id, ?outcome, "Reply handled");
                trace.enter(ConnectionState::Idle);
            }
            Some(Ok(Message::Close(_))) | None => {
                info!(connection = %id, "Worker disconnected");
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(connection = %id, "Ignoring binary frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(connection = %id, error = %e, "Worker connection error");
                break;
            }
        }
    }
}
