use crate::protocol::OutboundFrame;
use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Close code reported when the connection ends without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when the server's close frame carries no status
pub const NO_STATUS: u16 = 1005;

/// Identity of one connection attempt; increases monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle and data events of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened { id: ConnectionId },
    Frame { id: ConnectionId, text: String },
    Closed {
        id: ConnectionId,
        code: u16,
        reason: String,
    },
    Errored { id: ConnectionId, error: String },
}

impl TransportEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            TransportEvent::Opened { id }
            | TransportEvent::Frame { id, .. }
            | TransportEvent::Closed { id, .. }
            | TransportEvent::Errored { id, .. } => *id,
        }
    }
}

/// Bidirectional message channel to the feed server
pub trait Transport {
    /// Start a new connection, superseding any previous one
    fn open(&mut self) -> ConnectionId;

    /// Queue a frame on the current connection
    fn send(&mut self, frame: OutboundFrame) -> Result<()>;

    /// Close the current connection, if any
    fn close(&mut self);
}

struct ActiveConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
}

/// WebSocket transport; each connection runs as its own task and posts
/// `TransportEvent`s into the event loop
pub struct WsTransport<E> {
    url: String,
    events: mpsc::UnboundedSender<E>,
    next_id: u64,
    active: Option<ActiveConnection>,
}

impl<E> WsTransport<E>
where
    E: From<TransportEvent> + Send + 'static,
{
    pub fn new(url: impl Into<String>, events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            url: url.into(),
            events,
            next_id: 0,
            active: None,
        }
    }
}

impl<E> Transport for WsTransport<E>
where
    E: From<TransportEvent> + Send + 'static,
{
    fn open(&mut self) -> ConnectionId {
        self.close();

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        info!(connection_id = %id, url = %self.url, "Connecting to feed");
        tokio::spawn(run_connection(
            id,
            self.url.clone(),
            outbound_rx,
            self.events.clone(),
        ));

        self.active = Some(ActiveConnection {
            id,
            outbound: outbound_tx,
        });
        id
    }

    fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        let active = self
            .active
            .as_ref()
            .context("No active feed connection")?;
        let text = frame.to_text().context("Failed to encode frame")?;
        active
            .outbound
            .send(text)
            .map_err(|_| anyhow!("Connection {} has already ended", active.id))
    }

    fn close(&mut self) {
        // Dropping the sender makes the task send a close frame and exit
        if let Some(active) = self.active.take() {
            debug!(connection_id = %active.id, "Closing feed connection");
        }
    }
}

fn emit<E: From<TransportEvent>>(events: &mpsc::UnboundedSender<E>, event: TransportEvent) {
    let _ = events.send(E::from(event));
}

fn emit_failure<E: From<TransportEvent>>(
    events: &mpsc::UnboundedSender<E>,
    id: ConnectionId,
    error: String,
) {
    emit(events, TransportEvent::Errored { id, error });
    emit(
        events,
        TransportEvent::Closed {
            id,
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        },
    );
}

async fn run_connection<E>(
    id: ConnectionId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<E>,
) where
    E: From<TransportEvent> + Send + 'static,
{
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Feed connection failed");
            emit_failure(&events, id, e.to_string());
            return;
        }
    };

    info!(connection_id = %id, "Feed connection established");
    emit(&events, TransportEvent::Opened { id });

    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        emit(&events, TransportEvent::Frame { id, text });
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS, String::new()));
                        info!(connection_id = %id, code, reason = %reason, "Feed closed by server");
                        emit(&events, TransportEvent::Closed { id, code, reason });
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite; binary is not part of the feed
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %id, error = %e, "Feed connection error");
                        emit_failure(&events, id, e.to_string());
                        break;
                    }
                    None => {
                        emit(&events, TransportEvent::Closed {
                            id,
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                        });
                        break;
                    }
                }
            }

            outgoing = outbound.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!(connection_id = %id, error = %e, "Failed to send frame");
                            emit_failure(&events, id, e.to_string());
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        debug!(connection_id = %id, "Feed connection closed by client");
                        break;
                    }
                }
            }
        }
    }
}
