//! The per-connection handle and the loop that drives a [`WebSocketHandler`].

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::{self, Message as Frame};
use tracing::debug;

use super::{ConnectionStatus, Message, SendError, WebSocketHandler};

type FrameSink = Pin<Box<dyn Sink<Frame, Error = tungstenite::Error> + Send>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const PENDING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// A live WebSocket connection.
///
/// Cheap to clone. Clones can be moved into timers or other tasks that
/// [`dispatch`](Self::dispatch) events back into the connection; once the
/// socket is gone every operation fails with [`SendError::Closed`], which is
/// the cue for such tasks to stop.
pub struct Connection<E> {
    shared: Arc<Shared<E>>,
}

struct Shared<E> {
    id: u64,
    status: AtomicU8,
    sink: Mutex<FrameSink>,
    events: mpsc::UnboundedSender<E>,
}

impl<E> Clone for Connection<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<E> Connection<E> {
    fn new(sink: FrameSink, events: mpsc::UnboundedSender<E>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                status: AtomicU8::new(PENDING),
                sink: Mutex::new(sink),
                events,
            }),
        }
    }

    /// Process-unique connection id, for logs.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.shared.status.load(Ordering::Acquire) {
            PENDING => ConnectionStatus::Pending,
            OPEN => ConnectionStatus::Open,
            _ => ConnectionStatus::Closed,
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let value = match status {
            ConnectionStatus::Pending => PENDING,
            ConnectionStatus::Open => OPEN,
            ConnectionStatus::Closed => CLOSED,
        };
        self.shared.status.store(value, Ordering::Release);
    }

    fn ensure_not_closed(&self) -> Result<(), SendError> {
        match self.status() {
            ConnectionStatus::Closed => Err(SendError::Closed),
            _ => Ok(()),
        }
    }

    /// Sends a text frame to the client.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send(Frame::text(text.into())).await
    }

    /// Sends a binary frame to the client.
    pub async fn send_bytes(&self, bytes: impl Into<Bytes>) -> Result<(), SendError> {
        self.send(Frame::binary(bytes.into())).await
    }

    async fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.ensure_not_closed()?;
        let mut sink = self.shared.sink.lock().await;
        sink.send(frame).await.map_err(SendError::from)
    }

    /// Queues an application event for the connection's `on_event`.
    ///
    /// Events dispatched while `on_open` is still running are delivered
    /// after it returns.
    pub fn dispatch(&self, event: E) -> Result<(), SendError> {
        self.ensure_not_closed()?;
        self.shared.events.send(event).map_err(|_| SendError::Closed)
    }

    /// Starts the closing handshake. `on_close` runs once the client answers.
    pub async fn close(&self) -> Result<(), SendError> {
        self.ensure_not_closed()?;
        let mut sink = self.shared.sink.lock().await;
        sink.close().await.map_err(SendError::from)
    }
}

/// Drives one connection: `on_open`, then `on_event` per message until the
/// socket ends, then `on_close` exactly once.
pub(crate) async fn run<H, S>(handler: Arc<H>, socket: S)
where
    H: WebSocketHandler,
    S: Stream<Item = Result<Frame, tungstenite::Error>>
        + Sink<Frame, Error = tungstenite::Error>
        + Send
        + 'static,
{
    let (sink, mut frames) = socket.split();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let conn = Connection::new(Box::pin(sink), events_tx);
    debug!(connection = conn.id(), "websocket opened");

    let mut state = handler.on_open(&conn).await;
    conn.set_status(ConnectionStatus::Open);

    loop {
        // Client frames win over queued events when both are ready.
        let message = tokio::select! {
            biased;
            frame = frames.next() => match frame {
                Some(Ok(Frame::Text(text))) => Message::Text(text.as_str().to_owned()),
                Some(Ok(Frame::Binary(bytes))) => Message::Bytes(bytes),
                Some(Ok(Frame::Close(_))) | None => break,
                // Pings are answered by the protocol layer.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(connection = conn.id(), error = %e, "websocket read failed");
                    break;
                }
            },
            Some(event) = events.recv() => Message::Event(event),
        };
        state = handler.on_event(&conn, state, message).await;
    }

    conn.set_status(ConnectionStatus::Closed);
    events.close();
    handler.on_close(&conn, state).await;

    // Flushes the reply to a client-initiated close. The peer may already be gone.
    let _ = conn.shared.sink.lock().await.close().await;
    debug!(connection = conn.id(), "websocket closed");
}
