//! WebSocket upgrade and per-connection state machines.
//!
//! A WebSocket endpoint is a [`WebSocketHandler`]: three callbacks around a
//! state value the framework threads through them.
//!
//! ```text
//!            on_open            on_event (per message)           on_close
//! Pending ─────────────▶ Open ───────────────────────▶ Open ─────────────▶ Closed
//! ```
//!
//! Client frames ([`Message::Text`], [`Message::Bytes`]) and events the
//! application injects with [`Connection::dispatch`] ([`Message::Event`]) go
//! through the same `on_event` reducer, one at a time, in arrival order.
//! Only the connection's own task ever calls the callbacks, so the state is
//! never shared and never touched concurrently.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether::realtime::{Connection, Message, WebSocketHandler, websocket};
//! use tether::{Request, Response};
//!
//! struct Clock;
//!
//! struct Tick;
//!
//! impl WebSocketHandler for Clock {
//!     type State = (u64, tokio::task::JoinHandle<()>);
//!     type Event = Tick;
//!
//!     async fn on_open(&self, conn: &Connection<Tick>) -> Self::State {
//!         let conn = conn.clone();
//!         let timer = tokio::spawn(async move {
//!             let mut interval = tokio::time::interval(Duration::from_secs(1));
//!             loop {
//!                 interval.tick().await;
//!                 if conn.dispatch(Tick).is_err() {
//!                     break;
//!                 }
//!             }
//!         });
//!         (0, timer)
//!     }
//!
//!     async fn on_event(
//!         &self,
//!         conn: &Connection<Tick>,
//!         (ticks, timer): Self::State,
//!         message: Message<Tick>,
//!     ) -> Self::State {
//!         match message {
//!             Message::Event(Tick) => {
//!                 let _ = conn.send_text(format!("tick {}", ticks + 1)).await;
//!                 (ticks + 1, timer)
//!             }
//!             Message::Text(_) | Message::Bytes(_) => (ticks, timer),
//!         }
//!     }
//!
//!     async fn on_close(&self, _conn: &Connection<Tick>, (_, timer): Self::State) {
//!         timer.abort();
//!     }
//! }
//!
//! async fn handle(req: Request) -> Response {
//!     match req.path_segments().as_slice() {
//!         ["clock"] => websocket(&req, Clock),
//!         _ => Response::not_found(),
//!     }
//! }
//! ```

use bytes::Bytes;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub mod connection;
pub mod upgrade;

pub use connection::Connection;
pub use upgrade::{WebSocketUpgrade, websocket};

/// Input to [`WebSocketHandler::on_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<E> {
    /// A text frame from the client.
    Text(String),
    /// A binary frame from the client. Never reinterpreted as text.
    Bytes(Bytes),
    /// An event the application injected with [`Connection::dispatch`].
    Event(E),
}

/// Lifecycle position of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake done, `on_open` still running.
    Pending,
    /// `on_open` returned; messages are being delivered.
    Open,
    /// The socket is gone; `on_close` has run or is running.
    Closed,
}

/// Errors from the send-side operations of a [`Connection`].
#[derive(Debug, Error)]
pub enum SendError {
    #[error("websocket connection is closed")]
    Closed,

    #[error("websocket transport error: {0}")]
    Transport(tungstenite::Error),
}

impl From<tungstenite::Error> for SendError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                SendError::Closed
            }
            other => SendError::Transport(other),
        }
    }
}

/// The behaviour of one kind of WebSocket endpoint.
///
/// A fresh state value is produced per connection by `on_open`, replaced by
/// every `on_event`, and finally handed to `on_close`. Implement the methods
/// with `async fn`.
pub trait WebSocketHandler: Send + Sync + 'static {
    /// Per-connection state, owned by the connection's task.
    type State: Send + 'static;
    /// Application events that can be injected with [`Connection::dispatch`].
    type Event: Send + 'static;

    /// Runs once after the handshake; the result is the initial state.
    fn on_open(&self, conn: &Connection<Self::Event>) -> impl Future<Output = Self::State> + Send;

    /// Folds one message into the state.
    fn on_event(
        &self,
        conn: &Connection<Self::Event>,
        state: Self::State,
        message: Message<Self::Event>,
    ) -> impl Future<Output = Self::State> + Send;

    /// Runs once when the socket goes away. Sends from here fail with
    /// [`SendError::Closed`]; use it to release what the state holds.
    fn on_close(
        &self,
        conn: &Connection<Self::Event>,
        state: Self::State,
    ) -> impl Future<Output = ()> + Send {
        let _ = (conn, state);
        async {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_transport_errors_map_to_closed() {
        assert!(matches!(
            SendError::from(tungstenite::Error::ConnectionClosed),
            SendError::Closed
        ));
        assert!(matches!(
            SendError::from(tungstenite::Error::AlreadyClosed),
            SendError::Closed
        ));
        assert!(matches!(
            SendError::from(tungstenite::Error::Io(std::io::Error::other("reset"))),
            SendError::Transport(_)
        ));
    }
}
