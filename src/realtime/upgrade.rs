//! The HTTP side of a WebSocket: validating the upgrade request and
//! handing the connection to a handler once the host switches protocols.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing::{debug, error, warn};

use super::{WebSocketHandler, connection};
use crate::{Request, Response, StatusCode};

type Session =
    Box<dyn FnOnce(WebSocketStream<TokioIo<Upgraded>>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A handler bound to a pending upgrade, carried by a `101` response.
///
/// The server starts it after writing the response head; until then it is
/// inert and dropping it just drops the upgrade.
pub struct WebSocketUpgrade {
    on_upgrade: OnUpgrade,
    session: Session,
}

impl fmt::Debug for WebSocketUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketUpgrade").finish_non_exhaustive()
    }
}

impl WebSocketUpgrade {
    /// Waits for the host to release the connection, then runs the handler on it.
    pub(crate) async fn run(self) {
        match self.on_upgrade.await {
            Ok(upgraded) => {
                let socket = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
                (self.session)(socket).await;
            }
            Err(e) => warn!(error = %e, "websocket upgrade failed"),
        }
    }
}

/// Answers a WebSocket upgrade request with `handler`.
///
/// # Arguments
///
/// * `req` - The handshake request. Its pending upgrade is taken, so a second
///   call on the same request gets a `500`.
/// * `handler` - The endpoint; each accepted connection gets its own state
///   from [`WebSocketHandler::on_open`].
///
/// # Returns
///
/// `426 Upgrade Required` when the request is not a WebSocket handshake: it
/// lacks `Upgrade: websocket`, an `upgrade` token in `Connection`, or
/// `Sec-WebSocket-Key`. Otherwise the `101 Switching Protocols` response;
/// the server runs `handler` on the connection once it has been sent.
pub fn websocket<H: WebSocketHandler>(req: &Request, handler: H) -> Response {
    let headers = req.headers();
    let upgrade_websocket = headers
        .get("upgrade")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    let connection_upgrade = headers.get("connection").is_some_and(|v| {
        v.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    });
    let key = headers.get("sec-websocket-key").map(str::trim);

    let (true, true, Some(key)) = (upgrade_websocket, connection_upgrade, key) else {
        debug!(path = req.path(), "not a websocket handshake");
        return Response::upgrade_required();
    };

    let Some(on_upgrade) = req.take_upgrade() else {
        error!(path = req.path(), "connection cannot be upgraded");
        return Response::internal_server_error();
    };

    let accept = derive_accept_key(key.as_bytes());
    let handler = Arc::new(handler);
    let session: Session = Box::new(
        move |socket| -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(connection::run(handler, socket))
        },
    );

    Response::new(StatusCode::SwitchingProtocols)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Accept", accept)
        .websocket(WebSocketUpgrade { on_upgrade, session })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{Connection, Message};

    struct Silent;

    impl WebSocketHandler for Silent {
        type State = ();
        type Event = ();

        async fn on_open(&self, _conn: &Connection<()>) {}

        async fn on_event(&self, _conn: &Connection<()>, _state: (), _message: Message<()>) {}
    }

    fn handshake(headers: &[(&str, &str)]) -> Request {
        let mut native = hyper::Request::builder().body(()).unwrap();
        let mut builder = Request::builder()
            .path("/ws")
            .upgrade(hyper::upgrade::on(&mut native));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.build()
    }

    const VALID: [(&str, &str); 3] = [
        ("Upgrade", "websocket"),
        ("Connection", "keep-alive, Upgrade"),
        ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
    ];

    #[test]
    fn valid_handshake_switches_protocols() {
        let response = websocket(&handshake(&VALID), Silent);

        assert_eq!(response.status(), StatusCode::SwitchingProtocols);
        assert!(response.is_websocket());
        assert_eq!(response.headers().get("upgrade"), Some("websocket"));
        assert_eq!(response.headers().get("connection"), Some("Upgrade"));
        assert_eq!(
            response.headers().get("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }

    #[test]
    fn upgrade_header_is_case_insensitive() {
        let req = handshake(&[
            ("Upgrade", "WebSocket"),
            ("Connection", "upgrade"),
            ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
        ]);
        assert!(websocket(&req, Silent).is_websocket());
    }

    #[test]
    fn plain_request_gets_426() {
        let response = websocket(&handshake(&[]), Silent);
        assert_eq!(response.status(), StatusCode::UpgradeRequired);
        assert_eq!(response.headers().get("upgrade"), Some("websocket"));
        assert!(!response.is_websocket());
    }

    #[test]
    fn missing_key_gets_426() {
        let response = websocket(&handshake(&VALID[..2]), Silent);
        assert_eq!(response.status(), StatusCode::UpgradeRequired);
    }

    #[test]
    fn second_upgrade_of_same_request_is_500() {
        let req = handshake(&VALID);
        assert!(websocket(&req, Silent).is_websocket());
        assert_eq!(
            websocket(&req, Silent).status(),
            StatusCode::InternalServerError
        );
    }
}
