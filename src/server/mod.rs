//! Async TCP server using Tokio and hyper.
//!
//! Accepts TCP connections and serves each one with hyper's HTTP/1.1
//! connection driver (keep-alive and protocol upgrades included), routing
//! every request through the [`adapter`] into a [`Handler`].

pub mod adapter;
pub mod config;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::middleware::Handler;

pub use config::ServerConfig;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },
}

/// The tether HTTP server.
///
/// Binds to a TCP address and dispatches incoming requests to a [`Handler`],
/// usually one built with [`Pipeline`](crate::middleware::Pipeline).
///
/// # Examples
///
/// ```rust,no_run
/// use tether::middleware::{LogRequests, Pipeline, RescueCrashes};
/// use tether::{Response, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     tether::logging::init();
///     let app = Pipeline::new()
///         .wrap(LogRequests)
///         .wrap(RescueCrashes)
///         .handler(|_req| async { Response::new(StatusCode::Ok).body("Hello!") });
///
///     Server::bind("127.0.0.1:8080").await?.run(app).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
}

impl Server {
    /// Binds the server to the given TCP address with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        Self::with_config(ServerConfig::default().with_addr(addr.as_ref())).await
    }

    /// Binds to `config.addr` and keeps the rest of `config` for serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn with_config(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// Each connection gets its own Tokio task; so does every WebSocket
    /// that a response upgrades to. Runs until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, handler: Handler) -> Result<(), ServerError> {
        let max_body_size = self.config.max_body_size;
        info!(address = %self.local_addr, max_body_size, "tether listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let handler = Arc::clone(&handler);
                    async move {
                        Ok::<_, Infallible>(adapter::handle(req, &handler, max_body_size).await)
                    }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await
                {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                } else {
                    debug!(peer = %peer_addr, "connection closed");
                }
            });
        }
    }
}

/// Serves `handler` on every interface at `port` until the process exits.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the port cannot be bound.
pub async fn serve(port: u16, handler: Handler) -> Result<(), ServerError> {
    let config = ServerConfig::default().with_addr(format!("0.0.0.0:{port}"));
    Server::with_config(config).await?.run(handler).await
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::middleware::Pipeline;
    use crate::{Request, Response, StatusCode};

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().to_string();

        match Server::bind(&addr).await {
            Err(ServerError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            Err(other) => panic!("expected a bind error, got {other}"),
            Ok(_) => panic!("expected a bind error"),
        }
    }

    #[tokio::test]
    async fn serves_keep_alive_requests() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let app = Pipeline::new().handler(|req: Request| async move {
            Response::new(StatusCode::Ok).body(req.path().to_owned())
        });
        tokio::spawn(server.run(app));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /one HTTP/1.1\r\nHost: test\r\n\r\nGET /two HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert_eq!(raw.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(raw.contains("/one"));
        assert!(raw.ends_with("/two"));
    }
}
