//! # tether
//!
//! A small async HTTP framework on top of hyper: one handler function,
//! continuation-passing middleware around it, one-shot body readers, and
//! WebSocket endpoints written as state machines.
//!
//! There is no router. Handlers match on [`Request::path_segments`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::middleware::{LogRequests, Pipeline, RescueCrashes, ServeStatic, require_json};
//! use tether::{Method, Request, Response, Server, ServerConfig};
//!
//! #[derive(serde::Deserialize, serde::Serialize)]
//! struct Note {
//!     text: String,
//! }
//!
//! async fn app(req: Request) -> Response {
//!     match (req.method(), req.path_segments().as_slice()) {
//!         (Method::Get, []) => Response::html("<h1>Hello, World!</h1>"),
//!         (Method::Post, ["notes"]) => {
//!             require_json(&req, |note: Note| async move { Response::json(&note) }).await
//!         }
//!         _ => Response::not_found(),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tether::logging::init();
//!
//!     let handler = Pipeline::new()
//!         .wrap(LogRequests)
//!         .wrap(RescueCrashes)
//!         .wrap(ServeStatic::new("/static", "./public"))
//!         .handler(app);
//!
//!     let server = Server::with_config(ServerConfig::from_env()?).await?;
//!     println!("Listening on http://{}", server.local_addr());
//!     server.run(handler).await?;
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod logging;
pub mod middleware;
pub mod realtime;
pub mod server;

pub use http::{Headers, Method, Request, Response, ResponseBody, StatusCode};
pub use middleware::{Handler, Pipeline};
pub use server::{Server, ServerConfig, ServerError, serve};
