//! Request/response logging.

use std::pin::Pin;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::{
    Request, Response,
    middleware::{Middleware, Next},
};

/// Built-in middleware that logs each request and its outcome.
///
/// Emits one `info` event when the request arrives (method, scheme, host,
/// path, query) and one event once the downstream response is ready, with
/// the status and elapsed milliseconds. The outcome event's level tracks the
/// status class so the subscriber colors it: `info` for 1xx/2xx/3xx and
/// upgrades, `warn` for 4xx, `error` for 5xx. Upgrades are logged as
/// `websocket started` rather than with a status.
///
/// `LogRequests` never short-circuits. Place it outermost so the timing
/// covers the whole chain.
///
/// # Examples
///
/// ```rust,no_run
/// use tether::middleware::{LogRequests, Pipeline, RescueCrashes};
///
/// let pipeline = Pipeline::new().wrap(LogRequests).wrap(RescueCrashes);
/// ```
pub struct LogRequests;

impl Middleware for LogRequests {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().as_str().to_owned();
            let path = req.path().to_owned();

            info!(
                method = %method,
                scheme = req.scheme(),
                host = req.host(),
                path = %path,
                query = req.query_string().unwrap_or_default(),
                "request"
            );

            let response = next.run(req).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            let status = response.status();

            if response.is_websocket() {
                info!(method = %method, path = %path, elapsed_ms, "websocket started");
            } else if status.is_server_error() {
                error!(method = %method, path = %path, status = status.as_u16(), elapsed_ms, "response");
            } else if status.is_client_error() {
                warn!(method = %method, path = %path, status = status.as_u16(), elapsed_ms, "response");
            } else {
                info!(method = %method, path = %path, status = status.as_u16(), elapsed_ms, "response");
            }

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::{ResponseBody, StatusCode};

    #[tokio::test]
    async fn response_passes_through_unchanged() {
        for status in [StatusCode::Ok, StatusCode::NotFound, StatusCode::BadGateway] {
            let app = Pipeline::new()
                .wrap(LogRequests)
                .handler(move |_req| async move { Response::new(status).body("body") });

            let response = app(Request::builder().path("/x").query("a=1").build()).await;

            assert_eq!(response.status(), status);
            assert!(matches!(response.content(), ResponseBody::Text(t) if t == "body"));
        }
    }
}
