//! Crash containment for the rest of the pipeline.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt;

use crate::{
    Request, Response,
    middleware::{Middleware, Next},
};

/// Turns a panic anywhere downstream into an empty `500`.
///
/// The panic message goes to the log at `error` level; the client only ever
/// sees the bare status. Install this near the top of the pipeline, under
/// [`LogRequests`](super::LogRequests) so the 500 still gets logged.
///
/// This bounds faults, not time: a handler that never finishes is not
/// interrupted.
pub struct RescueCrashes;

impl Middleware for RescueCrashes {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.path().to_owned();

            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    tracing::error!(
                        %method,
                        path = %path,
                        panic = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                    Response::internal_server_error()
                }
            }
        })
    }
}

/// Extracts the message carried by a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
