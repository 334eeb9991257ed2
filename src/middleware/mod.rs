//! Middleware pipeline — composable before/after request handler logic.
//!
//! A middleware receives the [`Request`] and a [`Next`] continuation that
//! stands for everything downstream of it: the remaining middleware and,
//! at the very end, the application's handler. It may:
//!
//! - **Pass through** — `next.run(req).await`.
//! - **Short-circuit** — return its own [`Response`] and drop `next`; nothing
//!   downstream runs.
//! - **Decorate** — await `next.run(req)`, then inspect or modify the response.
//!
//! [`Next::run`] takes `self` by value, so a middleware can resume the chain
//! at most once and exactly one response travels back up per request.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain.
//! - [`Pipeline`] — builder that composes middleware around a handler.
//! - [`from_fn`] — adapts an async closure into middleware.
//!
//! ## Built-in middleware
//!
//! - [`RequireMethod`], [`RequireContentType`] — guards.
//! - [`RescueCrashes`] — converts handler panics into empty `500`s.
//! - [`LogRequests`] — timed request/response logging.
//! - [`ServeStatic`] — serves files under a path prefix.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Request, Response};

pub mod guards;
pub mod logger;
pub mod recover;
pub mod require;
pub mod static_files;

pub use guards::{RequireContentType, RequireMethod};
pub use logger::LogRequests;
pub use recover::RescueCrashes;
pub use require::{require_bytes, require_form, require_json, require_text};
pub use static_files::ServeStatic;

/// Type-erased, heap-allocated async function from [`Request`] to [`Response`].
///
/// This is both what the application supplies as its terminal handler and
/// what a finished [`Pipeline`] hands to the server.
pub type Handler =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in a [`Pipeline`] is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Wraps an async function `Request -> Response` as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |req: Request| -> Pin<Box<dyn Future<Output = Response> + Send>> { Box::pin(f(req)) },
    )
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so it cannot be called more
/// than once per middleware invocation. When every middleware has been
/// passed, `run` invokes the terminal handler.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use tether::{Request, Response, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         req: Request,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(req).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
    endpoint: Handler,
}

impl Next {
    /// Creates a `Next` positioned at the start of `middlewares`, ending in `endpoint`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            index: 0,
            endpoint,
        }
    }

    /// Runs the rest of the pipeline and returns its response.
    ///
    /// Advances the internal cursor by one and awaits the handler at the
    /// current position, or the terminal handler once the chain is exhausted.
    pub async fn run(mut self, req: Request) -> Response {
        if let Some(middleware) = self.middlewares.get(self.index).cloned() {
            self.index += 1;
            middleware(req, self).await
        } else {
            (self.endpoint)(req).await
        }
    }
}

/// The core trait for all tether middleware.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
/// - Implementations **should not** hold `&mut` references to shared state across
///   an `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |req: Request, next: Next| middleware.handle(req, next))
}

/// Adapts an async closure `(Request, Next) -> Response` into middleware.
///
/// ```rust,no_run
/// use tether::middleware::{Pipeline, from_fn};
/// use tether::{Response, StatusCode};
///
/// let app = Pipeline::new()
///     .wrap_handler(from_fn(|req, next| async move {
///         if req.headers().contains("authorization") {
///             next.run(req).await
///         } else {
///             Response::new(StatusCode::Unauthorized)
///         }
///     }))
///     .handler(|_req| async { Response::new(StatusCode::Ok).body("secret") });
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |req: Request, next: Next| -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(f(req, next))
        },
    )
}

/// An ordered stack of middleware waiting for its terminal handler.
///
/// Middleware added first is outermost: it sees the request first and the
/// response last, so timing, logging and crash recovery belong near the top.
#[derive(Default)]
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
}

impl Pipeline {
    /// Starts an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a [`Middleware`] inside everything added so far.
    #[must_use]
    pub fn wrap<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.wrap_handler(from_middleware(Arc::new(middleware)))
    }

    /// Adds an already type-erased middleware function.
    #[must_use]
    pub fn wrap_handler(mut self, middleware: MiddlewareHandler) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Returns the number of middleware layers.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if no middleware has been added.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Closes the pipeline with the application's handler.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Async function that answers every request no middleware
    ///   short-circuits. Its future must be `Send`, since hyper runs it on the
    ///   multi-threaded runtime.
    ///
    /// # Returns
    ///
    /// A [`Handler`] that runs the middleware outermost-first and then
    /// `endpoint`. Cloning it is cheap.
    pub fn handler<F, Fut>(self, endpoint: F) -> Handler
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.finish(handler(endpoint))
    }

    /// Closes the pipeline with an already type-erased handler.
    pub fn finish(self, endpoint: Handler) -> Handler {
        let middlewares: Arc<[MiddlewareHandler]> = self.middlewares.into();
        Arc::new(
            move |req: Request| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                let next = Next::new(Arc::clone(&middlewares), Arc::clone(&endpoint));
                Box::pin(next.run(req))
            },
        )
    }
}
