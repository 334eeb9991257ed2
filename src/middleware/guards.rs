//! Guard middleware: check one property of the request, then either resume
//! the chain untouched or answer with a terminal error response.

use std::pin::Pin;

use crate::{
    Method, Request, Response,
    middleware::{Middleware, Next},
};

/// Rejects requests whose method is not in the allowed set with `405`.
///
/// The response carries an `Allowed` header listing the permitted methods,
/// comma-joined and uppercased.
///
/// ```rust
/// use tether::Method;
/// use tether::middleware::{Pipeline, RequireMethod};
///
/// let pipeline = Pipeline::new().wrap(RequireMethod::new([Method::Get, Method::Head]));
/// ```
pub struct RequireMethod {
    allowed: Vec<Method>,
}

impl RequireMethod {
    pub fn new(allowed: impl IntoIterator<Item = Method>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl Middleware for RequireMethod {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        if self.allowed.contains(req.method()) {
            return Box::pin(next.run(req));
        }

        tracing::debug!(method = %req.method(), path = req.path(), "method not allowed");
        let response = Response::method_not_allowed(&self.allowed);
        Box::pin(async move { response })
    }
}

/// Rejects requests whose media type is not in the accepted set with `415`.
///
/// Only the media type is compared (`application/json; charset=utf-8` matches
/// `application/json`), case-insensitively. Requests without a
/// `Content-Type` are rejected too. The response lists the accepted types in
/// an `Accept` header.
pub struct RequireContentType {
    accepted: Vec<String>,
}

impl RequireContentType {
    pub fn new<S: Into<String>>(accepted: impl IntoIterator<Item = S>) -> Self {
        Self {
            accepted: accepted
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Middleware for RequireContentType {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let matches = req
            .content_type()
            .is_some_and(|media| self.accepted.contains(&media));
        if matches {
            return Box::pin(next.run(req));
        }

        tracing::debug!(
            content_type = req.headers().get("content-type").unwrap_or("none"),
            path = req.path(),
            "unsupported media type"
        );
        let response = Response::unsupported_media_type(&self.accepted);
        Box::pin(async move { response })
    }
}
