//! Continuation-style body readers.
//!
//! Each helper reads the body once, and either hands the decoded value to the
//! continuation or answers for it:
//!
//! | Failure                    | Response                 |
//! |----------------------------|--------------------------|
//! | wrong media type           | `415` with `Accept`      |
//! | `BodyError::Parse`/`Read`  | `400`                    |
//! | `BodyError::TooLarge`      | `413`                    |
//! | `BodyError::AlreadyRead`   | `500`, logged as a bug   |
//!
//! ```rust,no_run
//! use tether::{Request, Response, middleware::require_form};
//!
//! async fn signup(req: Request) -> Response {
//!     require_form(&req, |form| async move {
//!         match form.values.as_slice() {
//!             [(email_key, email), (name_key, name)] if email_key == "email" && name_key == "name" => {
//!                 Response::html(format!("welcome {name} <{email}>"))
//!             }
//!             _ => Response::bad_request(),
//!         }
//!     })
//!     .await
//! }
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::http::{BodyError, FormData};
use crate::{Request, Response};

const JSON: &str = "application/json";
const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Reads the body as text and passes it to `next`.
pub async fn require_text<F, Fut>(req: &Request, next: F) -> Response
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Response>,
{
    match req.read_text().await {
        Ok(text) => next(text).await,
        Err(e) => body_error_response(req, e),
    }
}

/// Reads the body as raw bytes and passes them to `next`.
pub async fn require_bytes<F, Fut>(req: &Request, next: F) -> Response
where
    F: FnOnce(Bytes) -> Fut,
    Fut: Future<Output = Response>,
{
    match req.read_bytes().await {
        Ok(bytes) => next(bytes).await,
        Err(e) => body_error_response(req, e),
    }
}

/// Requires `application/json`, decodes the body as `T` and passes it to `next`.
///
/// # Arguments
///
/// * `req` - The request whose body is read; the body is consumed even when
///   decoding fails.
/// * `next` - Continuation receiving the decoded value.
///
/// # Returns
///
/// Whatever `next` returns, or `415`/`400`/`413`/`500` when the media type
/// or the body is unusable (see the module table).
pub async fn require_json<T, F, Fut>(req: &Request, next: F) -> Response
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Response>,
{
    if req.content_type().as_deref() != Some(JSON) {
        return Response::unsupported_media_type(&[JSON]);
    }
    match req.read_json::<T>().await {
        Ok(value) => next(value).await,
        Err(e) => body_error_response(req, e),
    }
}

/// Requires an urlencoded or multipart body and passes the sorted fields to `next`.
pub async fn require_form<F, Fut>(req: &Request, next: F) -> Response
where
    F: FnOnce(FormData) -> Fut,
    Fut: Future<Output = Response>,
{
    if !matches!(req.content_type().as_deref(), Some(URLENCODED | MULTIPART)) {
        return Response::unsupported_media_type(&[URLENCODED, MULTIPART]);
    }
    match req.read_form().await {
        Ok(form) => next(form).await,
        Err(e) => body_error_response(req, e),
    }
}

fn body_error_response(req: &Request, err: BodyError) -> Response {
    match err {
        BodyError::AlreadyRead => {
            error!(method = %req.method(), path = req.path(), error = %err, "request body consumed twice");
            Response::internal_server_error()
        }
        BodyError::TooLarge { .. } => {
            debug!(path = req.path(), error = %err, "rejecting request body");
            Response::payload_too_large()
        }
        BodyError::Parse(_) | BodyError::Read(_) => {
            debug!(path = req.path(), error = %err, "rejecting request body");
            Response::bad_request()
        }
    }
}
