//! The framework's response value.
//!
//! A [`Response`] is a status, a header map and one of a closed set of body
//! kinds. Nothing is serialized here; the host adapter turns each
//! [`ResponseBody`] variant into the matching host body.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;

use super::{Headers, Method, StatusCode};
use crate::realtime::WebSocketUpgrade;

/// What a response carries after its headers.
#[derive(Debug)]
pub enum ResponseBody {
    /// No body at all.
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Bytes(Bytes),
    /// A file on disk, opened and streamed by the adapter when the response is sent.
    File(PathBuf),
    /// Not an HTTP payload: the connection switches to the WebSocket protocol.
    WebSocket(WebSocketUpgrade),
}

/// An HTTP response under construction or on its way back up the pipeline.
///
/// # Examples
///
/// ```
/// use tether::http::{Response, ResponseBody, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert!(matches!(response.content(), ResponseBody::Text(t) if t.len() == 15));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: ResponseBody,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Sets a response header, replacing any previous value under that name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets a text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = ResponseBody::Text(body.into());
        self
    }

    /// Sets a binary body.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Bytes(body.into());
        self
    }

    /// Streams the file at `path` as the body.
    ///
    /// `Content-Type` is inferred from the extension unless already set. The
    /// file is not touched until the adapter sends the response; if it cannot
    /// be opened then, the client gets an empty 500.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", mime_type(&path));
        }
        self.body = ResponseBody::File(path);
        self
    }

    pub(crate) fn websocket(mut self, upgrade: WebSocketUpgrade) -> Self {
        self.body = ResponseBody::WebSocket(upgrade);
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body.
    pub fn content(&self) -> &ResponseBody {
        &self.body
    }

    /// `true` when this response hands the connection over to a WebSocket.
    pub fn is_websocket(&self) -> bool {
        matches!(self.body, ResponseBody::WebSocket(_))
    }

    /// Splits the response into status, headers and body.
    pub fn into_parts(self) -> (StatusCode, Headers, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// `200 OK` with an HTML body.
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(StatusCode::Ok)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(body)
    }

    /// `200 OK` with `value` serialized as JSON.
    ///
    /// A value that fails to serialize yields an empty `500` instead.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => Self::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .body(json),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON response");
                Self::internal_server_error()
            }
        }
    }

    /// `303 See Other` pointing at `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(StatusCode::SeeOther).header("Location", location)
    }

    /// `400 Bad Request` with no body.
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BadRequest)
    }

    /// `404 Not Found` with no body.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NotFound)
    }

    /// `405 Method Not Allowed` listing the permitted methods in `Allowed`.
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let allowed = allowed
            .iter()
            .map(|m| m.as_str().to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(StatusCode::MethodNotAllowed).header("Allowed", allowed)
    }

    /// `413 Payload Too Large` with no body.
    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PayloadTooLarge)
    }

    /// `415 Unsupported Media Type` listing the accepted types in `Accept`.
    pub fn unsupported_media_type<S: AsRef<str>>(accepted: &[S]) -> Self {
        let accepted = accepted
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(StatusCode::UnsupportedMediaType).header("Accept", accepted)
    }

    /// `426 Upgrade Required` asking the client to retry as a WebSocket.
    pub fn upgrade_required() -> Self {
        Self::new(StatusCode::UpgradeRequired).header("Upgrade", "websocket")
    }

    /// `500 Internal Server Error` with no body.
    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::InternalServerError)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

// Content type for a file, by extension.
fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        // Text
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "avif" => "image/avif",

        // Media
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",

        // Other
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "wasm" => "application/wasm",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty_ok() {
        let r = Response::default();
        assert_eq!(r.status(), StatusCode::Ok);
        assert!(matches!(r.content(), ResponseBody::Empty));
        assert!(!r.is_websocket());
    }

    #[test]
    fn custom_header() {
        let r = Response::new(StatusCode::Ok)
            .header("X-Request-Id", "abc-123")
            .body("ok");
        assert_eq!(r.headers().get("x-request-id"), Some("abc-123"));
    }

    #[test]
    fn method_not_allowed_lists_uppercased_methods() {
        let r = Response::method_not_allowed(&[Method::Get, Method::Custom("purge".to_owned())]);
        assert_eq!(r.status(), StatusCode::MethodNotAllowed);
        assert_eq!(r.headers().get("allowed"), Some("GET, PURGE"));
    }

    #[test]
    fn unsupported_media_type_lists_accept() {
        let r = Response::unsupported_media_type(&["application/json", "text/plain"]);
        assert_eq!(r.status().as_u16(), 415);
        assert_eq!(r.headers().get("accept"), Some("application/json, text/plain"));
    }

    #[test]
    fn upgrade_required_names_websocket() {
        let r = Response::upgrade_required();
        assert_eq!(r.status().as_u16(), 426);
        assert_eq!(r.headers().get("upgrade"), Some("websocket"));
    }

    #[test]
    fn file_infers_content_type() {
        let r = Response::new(StatusCode::Ok).file("assets/site.CSS");
        assert_eq!(r.headers().get("content-type"), Some("text/css; charset=utf-8"));
        assert!(matches!(r.content(), ResponseBody::File(p) if p.ends_with("site.CSS")));

        let r = Response::new(StatusCode::Ok).file("blob");
        assert_eq!(r.headers().get("content-type"), Some("application/octet-stream"));
    }

    #[test]
    fn file_keeps_explicit_content_type() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Type", "text/x-custom")
            .file("notes.txt");
        assert_eq!(r.headers().get("content-type"), Some("text/x-custom"));
    }

    #[test]
    fn json_sets_content_type() {
        let r = Response::json(&serde_json::json!({ "ok": true }));
        assert_eq!(r.headers().get("content-type"), Some("application/json"));
        assert!(matches!(r.content(), ResponseBody::Text(t) if t == r#"{"ok":true}"#));
    }

    #[test]
    fn redirect_sets_location() {
        let r = Response::redirect("/login");
        assert_eq!(r.status(), StatusCode::SeeOther);
        assert_eq!(r.headers().get("location"), Some("/login"));
    }
}
