//! The framework's request value.
//!
//! A [`Request`] is built once by the host adapter (or by [`RequestBuilder`]
//! in tests) and is immutable afterwards. The only interior state is the
//! one-shot body stream and the host's pending-upgrade handle, both of which
//! are taken by value the first time they are used.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use hyper::upgrade::OnUpgrade;
use serde::de::DeserializeOwned;

use super::body::{Body, BodyError, FormData, multipart_boundary};
use super::{Headers, Method};

/// An HTTP request as seen by middleware and handlers.
///
/// # Examples
///
/// ```
/// use tether::http::{Method, Request};
///
/// let request = Request::builder()
///     .method(Method::Get)
///     .path("/users/42")
///     .query("tab=posts")
///     .header("Host", "example.com")
///     .build();
///
/// assert_eq!(request.path_segments(), vec!["users", "42"]);
/// assert_eq!(request.query_param("tab").as_deref(), Some("posts"));
/// assert_eq!(request.host(), "example.com");
/// ```
pub struct Request {
    method: Method,
    scheme: String,
    host: String,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Body,
    upgrade: Mutex<Option<OnUpgrade>>,
}

impl Request {
    /// Starts building a request; defaults to `GET http://localhost/`.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the URL scheme (`http` unless the host says otherwise).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the host the request was addressed to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the non-empty `/`-separated path segments.
    ///
    /// Intended for routing by slice pattern:
    /// `match req.path_segments().as_slice() { ["users", id] => … }`.
    pub fn path_segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the percent-decoded query parameters in order of appearance.
    pub fn query(&self) -> Vec<(String, String)> {
        match &self.query {
            Some(query) => url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns the first decoded value for a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the lowercased media type of `Content-Type`, without parameters.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.headers.get("content-type")?;
        let media = raw.split(';').next().unwrap_or_default().trim();
        (!media.is_empty()).then(|| media.to_ascii_lowercase())
    }

    /// Returns the body handle.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Reads the whole body as raw bytes.
    ///
    /// # Errors
    ///
    /// [`BodyError::AlreadyRead`] if any read already ran on this request;
    /// [`BodyError::Read`] or [`BodyError::TooLarge`] if streaming fails.
    pub async fn read_bytes(&self) -> Result<Bytes, BodyError> {
        self.body.read_all().await
    }

    /// Reads the whole body as UTF-8 text.
    pub async fn read_text(&self) -> Result<String, BodyError> {
        let bytes = self.body.read_all().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BodyError::Parse(format!("body is not valid UTF-8: {e}")))
    }

    /// Reads the whole body and deserializes it as JSON.
    pub async fn read_json<T>(&self) -> Result<T, BodyError>
    where
        T: DeserializeOwned,
    {
        let bytes = self.body.read_all().await?;
        serde_json::from_slice(&bytes).map_err(|e| BodyError::Parse(e.to_string()))
    }

    /// Reads and decodes an urlencoded or multipart form body.
    ///
    /// The body is consumed even when the content type turns out to be
    /// unsupported, so the single-read rule holds on every path.
    pub async fn read_form(&self) -> Result<FormData, BodyError> {
        let bytes = self.body.read_all().await?;
        let content_type = self.headers.get("content-type").unwrap_or_default();

        match self.content_type().as_deref() {
            Some("application/x-www-form-urlencoded") => FormData::from_urlencoded(&bytes),
            Some("multipart/form-data") => {
                let boundary = multipart_boundary(content_type).ok_or_else(|| {
                    BodyError::Parse("multipart body without a boundary".to_owned())
                })?;
                FormData::from_multipart(&bytes, boundary)
            }
            other => Err(BodyError::Parse(format!(
                "unsupported form content type: {}",
                other.unwrap_or("none")
            ))),
        }
    }

    /// Takes the host's pending-upgrade handle; `None` after the first call.
    pub(crate) fn take_upgrade(&self) -> Option<OnUpgrade> {
        self.upgrade
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Request`] values; used by the adapter and by tests.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    scheme: String,
    host: Option<String>,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Body,
    max_body_size: Option<usize>,
    upgrade: Option<OnUpgrade>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::Get,
            scheme: "http".to_owned(),
            host: None,
            path: "/".to_owned(),
            query: None,
            headers: Headers::new(),
            body: Body::empty(),
            max_body_size: None,
            upgrade: None,
        }
    }
}

impl RequestBuilder {
    /// Sets the method; defaults to `GET`.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the URL scheme, `http` unless told otherwise.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the host explicitly; otherwise the `Host` header is used.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the path, which should start with `/`.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the raw query string, without the leading `?`.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Adds a header, replacing any value already set under that name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the whole header map.
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Uses an in-memory body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::from_bytes(body);
        self
    }

    /// Uses a prepared body handle, e.g. one wrapping a host stream.
    #[must_use]
    pub fn body_handle(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Caps how many body bytes read operations will buffer, whichever body
    /// is set.
    #[must_use]
    pub fn max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = Some(limit);
        self
    }

    /// Attaches hyper's pending upgrade for [`websocket`](crate::realtime::websocket).
    #[must_use]
    pub fn upgrade(mut self, upgrade: OnUpgrade) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    pub fn build(self) -> Request {
        let body = match self.max_body_size {
            Some(limit) => self.body.with_limit(limit),
            None => self.body,
        };
        let host = self
            .host
            .or_else(|| self.headers.get("host").map(str::to_owned))
            .unwrap_or_else(|| "localhost".to_owned());

        Request {
            method: self.method,
            scheme: self.scheme,
            host,
            path: self.path,
            query: self.query,
            headers: self.headers,
            body,
            upgrade: Mutex::new(self.upgrade),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Signup {
        name: String,
        age: u32,
    }

    fn post(content_type: &str, body: &'static str) -> Request {
        Request::builder()
            .method(Method::Post)
            .path("/submit")
            .header("Content-Type", content_type)
            .body(body)
            .build()
    }

    #[test]
    fn builder_defaults() {
        let req = Request::builder().build();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.scheme(), "http");
        assert_eq!(req.host(), "localhost");
        assert_eq!(req.path(), "/");
        assert!(req.path_segments().is_empty());
    }

    #[test]
    fn query_is_percent_decoded() {
        let req = Request::builder()
            .path("/search")
            .query("q=rust+lang&page=2&q=more")
            .build();
        assert_eq!(req.query_string(), Some("q=rust+lang&page=2&q=more"));
        assert_eq!(req.query_param("q").as_deref(), Some("rust lang"));
        assert_eq!(req.query_param("page").as_deref(), Some("2"));
        assert_eq!(req.query().len(), 3);
    }

    #[test]
    fn content_type_strips_parameters() {
        let req = post("Application/JSON; charset=utf-8", "");
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn read_text() {
        let req = post("text/plain", "hello");
        assert_eq!(req.read_text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn second_read_fails_after_success() {
        let req = post("text/plain", "hello");
        req.read_text().await.unwrap();
        assert!(matches!(req.read_bytes().await, Err(BodyError::AlreadyRead)));
        assert!(matches!(req.read_form().await, Err(BodyError::AlreadyRead)));
    }

    #[tokio::test]
    async fn second_read_fails_after_parse_error() {
        let req = post("application/json", "{not json");
        assert!(matches!(
            req.read_json::<Signup>().await,
            Err(BodyError::Parse(_))
        ));
        assert!(matches!(req.read_text().await, Err(BodyError::AlreadyRead)));
    }

    #[tokio::test]
    async fn concurrent_reads_only_one_wins() {
        let req = post("text/plain", "once");
        let (a, b) = tokio::join!(req.read_text(), req.read_text());
        let already_read = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(BodyError::AlreadyRead)))
            .count();
        assert_eq!(already_read, 1);
        assert!(a.is_ok() || b.is_ok());
    }

    #[tokio::test]
    async fn read_json() {
        let req = post("application/json", r#"{"name":"ada","age":36}"#);
        let signup: Signup = req.read_json().await.unwrap();
        assert_eq!(
            signup,
            Signup {
                name: "ada".to_owned(),
                age: 36
            }
        );
    }

    #[tokio::test]
    async fn read_form_sorts_fields() {
        let req = post("application/x-www-form-urlencoded", "b=2&a=1");
        let form = req.read_form().await.unwrap();
        assert_eq!(
            form.values,
            vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
        );
    }

    #[tokio::test]
    async fn read_form_rejects_other_content_types() {
        let req = post("text/plain", "a=1");
        assert!(matches!(req.read_form().await, Err(BodyError::Parse(_))));
        assert!(req.body().is_consumed());
    }

    #[tokio::test]
    async fn body_limit_applies() {
        let req = Request::builder()
            .body("0123456789")
            .max_body_size(4)
            .build();
        assert!(matches!(
            req.read_bytes().await,
            Err(BodyError::TooLarge { limit: 4 })
        ));
    }

    #[tokio::test]
    async fn body_limit_survives_a_later_body() {
        let req = Request::builder()
            .max_body_size(4)
            .body("0123456789")
            .build();
        assert!(matches!(
            req.read_text().await,
            Err(BodyError::TooLarge { limit: 4 })
        ));
    }
}
