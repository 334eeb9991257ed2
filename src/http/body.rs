//! Request bodies: the one-shot body handle and the decoders built on it.
//!
//! A [`Body`] wraps whatever stream the host handed us. The stream can be
//! taken exactly once; the first read operation takes it and every later
//! read, including one racing the first, fails with [`BodyError::AlreadyRead`].

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Collected, Empty, Full, LengthLimitError, Limited};
use thiserror::Error;

/// Type-erased error produced by host body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Collecting = Pin<Box<dyn Future<Output = Result<Collected<Bytes>, BoxError>> + Send>>;

/// Default cap on buffered request bodies (8 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Errors returned by the body-reading operations on [`Request`](super::Request).
#[derive(Debug, Error)]
pub enum BodyError {
    /// The body stream was already taken by an earlier read.
    #[error("request body has already been read")]
    AlreadyRead,

    /// The bytes arrived but could not be decoded as the requested shape.
    #[error("malformed request body: {0}")]
    Parse(String),

    /// The transport failed while the body was streaming in.
    #[error("failed to read request body: {0}")]
    Read(String),

    #[error("request body exceeds maximum allowed size of {limit} bytes")]
    TooLarge { limit: usize },
}

/// Single-consumption handle to a request body stream.
pub struct Body {
    stream: Mutex<Option<UnsyncBoxBody<Bytes, BoxError>>>,
    limit: usize,
}

impl Body {
    /// Wraps a host body stream; at most `limit` bytes will be buffered by reads.
    pub fn new<B>(body: B, limit: usize) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            stream: Mutex::new(Some(body.map_err(|e| -> BoxError { e.into() }).boxed_unsync())),
            limit,
        }
    }

    /// A body with no content.
    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new(), DEFAULT_MAX_BODY_SIZE)
    }

    /// A body backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(Full::new(bytes.into()), DEFAULT_MAX_BODY_SIZE)
    }

    /// Returns `true` once a read operation has taken the stream.
    pub fn is_consumed(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub(crate) fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Takes the stream and buffers it completely.
    pub(crate) async fn read_all(&self) -> Result<Bytes, BodyError> {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BodyError::AlreadyRead)?;

        // Boxed as `dyn Future + Send` so callers inside handler futures stay
        // `Send` without a higher-ranked proof over the stream's lifetimes.
        let collecting: Collecting = Box::pin(Limited::new(stream, self.limit).collect());
        match collecting.await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(BodyError::TooLarge { limit: self.limit })
            }
            Err(e) => Err(BodyError::Read(e.to_string())),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("consumed", &self.is_consumed())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Decoded form fields, each list sorted by key.
///
/// Sorting is stable, so repeated keys keep their submission order. That
/// makes the field list safe to destructure with a slice pattern:
///
/// ```
/// use tether::http::FormData;
///
/// let form = FormData::from_urlencoded(b"b=2&a=1").unwrap();
/// match form.values.as_slice() {
///     [(a, x), (b, y)] => assert_eq!((a.as_str(), x.as_str(), b.as_str(), y.as_str()), ("a", "1", "b", "2")),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub values: Vec<(String, String)>,
    pub files: Vec<(String, UploadedFile)>,
}

/// A multipart part that carried a `filename`, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FormData {
    /// Returns the first value submitted under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first file submitted under `key`.
    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    /// Decodes an `application/x-www-form-urlencoded` payload.
    pub fn from_urlencoded(body: &[u8]) -> Result<Self, BodyError> {
        std::str::from_utf8(body)
            .map_err(|e| BodyError::Parse(format!("form body is not UTF-8: {e}")))?;

        let mut form = FormData {
            values: url::form_urlencoded::parse(body).into_owned().collect(),
            files: Vec::new(),
        };
        form.sort();
        Ok(form)
    }

    /// Decodes a `multipart/form-data` payload delimited by `boundary`.
    pub fn from_multipart(body: &[u8], boundary: &str) -> Result<Self, BodyError> {
        let delimiter = format!("--{boundary}");
        let delimiter = delimiter.as_bytes();
        let part_end = [b"\r\n".as_slice(), delimiter].concat();

        let start = find(body, delimiter).ok_or_else(|| malformed("missing opening boundary"))?;
        let mut rest = &body[start + delimiter.len()..];
        let mut form = FormData::default();

        // `rest` always starts right after a delimiter.
        while !rest.starts_with(b"--") {
            rest = rest
                .strip_prefix(b"\r\n")
                .ok_or_else(|| malformed("boundary not followed by CRLF"))?;

            let head_len =
                find(rest, b"\r\n\r\n").ok_or_else(|| malformed("unterminated part headers"))?;
            let head = std::str::from_utf8(&rest[..head_len])
                .map_err(|_| malformed("part headers are not UTF-8"))?;
            rest = &rest[head_len + 4..];

            let content_len = find(rest, &part_end).ok_or_else(|| malformed("unterminated part"))?;
            let content = &rest[..content_len];
            rest = &rest[content_len + part_end.len()..];

            let part = PartHead::parse(head)?;
            match part.file_name {
                Some(file_name) => form.files.push((
                    part.name,
                    UploadedFile {
                        file_name,
                        content_type: part.content_type,
                        data: Bytes::copy_from_slice(content),
                    },
                )),
                None => {
                    let value = String::from_utf8(content.to_vec())
                        .map_err(|_| malformed("text field is not UTF-8"))?;
                    form.values.push((part.name, value));
                }
            }
        }

        form.sort();
        Ok(form)
    }

    fn sort(&mut self) {
        self.values.sort_by(|a, b| a.0.cmp(&b.0));
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

/// Extracts the `boundary` parameter from a multipart content type.
pub(crate) fn multipart_boundary(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
    })
}

// The headers of one multipart part that we care about.
struct PartHead {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl PartHead {
    fn parse(head: &str) -> Result<Self, BodyError> {
        let mut name = None;
        let mut file_name = None;
        let mut content_type = None;

        for line in head.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                for param in value.split(';').skip(1) {
                    let Some((k, v)) = param.split_once('=') else {
                        continue;
                    };
                    let v = v.trim().trim_matches('"').to_owned();
                    match k.trim().to_ascii_lowercase().as_str() {
                        "name" => name = Some(v),
                        "filename" => file_name = Some(v),
                        _ => {}
                    }
                }
            } else if key.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_owned());
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| malformed("part without a field name"))?,
            file_name,
            content_type,
        })
    }
}

fn malformed(reason: &str) -> BodyError {
    BodyError::Parse(format!("malformed multipart body: {reason}"))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
