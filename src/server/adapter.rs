//! Conversion between hyper's request/response types and the framework's.

use std::convert::Infallible;
use std::io;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderName, HeaderValue};
use tokio::io::AsyncReadExt;
use tracing::{error, warn};

use crate::http::body::{Body, BoxError};
use crate::middleware::Handler;
use crate::{Headers, Method, Request, Response, ResponseBody};

/// Response body type handed to hyper.
pub type ServeBody = UnsyncBoxBody<Bytes, io::Error>;

/// Read size for streamed file bodies.
const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Builds a [`Request`] from a hyper request.
///
/// Repeated header fields are folded into one comma-separated value. The
/// body stays unread; reads buffer at most `max_body_size` bytes.
pub fn into_request<B>(mut native: hyper::Request<B>, max_body_size: usize) -> Request
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let upgrade = hyper::upgrade::on(&mut native);
    let (parts, body) = native.into_parts();

    let method = parts
        .method
        .as_str()
        .parse::<Method>()
        .unwrap_or_else(|never: Infallible| match never {});

    let mut headers = Headers::with_capacity(parts.headers.keys_len());
    for (name, value) in &parts.headers {
        headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }

    let mut builder = Request::builder()
        .method(method)
        .scheme(parts.uri.scheme_str().unwrap_or("http"))
        .path(parts.uri.path())
        .headers(headers)
        .body_handle(Body::new(body, max_body_size))
        .upgrade(upgrade);
    if let Some(authority) = parts.uri.authority() {
        builder = builder.host(authority.as_str());
    }
    if let Some(query) = parts.uri.query() {
        builder = builder.query(query);
    }
    builder.build()
}

/// Builds the hyper response for a [`Response`].
///
/// Text and byte bodies get a default `Content-Type` when none is set.
/// Files are streamed with a `Content-Length` taken from their metadata; one
/// that cannot be opened turns into an empty `500`.
/// A WebSocket upgrade is started on its own task, which waits for hyper to
/// release the connection after the `101` is written.
pub async fn into_native_response(response: Response) -> hyper::Response<ServeBody> {
    let (status, mut headers, body) = response.into_parts();

    let body = match body {
        ResponseBody::Empty => empty(),
        ResponseBody::Text(text) => {
            if !headers.contains("content-type") {
                headers.insert("Content-Type", "text/plain; charset=utf-8");
            }
            full(text)
        }
        ResponseBody::Bytes(bytes) => {
            if !headers.contains("content-type") {
                headers.insert("Content-Type", "application/octet-stream");
            }
            full(bytes)
        }
        ResponseBody::File(path) => match file_stream(&path).await {
            Ok((stream, len)) => {
                if !headers.contains("content-length") {
                    headers.insert("Content-Length", len.to_string());
                }
                stream
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to open response file");
                let mut native = hyper::Response::new(empty());
                *native.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                return native;
            }
        },
        ResponseBody::WebSocket(upgrade) => {
            tokio::spawn(upgrade.run());
            empty()
        }
    };

    let mut native = hyper::Response::new(body);
    *native.status_mut() = hyper::StatusCode::from_u16(status.as_u16())
        .unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                native.headers_mut().append(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
    }

    native
}

/// Opens `path` as a body read lazily in 64 KiB chunks.
///
/// The file is closed when the body is dropped, whether or not it was read
/// to the end.
///
/// # Returns
///
/// The body together with the file's size in bytes at open time.
pub async fn file_stream(path: &Path) -> io::Result<(ServeBody, u64)> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();

    let chunks = futures_util::stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(FILE_CHUNK_SIZE);
        let read = file.read_buf(&mut buf).await?;
        Ok::<_, io::Error>((read > 0).then(|| (Frame::data(buf.freeze()), file)))
    });

    Ok((StreamBody::new(chunks).boxed_unsync(), len))
}

/// Runs one hyper request through `handler`.
pub async fn handle<B>(
    native: hyper::Request<B>,
    handler: &Handler,
    max_body_size: usize,
) -> hyper::Response<ServeBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let request = into_request(native, max_body_size);
    let response = handler(request).await;
    into_native_response(response).await
}

fn empty() -> ServeBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn full(data: impl Into<Bytes>) -> ServeBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::StatusCode;
    use crate::http::BodyError;
    use crate::middleware::Pipeline;

    fn native(method: &str, uri: &str, body: &'static str) -> hyper::Request<Full<Bytes>> {
        hyper::Request::builder()
            .method(method)
            .uri(uri)
            .header("Host", "example.com")
            .header("Accept", "text/html")
            .header("Accept", "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn body_of(response: hyper::Response<ServeBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn request_fields_are_carried_over() {
        let req = into_request(native("POST", "/users/7?tab=posts&x=%20", "payload"), 1024);

        assert_eq!(req.method(), &Method::Post);
        assert_eq!(req.scheme(), "http");
        assert_eq!(req.host(), "example.com");
        assert_eq!(req.path(), "/users/7");
        assert_eq!(req.path_segments(), ["users", "7"]);
        assert_eq!(req.query_string(), Some("tab=posts&x=%20"));
        assert_eq!(req.query_param("x").as_deref(), Some(" "));
        assert_eq!(req.read_text().await.unwrap(), "payload");
    }

    #[test]
    fn repeated_headers_are_folded() {
        let req = into_request(native("GET", "/", ""), 1024);
        assert_eq!(
            req.headers().get("accept"),
            Some("text/html, application/json")
        );
    }

    #[test]
    fn absolute_uri_sets_scheme_and_host() {
        let req = into_request(native("GET", "https://api.example.org:8443/v1", ""), 1024);
        assert_eq!(req.scheme(), "https");
        assert_eq!(req.host(), "api.example.org:8443");
        assert_eq!(req.path(), "/v1");
        assert_eq!(req.query_string(), None);
    }

    #[test]
    fn extension_methods_are_kept() {
        let req = into_request(native("PURGE", "/cache", ""), 1024);
        assert_eq!(req.method(), &Method::Custom("PURGE".to_owned()));
    }

    #[tokio::test]
    async fn body_limit_applies_to_reads() {
        let req = into_request(native("POST", "/", "0123456789"), 4);
        assert!(matches!(
            req.read_bytes().await,
            Err(BodyError::TooLarge { limit: 4 })
        ));
    }

    #[tokio::test]
    async fn text_gets_default_content_type() {
        let native = into_native_response(Response::new(StatusCode::Created).body("made")).await;
        assert_eq!(native.status(), hyper::StatusCode::CREATED);
        assert_eq!(
            native.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_of(native).await, "made");
    }

    #[tokio::test]
    async fn explicit_content_type_wins() {
        let native = into_native_response(Response::html("<p>hi</p>")).await;
        assert_eq!(native.headers()["content-type"], "text/html; charset=utf-8");
        assert_eq!(native.headers().get_all("content-type").iter().count(), 1);
    }

    #[tokio::test]
    async fn bytes_and_empty_bodies() {
        let native =
            into_native_response(Response::new(StatusCode::Ok).body_bytes(vec![0_u8, 159])).await;
        assert_eq!(native.headers()["content-type"], "application/octet-stream");
        assert_eq!(body_of(native).await, Bytes::from_static(&[0, 159]));

        let native = into_native_response(Response::new(StatusCode::NoContent)).await;
        assert!(native.headers().get("content-type").is_none());
        assert!(body_of(native).await.is_empty());
    }

    #[tokio::test]
    async fn file_is_streamed_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..150_000_u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let native = into_native_response(Response::new(StatusCode::Ok).file(&path)).await;
        assert_eq!(native.status(), hyper::StatusCode::OK);
        assert_eq!(native.headers()["content-length"], "150000");
        assert_eq!(body_of(native).await, data);
    }

    #[tokio::test]
    async fn unregistered_status_codes_pass_through() {
        let teapot = StatusCode::from_u16(418).unwrap();
        let native = into_native_response(Response::new(teapot)).await;
        assert_eq!(native.status().as_u16(), 418);
    }

    #[tokio::test]
    async fn unreadable_file_is_empty_500() {
        let dir = tempfile::tempdir().unwrap();
        let native =
            into_native_response(Response::new(StatusCode::Ok).file(dir.path().join("gone.css")))
                .await;
        assert_eq!(native.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(native.headers().is_empty());
        assert!(body_of(native).await.is_empty());
    }

    #[tokio::test]
    async fn handle_runs_the_pipeline() {
        let app = Pipeline::new().handler(|req: Request| async move {
            let name = req.read_text().await.unwrap_or_default();
            Response::new(StatusCode::Ok).body(format!("{} {name}", req.method()))
        });

        let native = handle(native("PUT", "/", "ada"), &app, 1024).await;
        assert_eq!(body_of(native).await, "PUT ada");
    }
}
