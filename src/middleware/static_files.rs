//! Serving files from a directory under a URL prefix.

use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use crate::{
    Method, Request, Response, StatusCode,
    middleware::{Middleware, Next},
};

/// Serves `GET` requests under `prefix` from files in `directory`.
///
/// The prefix is stripped, parent (`..`) and current (`.`) segments are
/// dropped, and the rest is joined onto the directory. If that names an
/// existing regular file the response streams it, with a `Content-Type`
/// inferred from the extension. Anything else, including a miss, falls
/// through to the next middleware: absence just means "not a static asset".
///
/// ```rust,no_run
/// use tether::middleware::{Pipeline, ServeStatic};
///
/// let pipeline = Pipeline::new().wrap(ServeStatic::new("/static", "./public"));
/// ```
pub struct ServeStatic {
    prefix: String,
    directory: PathBuf,
}

impl ServeStatic {
    pub fn new(prefix: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            directory: directory.into(),
        }
    }

    /// Maps a request path onto the directory, or `None` if it is outside the prefix.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rest = path.strip_prefix(self.prefix.trim_end_matches('/'))?;
        // `/static` must not match `/staticky`.
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }

        let relative: PathBuf = Path::new(rest)
            .components()
            .filter_map(|component| match component {
                Component::Normal(segment) => Some(segment),
                _ => None,
            })
            .collect();

        (!relative.as_os_str().is_empty()).then(|| self.directory.join(relative))
    }
}

impl Middleware for ServeStatic {
    fn handle(&self, req: Request, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let candidate = match req.method() {
            Method::Get => self.resolve(req.path()),
            _ => None,
        };

        Box::pin(async move {
            let Some(file) = candidate else {
                return next.run(req).await;
            };

            match tokio::fs::metadata(&file).await {
                Ok(meta) if meta.is_file() => {
                    tracing::debug!(path = req.path(), file = %file.display(), "serving static file");
                    Response::new(StatusCode::Ok).file(file)
                }
                _ => next.run(req).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::ResponseBody;
    use crate::middleware::Pipeline;

    fn app(dir: &Path) -> crate::middleware::Handler {
        Pipeline::new()
            .wrap(ServeStatic::new("/static", dir))
            .handler(|_req| async { Response::new(StatusCode::Ok).body("fallthrough") })
    }

    fn is_fallthrough(response: &Response) -> bool {
        matches!(response.content(), ResponseBody::Text(t) if t == "fallthrough")
    }

    #[test]
    fn resolve_strips_prefix_and_traversal() {
        let serve = ServeStatic::new("/static", "/srv/www");
        assert_eq!(
            serve.resolve("/static/css/site.css"),
            Some(PathBuf::from("/srv/www/css/site.css"))
        );
        assert_eq!(
            serve.resolve("/static/../../etc/passwd"),
            Some(PathBuf::from("/srv/www/etc/passwd"))
        );
        assert_eq!(
            serve.resolve("/static/./a//b"),
            Some(PathBuf::from("/srv/www/a/b"))
        );
        assert_eq!(serve.resolve("/staticky/a"), None);
        assert_eq!(serve.resolve("/other/a"), None);
        assert_eq!(serve.resolve("/static/"), None);
    }

    #[tokio::test]
    async fn existing_file_is_served() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body {}").unwrap();

        let response = app(dir.path())(Request::builder().path("/static/css/site.css").build()).await;

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(
            response.headers().get("content-type"),
            Some("text/css; charset=utf-8")
        );
        assert!(matches!(response.content(), ResponseBody::File(p) if p.ends_with("css/site.css")));
    }

    #[tokio::test]
    async fn missing_file_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())(Request::builder().path("/static/nope.js").build()).await;
        assert!(is_fallthrough(&response));
    }

    #[tokio::test]
    async fn directory_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let response = app(dir.path())(Request::builder().path("/static/sub").build()).await;
        assert!(is_fallthrough(&response));
    }

    #[tokio::test]
    async fn non_get_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let req = Request::builder().method(Method::Post).path("/static/a.txt").build();
        let response = app(dir.path())(req).await;
        assert!(is_fallthrough(&response));
    }

    #[tokio::test]
    async fn traversal_cannot_escape_directory() {
        let outer = tempfile::tempdir().unwrap();
        let public = outer.path().join("public");
        fs::create_dir(&public).unwrap();
        fs::write(outer.path().join("secret.txt"), "hidden").unwrap();

        let response = app(&public)(Request::builder().path("/static/../secret.txt").build()).await;
        assert!(is_fallthrough(&response));
    }
}
