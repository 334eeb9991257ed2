//! Framework-level HTTP values.
//!
//! These are the types handlers and middleware see: [`Method`], [`StatusCode`],
//! [`Headers`], [`Request`] and [`Response`]. They are deliberately decoupled
//! from the host's types; [`crate::server::adapter`] translates between the two.

use std::fmt;
use std::hash::{Hash, Hasher};

pub mod body;
pub mod headers;
pub mod request;
pub mod response;

pub use body::{BodyError, FormData, UploadedFile};
pub use headers::Headers;
pub use request::{Request, RequestBuilder};
pub use response::{Response, ResponseBody};

macro_rules! status_codes {
    ($($(#[$group:meta])* $name:ident = $code:literal, $reason:literal;)+) => {
        /// An HTTP response status code.
        ///
        /// Common codes have named variants; any other code in `100..=999`
        /// is carried by [`Other`](Self::Other). Comparison and hashing go
        /// by the numeric value, so `Other(404)` equals `NotFound`.
        ///
        /// # Examples
        ///
        /// ```
        /// use tether::http::StatusCode;
        ///
        /// let status = StatusCode::Ok;
        /// assert_eq!(status.as_u16(), 200);
        /// assert_eq!(status.canonical_reason(), "OK");
        /// assert!(status.is_success());
        ///
        /// let teapot = StatusCode::from_u16(418).unwrap();
        /// assert!(teapot.is_client_error());
        /// assert_eq!(StatusCode::from_u16(404), Some(StatusCode::NotFound));
        /// ```
        #[derive(Debug, Clone, Copy)]
        pub enum StatusCode {
            $($(#[$group])* $name,)+
            /// A code without a named variant.
            Other(u16),
        }

        impl StatusCode {
            /// Returns the numeric status code as a `u16`.
            pub fn as_u16(self) -> u16 {
                match self {
                    $(Self::$name => $code,)+
                    Self::Other(code) => code,
                }
            }

            /// Returns the canonical reason phrase, or `""` for [`Other`](Self::Other).
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$name => $reason,)+
                    Self::Other(_) => "",
                }
            }

            /// Maps a numeric code to its variant; `None` outside `100..=999`.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)+
                    100..=999 => Some(Self::Other(code)),
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    // 1xx Informational
    Continue = 100, "Continue";
    SwitchingProtocols = 101, "Switching Protocols";

    // 2xx Success
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NoContent = 204, "No Content";
    PartialContent = 206, "Partial Content";

    // 3xx Redirection
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";

    // 4xx Client Error
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    RequestTimeout = 408, "Request Timeout";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PreconditionFailed = 412, "Precondition Failed";
    PayloadTooLarge = 413, "Payload Too Large";
    UriTooLong = 414, "URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    RangeNotSatisfiable = 416, "Range Not Satisfiable";
    UnprocessableEntity = 422, "Unprocessable Entity";
    UpgradeRequired = 426, "Upgrade Required";
    TooManyRequests = 429, "Too Many Requests";

    // 5xx Server Error
    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Timeout";
    HttpVersionNotSupported = 505, "HTTP Version Not Supported";
}

impl StatusCode {
    /// `true` for 1xx codes.
    pub fn is_informational(self) -> bool {
        (100..200).contains(&self.as_u16())
    }

    /// `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// `true` for 3xx codes.
    pub fn is_redirection(self) -> bool {
        (300..400).contains(&self.as_u16())
    }

    /// `true` for 4xx codes.
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// `true` for 5xx codes.
    pub fn is_server_error(self) -> bool {
        self.as_u16() >= 500
    }
}

impl PartialEq for StatusCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_u16() == other.as_u16()
    }
}

impl Eq for StatusCode {}

impl Hash for StatusCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_u16().hash(state);
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_reason() {
            "" => write!(f, "{}", self.as_u16()),
            reason => write!(f, "{} {reason}", self.as_u16()),
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Standard methods are represented as unit variants for zero-cost comparison.
/// Extension methods the host accepts are captured in the `Custom` variant so
/// that guards can still reject them with a 405.
///
/// # Examples
///
/// ```
/// use tether::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET — retrieve a representation of the target resource.
    Get,
    /// POST — perform resource-specific processing on the request payload.
    Post,
    /// PUT — replace the target resource's current representation.
    Put,
    /// DELETE — remove the association between the target resource and its functionality.
    Delete,
    /// HEAD — identical to GET but without a response body.
    Head,
    /// OPTIONS — describe the communication options for the target resource.
    Options,
    /// PATCH — apply partial modifications to a resource.
    Patch,
    /// CONNECT — establish a tunnel to the server identified by the target resource.
    Connect,
    /// TRACE — perform a message loop-back test along the path to the target resource.
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert!(StatusCode::SwitchingProtocols.is_informational());
        assert!(StatusCode::NoContent.is_success());
        assert!(StatusCode::SeeOther.is_redirection());
        assert!(StatusCode::UpgradeRequired.is_client_error());
        assert!(StatusCode::BadGateway.is_server_error());
        assert!(!StatusCode::Ok.is_client_error());
    }

    #[test]
    fn upgrade_required_reason() {
        assert_eq!(StatusCode::UpgradeRequired.as_u16(), 426);
        assert_eq!(
            StatusCode::UpgradeRequired.to_string(),
            "426 Upgrade Required"
        );
    }

    #[test]
    fn unnamed_codes_keep_their_class() {
        let teapot = StatusCode::from_u16(418).unwrap();
        assert_eq!(teapot, StatusCode::Other(418));
        assert!(teapot.is_client_error());
        assert_eq!(teapot.to_string(), "418");

        let legal = StatusCode::from_u16(451).unwrap();
        assert!(legal.is_client_error() && !legal.is_server_error());
        assert_eq!(u16::from(legal), 451);

        assert!(StatusCode::from_u16(599).unwrap().is_server_error());
        assert_eq!(StatusCode::from_u16(42), None);
        assert_eq!(StatusCode::from_u16(1000), None);
    }

    #[test]
    fn named_and_numeric_forms_are_equal() {
        use std::collections::HashSet;

        assert_eq!(StatusCode::from_u16(426), Some(StatusCode::UpgradeRequired));
        assert_eq!(StatusCode::Other(404), StatusCode::NotFound);
        let set: HashSet<_> = [StatusCode::Other(200), StatusCode::Ok].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn method_round_trips_through_str() {
        for name in ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"] {
            let method: Method = name.parse().unwrap();
            assert_eq!(method.as_str(), name);
            assert!(!matches!(method, Method::Custom(_)));
        }
        let custom: Method = "PURGE".parse().unwrap();
        assert_eq!(custom, Method::Custom("PURGE".to_owned()));
    }
}
