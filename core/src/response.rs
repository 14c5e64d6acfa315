//! Response values and the constructors handlers build them with.

use crate::BoxError;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http::header::{self, HeaderName, HeaderValue, InvalidHeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;

/// Streamed response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Response payload.
#[derive(Default)]
pub enum Body {
    /// No content. Materializes as a zero-length body.
    #[default]
    Empty,
    /// Buffered text.
    Text(String),
    /// Buffered bytes.
    Bytes(Bytes),
    /// Streamed bytes; never fingerprinted.
    Stream(ByteStream),
}

impl Body {
    /// Wrap a fallible byte stream.
    pub fn stream<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes>,
        E: Into<BoxError>,
    {
        Self::Stream(Box::pin(
            stream
                .map_ok(|chunk| -> Bytes { chunk.into() })
                .map_err(|err| -> BoxError { err.into() }),
        ))
    }

    /// The buffered bytes, or `None` for a stream.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => Some(&[]),
            Self::Text(text) => Some(text.as_bytes()),
            Self::Bytes(bytes) => Some(bytes),
            Self::Stream(_) => None,
        }
    }

    /// Whether the whole body is held in memory.
    #[must_use]
    pub const fn is_buffered(&self) -> bool {
        !matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

/// What a handler returns.
///
/// Missing pieces are filled in when the response is written: status `200`,
/// no extra headers, and an empty body.
#[derive(Debug, Default)]
pub struct Response {
    /// Status code; `None` means `200 OK`.
    pub status: Option<StatusCode>,
    /// Headers merged over the baseline `content-type`.
    pub headers: HeaderMap,
    /// Payload.
    pub body: Body,
}

impl Response {
    /// A response with the given body and everything else defaulted.
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Set the status code.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Set (replace) one header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The status the response will be written with.
    #[must_use]
    pub fn resolved_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}

/// Merge `extra` over `base`. A name present in `extra` replaces every value
/// of that name in `base`; repeated names in `extra` are all kept.
pub fn merge_headers(base: &mut HeaderMap, extra: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in extra {
        match name {
            Some(name) => {
                base.insert(name.clone(), value);
                current = Some(name);
            }
            None => {
                if let Some(name) = &current {
                    base.append(name.clone(), value);
                }
            }
        }
    }
}

/// JSON response with `content-type: application/json`.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn json<T: Serialize + ?Sized>(
    value: &T,
    status: Option<StatusCode>,
) -> Result<Response, serde_json::Error> {
    let body = serde_json::to_string(value)?;
    Ok(Response {
        status,
        headers: HeaderMap::from_iter([(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )]),
        body: Body::Text(body),
    })
}

/// HTML response with `content-type: text/html; charset=utf-8`.
pub fn html(markup: impl Into<String>, status: Option<StatusCode>) -> Response {
    Response {
        status,
        headers: HeaderMap::from_iter([(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )]),
        body: Body::Text(markup.into()),
    }
}

/// Redirect to `location`. The status defaults to `302 Found`; anything
/// outside the 3xx range is coerced to `302` as well.
///
/// # Errors
///
/// Returns an error if `location` is not a valid header value.
pub fn redirect(location: &str, status: Option<StatusCode>) -> Result<Response, InvalidHeaderValue> {
    let status = status
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND);
    Ok(Response {
        status: Some(status),
        headers: HeaderMap::from_iter([(header::LOCATION, HeaderValue::from_str(location)?)]),
        body: Body::Empty,
    })
}

/// Pass an arbitrary body through with the given headers and status.
pub fn send(body: impl Into<Body>, headers: HeaderMap, status: Option<StatusCode>) -> Response {
    Response {
        status,
        headers,
        body: body.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use futures::{StreamExt, stream};
    use serde_json::json;

    #[test]
    fn test_json_sets_content_type_and_body() {
        let response = json(&json!({ "ok": true }), Some(StatusCode::CREATED)).unwrap();
        assert_eq!(response.status, Some(StatusCode::CREATED));
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.body.as_bytes(), Some(&b"{\"ok\":true}"[..]));
    }

    #[test]
    fn test_json_without_status_defaults_later() {
        let response = json(&json!({}), None).unwrap();
        assert_eq!(response.status, None);
        assert_eq!(response.resolved_status(), StatusCode::OK);
    }

    #[test]
    fn test_html() {
        let response = html("<p>hi</p>", None);
        assert_eq!(response.headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
    }

    #[test]
    fn test_redirect_defaults_to_found() {
        let response = redirect("/login", None).unwrap();
        assert_eq!(response.status, Some(StatusCode::FOUND));
        assert_eq!(response.headers[header::LOCATION], "/login");

        let response = redirect("/moved", Some(StatusCode::MOVED_PERMANENTLY)).unwrap();
        assert_eq!(response.status, Some(StatusCode::MOVED_PERMANENTLY));

        let response = redirect("/odd", Some(StatusCode::OK)).unwrap();
        assert_eq!(response.status, Some(StatusCode::FOUND));
    }

    #[test]
    fn test_redirect_rejects_invalid_location() {
        assert!(redirect("/bad\nheader", None).is_err());
    }

    #[test]
    fn test_send_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        let response = send(vec![0x89, 0x50], headers, Some(StatusCode::ACCEPTED));
        assert_eq!(response.status, Some(StatusCode::ACCEPTED));
        assert_eq!(response.body.as_bytes(), Some(&[0x89, 0x50][..]));
    }

    #[test]
    fn test_merge_headers_replaces_and_keeps_repeats() {
        let mut base = HeaderMap::new();
        base.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        base.insert(header::VARY, HeaderValue::from_static("accept"));

        let mut extra = HeaderMap::new();
        extra.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        extra.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        extra.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        merge_headers(&mut base, extra);

        assert_eq!(base[header::CONTENT_TYPE], "text/plain");
        assert_eq!(base[header::VARY], "accept");
        assert_eq!(base.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn test_stream_body_is_not_buffered() {
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>("str"), Ok("eam")]);
        let body = Body::stream(chunks);
        assert!(!body.is_buffered());
        assert!(body.as_bytes().is_none());

        let Body::Stream(stream) = body else {
            unreachable!("constructed as a stream")
        };
        let collected: Vec<Bytes> = stream.map(Result::unwrap).collect().await;
        assert_eq!(collected.concat(), b"stream");
    }

    #[test]
    fn test_empty_body_is_zero_length() {
        assert_eq!(Body::default().as_bytes(), Some(&[][..]));
    }
}
