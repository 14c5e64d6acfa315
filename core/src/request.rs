//! The plain request value handed to handlers.
//!
//! A [`Request`] is built once per call by the host binding and owned by the
//! handler from then on. Everything except the body serializes, so handlers
//! can log or echo it directly.

use crate::BoxError;
use crate::query::{self, QueryOptions};
use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

/// Field names owned by the normalized request. Ambient state never
/// overrides them.
pub const NORMALIZED_FIELDS: [&str; 9] = [
    "method", "pathname", "query", "headers", "cookies", "params", "body", "protocol", "url",
];

/// Raw request body as a stream of chunks.
pub type RequestStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Request payload, shaped by whatever ran before the pipeline.
#[derive(Default)]
pub enum RequestBody {
    /// No payload was sent.
    #[default]
    Absent,
    /// Payload already parsed by upstream middleware.
    Parsed(Value),
    /// Unparsed payload, readable as a byte stream.
    Stream(RequestStream),
}

impl RequestBody {
    /// Whether the body is an unread byte stream.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// The parsed payload, if upstream middleware produced one.
    #[must_use]
    pub const fn parsed(&self) -> Option<&Value> {
        match self {
            Self::Parsed(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Parsed(value) => f.debug_tuple("Parsed").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Read-only view of an incoming request.
#[derive(Debug, Serialize)]
pub struct Request {
    /// Uppercase HTTP verb.
    pub method: String,
    /// Path component of the URL, without the query.
    pub pathname: String,
    /// Parsed querystring, see [`crate::query`].
    pub query: Map<String, Value>,
    /// Lowercase header name → value.
    pub headers: BTreeMap<String, String>,
    /// Cookie name → decoded value.
    pub cookies: BTreeMap<String, String>,
    /// Route parameters captured by the host router.
    pub params: BTreeMap<String, String>,
    /// Request payload.
    #[serde(skip)]
    pub body: RequestBody,
    /// `"https"` or `"http"`.
    pub protocol: String,
    /// Original request target (path and query).
    pub url: String,
    #[serde(flatten)]
    state: Map<String, Value>,
}

impl Request {
    /// Build a request from a method and a request target such as
    /// `/users?page=2`. Headers, cookies and params start empty and the
    /// protocol defaults to `http`.
    #[must_use]
    pub fn from_target(method: &str, target: &str, options: &QueryOptions) -> Self {
        let (pathname, raw_query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.to_ascii_uppercase(),
            pathname: pathname.to_owned(),
            query: query::parse(raw_query, options),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            params: BTreeMap::new(),
            body: RequestBody::Absent,
            protocol: "http".to_owned(),
            url: target.to_owned(),
            state: Map::new(),
        }
    }

    /// Merge ambient per-request state. Keys that name a normalized field
    /// are dropped so the request always shadows ambient state.
    pub fn merge_state(&mut self, ambient: Map<String, Value>) {
        for (key, value) in ambient {
            if !NORMALIZED_FIELDS.contains(&key.as_str()) {
                self.state.insert(key, value);
            }
        }
    }

    /// Ambient state merged into this request.
    #[must_use]
    pub const fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// A single header value by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Resolve the request protocol: a non-empty `x-forwarded-proto` wins (its
/// first entry when a proxy chain appended several), otherwise the transport
/// protocol is used.
#[must_use]
pub fn resolve_protocol(forwarded: Option<&str>, transport: &str) -> String {
    forwarded
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(transport)
        .to_owned()
}

/// Flatten a header map into lowercase name → value, joining repeated
/// headers with `", "`. Values that are not visible ASCII decode lossily.
#[must_use]
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
