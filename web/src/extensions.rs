//! Request extensions read by the normalizer.
//!
//! Upstream middleware communicates with the pipeline through these types:
//! insert them into the request extensions before the mounted service runs.
//!
//! ```
//! use axum::{extract::Request, middleware::Next, response::Response};
//! use portico_web::extensions::AmbientState;
//! use serde_json::json;
//!
//! async fn authenticate(mut request: Request, next: Next) -> Response {
//!     let state = AmbientState::from_value(json!({ "user": "ada" }));
//!     request.extensions_mut().insert(state);
//!     next.run(request).await
//! }
//! ```

use serde_json::{Map, Value};

/// Per-request state merged into the normalized request.
///
/// Keys that collide with a normalized field (`method`, `url`, ...) are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct AmbientState(pub Map<String, Value>);

impl AmbientState {
    /// Build from a JSON value. Anything but an object yields empty state.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Add one key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }
}

/// A body already parsed by upstream middleware. When present the raw body
/// stream is not exposed to the handler.
#[derive(Debug, Clone)]
pub struct ParsedBody(pub Value);
