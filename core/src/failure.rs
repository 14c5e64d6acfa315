//! Failure taxonomy for handlers.
//!
//! Handlers fail with a [`Rejection`]. A rejection is either a recognized
//! [`Failure`], which the classifier turns into a JSON error response, or a
//! plain [`Response`], which passes through untouched. The second form lets a
//! handler short-circuit with a pre-built response from deep inside `?`
//! chains.
//!
//! # Kinds
//!
//! | Kind | Status | Body |
//! |---|---|---|
//! | [`DomainError`] | its own | its JSON payload |
//! | [`ValidationError`] | 400 | `{details, message, name}` |
//! | [`TransportError`] | upstream reply status | `{message, statusCode, data}` |
//! | [`SystemError`] | its own or 500 | `{message, name}` |
//!
//! # Example
//!
//! ```
//! use portico_core::failure::{DomainError, Failure};
//!
//! let failure = Failure::from(DomainError::bad_request("missing field"))
//!     .exposed(true)
//!     .cry();
//! assert_eq!(failure.status().as_u16(), 400);
//! ```

use crate::response::Response;
use http::header::{HeaderName, HeaderValue, InvalidHeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Message used in place of the real one for 5xx domain payloads.
pub const INTERNAL_MESSAGE: &str = "An internal server error occurred";

/// A recognized failure: its kind plus the policy flags every kind shares.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Failure {
    kind: FailureKind,
    headers: HeaderMap,
    expose: Option<bool>,
    cry: bool,
}

/// The closed set of failure kinds.
#[derive(Debug, Error)]
pub enum FailureKind {
    /// Structured application error carrying its own HTTP output.
    #[error(transparent)]
    Domain(DomainError),
    /// Input validation failure.
    #[error(transparent)]
    Validation(ValidationError),
    /// Failed call to a downstream service.
    #[error(transparent)]
    Transport(TransportError),
    /// Anything else.
    #[error(transparent)]
    System(SystemError),
}

impl FailureKind {
    /// Short lowercase name, used as a log and metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Validation(_) => "validation",
            Self::Transport(_) => "transport",
            Self::System(_) => "system",
        }
    }
}

impl Failure {
    /// Wrap a kind with no extra headers and no policy overrides.
    #[must_use]
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            headers: HeaderMap::new(),
            expose: None,
            cry: false,
        }
    }

    /// Add a header that wins over any kind-specific header of that name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Force the error body to be shown (`true`) or hidden (`false`).
    #[must_use]
    pub const fn exposed(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }

    /// Report this failure to the fault sink even if it is not a server error.
    #[must_use]
    pub const fn cry(mut self) -> Self {
        self.cry = true;
        self
    }

    /// The failure kind.
    #[must_use]
    pub const fn kind(&self) -> &FailureKind {
        &self.kind
    }

    /// Failure-level headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The explicit exposure flag, if any.
    #[must_use]
    pub const fn expose(&self) -> Option<bool> {
        self.expose
    }

    /// Whether reporting was explicitly requested.
    #[must_use]
    pub const fn is_cry(&self) -> bool {
        self.cry
    }

    /// The status this failure is answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.kind {
            FailureKind::Domain(error) => error.status,
            FailureKind::Validation(_) => StatusCode::BAD_REQUEST,
            FailureKind::Transport(error) => error
                .reply
                .as_ref()
                .map_or(StatusCode::BAD_GATEWAY, |reply| reply.status),
            FailureKind::System(error) => error.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// A downstream call that failed before any reply arrived. There is no
    /// meaningful status to answer with, so the pipeline hands it to the
    /// host instead of building a response.
    #[must_use]
    pub const fn escalates(&self) -> bool {
        matches!(&self.kind, FailureKind::Transport(TransportError { reply: None, .. }))
    }
}

/// Structured application error with its own status, payload and headers.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DomainError {
    /// Response status.
    pub status: StatusCode,
    /// JSON payload sent as the body.
    pub payload: Value,
    /// Headers sent with the response.
    pub headers: HeaderMap,
    /// Original message, kept even when the payload hides it.
    pub message: String,
}

impl DomainError {
    /// Build an error whose payload is `{statusCode, error, message}`, where
    /// `error` is the reason phrase. Server errors hide the message in the
    /// payload.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let reason = status.canonical_reason().unwrap_or("Unknown");
        let shown = if crate::classify::is_server_fault(status) {
            INTERNAL_MESSAGE.to_owned()
        } else if message.is_empty() {
            reason.to_owned()
        } else {
            message.clone()
        };

        Self {
            status,
            payload: json!({
                "statusCode": status.as_u16(),
                "error": reason,
                "message": shown,
            }),
            headers: HeaderMap::new(),
            message,
        }
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// 422 Unprocessable Entity.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 401 with an authentication challenge:
    /// `www-authenticate: Scheme k1="v1", k2="v2", error="message"`.
    /// The attributes (plus `error`) are echoed under `attributes` in the
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is not a valid header value.
    pub fn challenge(
        message: impl Into<String>,
        scheme: &str,
        attributes: &[(&str, &str)],
    ) -> Result<Self, InvalidHeaderValue> {
        let mut error = Self::unauthorized(message);

        let mut echoed = Map::new();
        let mut params = Vec::with_capacity(attributes.len() + 1);
        for (key, value) in attributes {
            params.push(format!("{key}=\"{value}\""));
            echoed.insert((*key).to_owned(), Value::String((*value).to_owned()));
        }
        if !error.message.is_empty() {
            params.push(format!("error=\"{}\"", error.message));
            echoed.insert("error".to_owned(), Value::String(error.message.clone()));
        }

        let challenge = if params.is_empty() {
            scheme.to_owned()
        } else {
            format!("{scheme} {}", params.join(", "))
        };
        error
            .headers
            .insert(http::header::WWW_AUTHENTICATE, HeaderValue::from_str(&challenge)?);
        if let Value::Object(payload) = &mut error.payload {
            payload.insert("attributes".to_owned(), Value::Object(echoed));
        }
        Ok(error)
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Input validation failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Per-field details, as produced by the validator.
    pub details: Value,
    /// Summary message.
    pub message: String,
    /// Error name, `"ValidationError"` unless overridden.
    pub name: String,
}

impl ValidationError {
    /// A validation error named `ValidationError`.
    #[must_use]
    pub fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            details,
            message: message.into(),
            name: "ValidationError".to_owned(),
        }
    }
}

/// The reply received from a downstream service.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    /// Downstream status, reused as our own.
    pub status: StatusCode,
    /// Downstream body.
    pub data: Value,
}

/// A failed call to a downstream service.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// What went wrong.
    pub message: String,
    /// The downstream reply, if one arrived.
    pub reply: Option<UpstreamReply>,
}

impl TransportError {
    /// A downstream call answered with a non-success status.
    #[must_use]
    pub fn from_reply(status: StatusCode, data: Value) -> Self {
        Self {
            message: format!("Request failed with status code {}", status.as_u16()),
            reply: Some(UpstreamReply { status, data }),
        }
    }

    /// A downstream call that never got a reply (connection refused, DNS,
    /// timeout...).
    #[must_use]
    pub fn no_reply(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reply: None,
        }
    }
}

/// Any other failure.
#[derive(Debug, Clone, Error)]
#[error("{name}: {message}")]
pub struct SystemError {
    /// Error name, `"Error"` unless overridden.
    pub name: String,
    /// Error message.
    pub message: String,
    /// Explicit status; `None` answers with 500.
    pub status: Option<StatusCode>,
    /// Underlying error, kept for the fault sink only.
    pub cause: Option<Arc<anyhow::Error>>,
}

impl SystemError {
    /// A plain `Error` with a message and no status.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_owned(),
            message: message.into(),
            status: None,
            cause: None,
        }
    }

    /// A conventional HTTP error object: `404` becomes
    /// `NotFoundError: Not Found`.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        let mut name: String = reason
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_ascii_uppercase().to_string() + chars.as_str()
                })
            })
            .collect();
        if !name.ends_with("Error") {
            name.push_str("Error");
        }

        Self {
            name,
            message: reason.to_owned(),
            status: Some(status),
            cause: None,
        }
    }

    /// Override the name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl From<DomainError> for Failure {
    fn from(error: DomainError) -> Self {
        Self::new(FailureKind::Domain(error))
    }
}

impl From<ValidationError> for Failure {
    fn from(error: ValidationError) -> Self {
        Self::new(FailureKind::Validation(error))
    }
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        Self::new(FailureKind::Transport(error))
    }
}

impl From<SystemError> for Failure {
    fn from(error: SystemError) -> Self {
        Self::new(FailureKind::System(error))
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        let mut system = SystemError::new(error.to_string());
        system.cause = Some(Arc::new(error));
        system.into()
    }
}

/// What a handler fails with.
#[derive(Debug)]
pub enum Rejection {
    /// A recognized failure, classified into an error response.
    Failure(Failure),
    /// A ready-made response, written as-is.
    Response(Response),
}

impl From<Failure> for Rejection {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

impl From<Response> for Rejection {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<DomainError> for Rejection {
    fn from(error: DomainError) -> Self {
        Self::Failure(error.into())
    }
}

impl From<ValidationError> for Rejection {
    fn from(error: ValidationError) -> Self {
        Self::Failure(error.into())
    }
}

impl From<TransportError> for Rejection {
    fn from(error: TransportError) -> Self {
        Self::Failure(error.into())
    }
}

impl From<SystemError> for Rejection {
    fn from(error: SystemError) -> Self {
        Self::Failure(error.into())
    }
}

impl From<anyhow::Error> for Rejection {
    fn from(error: anyhow::Error) -> Self {
        Self::Failure(error.into())
    }
}

impl From<serde_json::Error> for Rejection {
    fn from(error: serde_json::Error) -> Self {
        Self::Failure(anyhow::Error::new(error).into())
    }
}

impl From<InvalidHeaderValue> for Rejection {
    fn from(error: InvalidHeaderValue) -> Self {
        Self::Failure(anyhow::Error::new(error).into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn test_domain_payload() {
        let error = DomainError::not_found("no such user");
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(
            error.payload,
            json!({ "statusCode": 404, "error": "Not Found", "message": "no such user" })
        );
    }

    #[test]
    fn test_domain_server_error_hides_message() {
        let error = DomainError::internal("db password leaked");
        assert_eq!(error.payload["message"], json!(INTERNAL_MESSAGE));
        assert_eq!(error.message, "db password leaked");
    }

    #[test]
    fn test_domain_empty_message_uses_reason() {
        let error = DomainError::bad_request("");
        assert_eq!(error.payload["message"], json!("Bad Request"));
    }

    #[test]
    fn test_challenge_header_and_attributes() {
        let error = DomainError::challenge(
            "error message",
            "Basic",
            &[("realm", "protected area")],
        )
        .unwrap();

        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            error.headers[http::header::WWW_AUTHENTICATE],
            "Basic realm=\"protected area\", error=\"error message\""
        );
        assert_eq!(
            error.payload["attributes"],
            json!({ "realm": "protected area", "error": "error message" })
        );
    }

    #[test]
    fn test_system_error_from_status() {
        let error = SystemError::from_status(StatusCode::NOT_FOUND);
        assert_eq!(error.name, "NotFoundError");
        assert_eq!(error.message, "Not Found");

        let error = SystemError::from_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.name, "InternalServerError");

        let error = SystemError::from_status(StatusCode::IM_A_TEAPOT);
        assert_eq!(error.name, "IMATeapotError");
    }

    #[test]
    fn test_status_resolution() {
        assert_eq!(Failure::from(ValidationError::new("bad", json!([]))).status(), 400);
        assert_eq!(Failure::from(SystemError::new("boom")).status(), 500);
        assert_eq!(
            Failure::from(TransportError::from_reply(StatusCode::FORBIDDEN, json!({}))).status(),
            403
        );
    }

    #[test]
    fn test_only_replyless_transport_escalates() {
        assert!(Failure::from(TransportError::no_reply("ECONNREFUSED")).escalates());
        assert!(!Failure::from(TransportError::from_reply(StatusCode::BAD_GATEWAY, json!(null))).escalates());
        assert!(!Failure::from(SystemError::new("boom")).escalates());
    }

    #[test]
    fn test_anyhow_becomes_system_error() {
        let failure = Failure::from(anyhow::anyhow!("disk full"));
        let FailureKind::System(error) = failure.kind() else {
            unreachable!("anyhow converts to a system error")
        };
        assert_eq!(error.name, "Error");
        assert_eq!(error.message, "disk full");
        assert!(error.cause.is_some());
    }

    #[test]
    fn test_policy_flags() {
        let failure = Failure::from(DomainError::bad_request("x")).exposed(false).cry();
        assert_eq!(failure.expose(), Some(false));
        assert!(failure.is_cry());
        assert_eq!(failure.kind().name(), "domain");
    }
}
