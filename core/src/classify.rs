//! Error classification.
//!
//! Maps a [`Failure`] to the response the client sees, and decides whether
//! the failure must be reported.
//!
//! # Rules
//!
//! 1. The kind picks status, body and kind-specific headers (see
//!    [`crate::failure`]). Validation, transport and system failures get
//!    `content-type: application/json`; domain errors carry only their own
//!    headers.
//! 2. Failure-level headers are merged last and win on collision.
//! 3. Exposure: the body is dropped when `expose` is `false`, or when it is
//!    unset and the status is 500 or above. Status and headers stay.
//! 4. Observability: statuses from 500 up and `cry` failures are reported,
//!    independently of exposure.

use crate::failure::{Failure, FailureKind};
use crate::response::{Body, Response, merge_headers};
use http::header::{self, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::{Value, json};

/// Outcome of classifying one failure.
#[derive(Debug)]
pub struct Classification {
    /// Response to write.
    pub response: Response,
    /// Whether the body survived the exposure policy.
    pub expose: bool,
    /// Whether the failure must go to the fault sink.
    pub observe: bool,
}

/// Whether `status` counts as a server fault: anything from 500 up,
/// including the non-standard 6xx-9xx range.
#[must_use]
pub const fn is_server_fault(status: StatusCode) -> bool {
    status.as_u16() >= 500
}

/// Classify a failure.
#[must_use]
pub fn classify(failure: &Failure) -> Classification {
    let status = failure.status();

    let mut headers = HeaderMap::new();
    if !matches!(failure.kind(), FailureKind::Domain(_)) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    let body: Value = match failure.kind() {
        FailureKind::Domain(error) => {
            merge_headers(&mut headers, error.headers.clone());
            error.payload.clone()
        }
        FailureKind::Validation(error) => json!({
            "details": error.details,
            "message": error.message,
            "name": error.name,
        }),
        FailureKind::Transport(error) => json!({
            "message": error.message,
            "statusCode": status.as_u16(),
            "data": error.reply.as_ref().map_or(Value::Null, |reply| reply.data.clone()),
        }),
        FailureKind::System(error) => json!({
            "message": error.message,
            "name": error.name,
        }),
    };

    merge_headers(&mut headers, failure.headers().clone());

    let expose = match failure.expose() {
        Some(expose) => expose,
        None => !is_server_fault(status),
    };
    let observe = is_server_fault(status) || failure.is_cry();

    let body = if expose {
        Body::Text(body.to_string())
    } else {
        Body::Empty
    };

    Classification {
        response: Response {
            status: Some(status),
            headers,
            body,
        },
        expose,
        observe,
    }
}
