//! Error types for the host binding.
//!
//! Handler failures never show up here: they are classified into responses.
//! What remains is the one failure the pipeline refuses to answer for, and
//! configuration mistakes.

use axum::http::StatusCode;
use thiserror::Error;

/// A failure handed to the host's top-level fault handler instead of being
/// turned into a client response.
#[derive(Debug, Error)]
pub enum Escalation {
    /// A downstream call failed before any reply arrived, so there is no
    /// status worth reporting to the client.
    #[error("upstream call failed without a reply: {message}")]
    Upstream {
        /// What went wrong downstream.
        message: String,
    },
}

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value found.
        value: String,
    },
}

/// Top-level fault handler for escalations, for use with
/// [`HandleErrorLayer`](axum::error_handling::HandleErrorLayer).
///
/// Logs the escalation and answers `500` with an empty body.
///
/// # Example
///
/// ```
/// use axum::{Router, error_handling::HandleErrorLayer};
/// use portico_core::{Request, Response, Rejection};
/// use portico_web::{handle_escalation, mount};
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(HandleErrorLayer::new(handle_escalation))
///     .service(mount(|_request: Request| async {
///         Ok::<_, Rejection>(Response::new("ok"))
///     }));
/// let app: Router = Router::new().route_service("/", service);
/// ```
pub async fn handle_escalation(escalation: Escalation) -> StatusCode {
    tracing::error!(error = %escalation, "Unhandled escalation");
    StatusCode::INTERNAL_SERVER_ERROR
}
