//! Correlation id middleware.
//!
//! # Example
//!
//! ```
//! use axum::{Router, error_handling::HandleErrorLayer};
//! use portico_core::{Request, Response, Rejection};
//! use portico_web::{correlation_id_layer, handle_escalation, mount};
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(HandleErrorLayer::new(handle_escalation))
//!     .service(mount(|_request: Request| async {
//!         Ok::<_, Rejection>(Response::new("ok"))
//!     }));
//!
//! let app: Router = Router::new()
//!     .route_service("/", service)
//!     .layer(correlation_id_layer());
//! ```
//!
//! # Flow
//!
//! 1. **Extract** the id from the `X-Correlation-ID` header, or generate a new UUID
//! 2. **Store** it in request extensions, where the pipeline picks it up for fault reports
//! 3. **Create** a tracing span with a `correlation_id` field
//! 4. **Echo** the id in the response `X-Correlation-ID` header

use axum::{
    extract::Request,
    http::{Extensions, HeaderValue, request::Parts},
    response::Response,
};
use std::fmt;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation id stored in request extensions by [`correlation_id_layer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub Uuid);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Create a layer that adds correlation ID tracking to all requests.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map_or_else(|| CorrelationId(Uuid::new_v4()), CorrelationId);

        req.extensions_mut().insert(correlation_id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// Read the correlation id stored by [`correlation_id_layer`].
pub trait CorrelationIdExt {
    /// The correlation id, or `None` when the middleware is not installed.
    fn correlation_id(&self) -> Option<CorrelationId>;
}

impl CorrelationIdExt for Extensions {
    fn correlation_id(&self) -> Option<CorrelationId> {
        self.get::<CorrelationId>().copied()
    }
}

impl CorrelationIdExt for Parts {
    fn correlation_id(&self) -> Option<CorrelationId> {
        self.extensions.correlation_id()
    }
}

impl CorrelationIdExt for Request {
    fn correlation_id(&self) -> Option<CorrelationId> {
        self.extensions().correlation_id()
    }
}
