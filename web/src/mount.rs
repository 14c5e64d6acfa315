//! Dispatch Pipeline.
//!
//! [`mount`] turns a plain handler into a tower service. Every request runs
//! the same ordered stages:
//!
//! 1. **normalize** the axum request into a [`Request`]
//! 2. **invoke** the handler exactly once, catching panics
//! 3. **settle** the outcome: pass responses through, classify failures,
//!    report observed failures, escalate the replyless transport failure
//! 4. **fingerprint** buffered 2xx bodies and answer fresh `If-None-Match`
//!    with `304`
//! 5. **materialize** the result into an axum response
//!
//! Stages 1, 3, 4 and 5 are synchronous apart from reading route params;
//! the pipeline only suspends inside the handler.

use crate::config::MountConfig;
use crate::error::Escalation;
use crate::materialize::materialize;
use crate::middleware::CorrelationIdExt;
use crate::normalize::normalize;
use axum::http::{HeaderMap, header};
use futures::FutureExt;
use futures::future::{BoxFuture, Ready, ready};
use metrics::counter;
use portico_core::conditional::{self, Freshness};
use portico_core::environment::{Clock, FaultContext, FaultReport, FaultReporter};
use portico_core::failure::{Failure, SystemError};
use portico_core::{Classification, Rejection, Request, Response, classify};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::Instrument;

/// A request handler.
///
/// Implemented for every `Fn(Request) -> impl Future<Output = Result<Response, Rejection>>`
/// closure or `async fn`. Use [`sync_handler`] for handlers that answer
/// without suspending.
pub trait Handler: Clone + Send + Sync + 'static {
    /// What the handler returns.
    type Future: Future<Output = Result<Response, Rejection>> + Send + 'static;

    /// Handle one request.
    fn call(&self, request: Request) -> Self::Future;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Rejection>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, request: Request) -> Self::Future {
        self(request)
    }
}

/// A handler that answers without suspending. Built by [`sync_handler`].
#[derive(Debug, Clone)]
pub struct SyncHandler<F>(F);

/// Wrap a synchronous function as a [`Handler`].
///
/// ```
/// use portico_core::{Request, Response, Rejection};
/// use portico_web::{mount, sync_handler};
///
/// let service = mount(sync_handler(|request: Request| {
///     Ok::<_, Rejection>(Response::new(request.pathname))
/// }));
/// ```
pub const fn sync_handler<F>(handler: F) -> SyncHandler<F>
where
    F: Fn(Request) -> Result<Response, Rejection> + Clone + Send + Sync + 'static,
{
    SyncHandler(handler)
}

impl<F> Handler for SyncHandler<F>
where
    F: Fn(Request) -> Result<Response, Rejection> + Clone + Send + Sync + 'static,
{
    type Future = Ready<Result<Response, Rejection>>;

    fn call(&self, request: Request) -> Self::Future {
        ready((self.0)(request))
    }
}

/// Mount `handler` with the default configuration.
///
/// Failures are reported to [`FaultSink::global`](crate::FaultSink::global).
#[must_use]
pub fn mount<H: Handler>(handler: H) -> Mount<H> {
    mount_with(handler, MountConfig::default())
}

/// Mount `handler` with an explicit configuration.
#[must_use]
pub fn mount_with<H: Handler>(handler: H, config: MountConfig) -> Mount<H> {
    Mount {
        handler,
        config: Arc::new(config),
    }
}

/// A mounted handler: a tower service over axum requests.
///
/// The error type is [`Escalation`]; wrap the service in
/// [`HandleErrorLayer`](axum::error_handling::HandleErrorLayer) with
/// [`handle_escalation`](crate::handle_escalation) or a custom handler.
#[derive(Clone)]
pub struct Mount<H> {
    handler: H,
    config: Arc<MountConfig>,
}

impl<H> std::fmt::Debug for Mount<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<H: Handler> Service<axum::extract::Request> for Mount<H> {
    type Response = axum::response::Response;
    type Error = Escalation;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: axum::extract::Request) -> Self::Future {
        let handler = self.handler.clone();
        let config = Arc::clone(&self.config);
        Box::pin(dispatch(handler, config, request))
    }
}

async fn dispatch<H: Handler>(
    handler: H,
    config: Arc<MountConfig>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, Escalation> {
    let (mut parts, body) = request.into_parts();
    let correlation_id = parts.correlation_id().map(|id| id.to_string());

    let span = tracing::info_span!(
        "dispatch",
        method = %parts.method,
        path = %parts.uri.path(),
        correlation_id = correlation_id.as_deref().unwrap_or("-"),
    );

    async move {
        let request = normalize(&mut parts, body, &config.query).await;
        let context = FaultContext {
            method: request.method.clone(),
            url: request.url.clone(),
            correlation_id,
        };

        let outcome = invoke(&handler, request, config.catch_panics).await;
        let mut response = settle(outcome, &context, &config)?;

        if config.etag {
            let if_none_match = if_none_match(&parts.headers);
            let freshness =
                conditional::apply(&parts.method, if_none_match.as_deref(), &mut response);
            if freshness == Freshness::NotModified {
                counter!("portico_not_modified_total").increment(1);
                tracing::debug!("Client copy is fresh, answering 304");
            }
        }

        Ok(materialize(response, &parts.method))
    }
    .instrument(span)
    .await
}

async fn invoke<H: Handler>(
    handler: &H,
    request: Request,
    catch_panics: bool,
) -> Result<Response, Rejection> {
    if !catch_panics {
        return handler.call(request).await;
    }

    let future = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(request))) {
        Ok(future) => future,
        Err(payload) => return Err(panicked(payload).into()),
    };

    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panicked(payload).into()))
}

fn panicked(payload: Box<dyn Any + Send>) -> Failure {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned());
    SystemError::new(message).named("Panic").into()
}

fn settle(
    outcome: Result<Response, Rejection>,
    context: &FaultContext,
    config: &MountConfig,
) -> Result<Response, Escalation> {
    let failure = match outcome {
        Ok(response) | Err(Rejection::Response(response)) => return Ok(response),
        Err(Rejection::Failure(failure)) => failure,
    };

    if failure.escalates() {
        tracing::warn!(error = %failure, "Upstream call failed without a reply, escalating");
        return Err(Escalation::Upstream {
            message: failure.to_string(),
        });
    }

    let Classification {
        response,
        expose,
        observe,
    } = classify(&failure);
    let status = response.resolved_status();
    tracing::debug!(
        status = status.as_u16(),
        kind = failure.kind().name(),
        expose,
        observe,
        "Failure classified"
    );

    if observe {
        config.reporter.report(&FaultReport {
            failure: Arc::new(failure),
            status,
            context: context.clone(),
            occurred_at: config.clock.now(),
        });
    }

    Ok(response)
}

fn if_none_match(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}
