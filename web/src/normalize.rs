//! Request Normalizer: axum request parts to a plain [`Request`].
//!
//! Normalization never fails. Malformed querystrings, cookies or headers
//! degrade to partial mappings.

use crate::extensions::{AmbientState, ParsedBody};
use axum::body::{Body, HttpBody};
use axum::extract::{FromRequestParts, OriginalUri, RawPathParams};
use axum::http::request::Parts;
use axum::http::header;
use futures::TryStreamExt;
use portico_core::query::QueryOptions;
use portico_core::request::{Request, RequestBody, flatten_headers, resolve_protocol};
use portico_core::{BoxError, cookies};
use std::collections::BTreeMap;

/// Build the handler-facing request.
///
/// Takes the parsed body from a [`ParsedBody`] extension when upstream
/// middleware left one, and merges an [`AmbientState`] extension under the
/// normalized fields.
pub async fn normalize(parts: &mut Parts, body: Body, options: &QueryOptions) -> Request {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.clone(), |original| original.0.clone());

    let url = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_owned(), |target| target.as_str().to_owned());

    let forwarded = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok());
    let protocol = resolve_protocol(forwarded, uri.scheme_str().unwrap_or("http"));

    let cookie_header = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let cookies = cookies::parse(Some(cookie_header.as_str()));

    let params = path_params(parts).await;
    let body = request_body(parts, body);

    let mut request = Request::from_target(parts.method.as_str(), &url, options);
    request.headers = flatten_headers(&parts.headers);
    request.cookies = cookies;
    request.params = params;
    request.body = body;
    request.protocol = protocol;

    if let Some(AmbientState(state)) = parts.extensions.get::<AmbientState>().cloned() {
        request.merge_state(state);
    }

    tracing::debug!(
        method = %request.method,
        pathname = %request.pathname,
        protocol = %request.protocol,
        params = request.params.len(),
        "Request normalized"
    );

    request
}

async fn path_params(parts: &mut Parts) -> BTreeMap<String, String> {
    // Missing when the service is not behind a parameterised route.
    RawPathParams::from_request_parts(parts, &())
        .await
        .map(|params| {
            params
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn request_body(parts: &mut Parts, body: Body) -> RequestBody {
    if let Some(ParsedBody(value)) = parts.extensions.remove::<ParsedBody>() {
        return RequestBody::Parsed(value);
    }
    if body.size_hint().exact() == Some(0) {
        return RequestBody::Absent;
    }
    RequestBody::Stream(Box::pin(
        body.into_data_stream()
            .map_err(|err| -> BoxError { Box::new(err) }),
    ))
}
