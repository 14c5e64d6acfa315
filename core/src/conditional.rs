//! Conditional caching: ETag fingerprints and `If-None-Match`.
//!
//! This is a post-processing step over a fully formed [`Response`]. Handlers
//! always run; only what the client receives changes.

use crate::response::{Body, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use sha1::{Digest, Sha1};

/// What [`apply`] did to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Not eligible: non-2xx status, streamed or empty body without an etag.
    Skipped,
    /// Tagged, and the client copy (if any) is stale.
    Modified,
    /// Replaced with `304 Not Modified`.
    NotModified,
}

/// Strong ETag for a buffered body: byte length in hex plus a truncated
/// base64 SHA-1 digest, quoted.
#[must_use]
pub fn fingerprint(body: &[u8]) -> String {
    let digest = STANDARD.encode(Sha1::digest(body));
    format!("\"{:x}-{}\"", body.len(), &digest[..27])
}

/// Whether an `If-None-Match` value matches `etag`.
///
/// `*` matches anything; otherwise any comma-separated entry matches when it
/// equals `etag` after dropping a weak `W/` prefix on either side.
#[must_use]
pub fn is_fresh(if_none_match: &str, etag: &str) -> bool {
    let if_none_match = if_none_match.trim();
    if if_none_match == "*" {
        return true;
    }
    let etag = strip_weak(etag.trim());
    if_none_match
        .split(',')
        .map(|candidate| strip_weak(candidate.trim()))
        .any(|candidate| candidate == etag)
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Tag `response` and short-circuit it to `304` when the client copy is
/// fresh.
///
/// Only 2xx responses are considered. A handler-set `etag` is kept as is;
/// otherwise non-empty buffered bodies are fingerprinted. The 304 path only
/// applies to `GET` and `HEAD`: it drops the body and the content headers and
/// keeps every other header, `etag` included.
pub fn apply(method: &Method, if_none_match: Option<&str>, response: &mut Response) -> Freshness {
    if !response.resolved_status().is_success() {
        return Freshness::Skipped;
    }

    let etag = match response.headers.get(header::ETAG) {
        Some(existing) => existing.to_str().ok().map(str::to_owned),
        None => tag(response),
    };
    let Some(etag) = etag else {
        return Freshness::Skipped;
    };

    let cacheable = *method == Method::GET || *method == Method::HEAD;
    match if_none_match {
        Some(if_none_match) if cacheable && is_fresh(if_none_match, &etag) => {
            response.status = Some(StatusCode::NOT_MODIFIED);
            response.body = Body::Empty;
            response.headers.remove(header::CONTENT_TYPE);
            response.headers.remove(header::CONTENT_LENGTH);
            Freshness::NotModified
        }
        _ => Freshness::Modified,
    }
}

fn tag(response: &mut Response) -> Option<String> {
    let bytes = response.body.as_bytes().filter(|bytes| !bytes.is_empty())?;
    let etag = fingerprint(bytes);
    // A fingerprint is always quoted visible ASCII.
    let value = HeaderValue::from_str(&etag).ok()?;
    response.headers.insert(header::ETAG, value);
    Some(etag)
}
