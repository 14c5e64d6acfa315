//! Response Materializer: plain [`Response`] to an axum response.

use axum::body::Body as HostBody;
use axum::http::header::{self, HeaderValue};
use axum::http::{HeaderMap, Method, StatusCode};
use metrics::counter;
use portico_core::response::{Body, Response, merge_headers};

/// Write a response for a request made with `method`.
///
/// - The baseline `content-type: application/octet-stream` goes in first, so
///   anything the response sets overrides it.
/// - `204`, `205` and `304` carry no body and no content headers.
/// - Buffered bodies get an exact `content-length` and no
///   `transfer-encoding`; streams never get a `content-length`.
/// - `HEAD` drops the body but keeps the `content-length` a `GET` would send.
#[must_use]
pub fn materialize(response: Response, method: &Method) -> axum::response::Response {
    let status = response.resolved_status();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    merge_headers(&mut headers, response.headers);

    let body = if is_bodiless(status) {
        headers.remove(header::CONTENT_TYPE);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
        HostBody::empty()
    } else {
        match response.body {
            Body::Stream(stream) => {
                headers.remove(header::CONTENT_LENGTH);
                HostBody::from_stream(stream)
            }
            Body::Empty => fixed_length(&mut headers, 0, HostBody::empty()),
            Body::Text(text) => fixed_length(&mut headers, text.len(), HostBody::from(text)),
            Body::Bytes(bytes) => fixed_length(&mut headers, bytes.len(), HostBody::from(bytes)),
        }
    };

    let body = if method == Method::HEAD {
        HostBody::empty()
    } else {
        body
    };

    counter!("portico_responses_total", "status" => status.as_str().to_owned()).increment(1);

    let mut written = axum::response::Response::new(body);
    *written.status_mut() = status;
    *written.headers_mut() = headers;
    written
}

// A known length replaces any framing the handler asked for.
fn fixed_length(headers: &mut HeaderMap, len: usize, body: HostBody) -> HostBody {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    body
}

fn is_bodiless(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
    )
}
