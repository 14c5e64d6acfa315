//! End-to-end tests: handlers mounted in an axum router, driven with
//! `oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::body::{Body, to_bytes};
use axum::error_handling::HandleErrorLayer;
use axum::extract::Request as HostRequest;
use axum::http::{self, StatusCode, header};
use axum::middleware::{self, Next};
use axum::routing::{MethodRouter, any_service};
use axum::Router;
use futures::stream;
use portico_core::failure::{
    DomainError, Failure, SystemError, TransportError, ValidationError,
};
use portico_core::{Body as ResponseBody, Rejection, Request, Response, json};
use portico_testing::{RecordingReporter, body_text, init_tracing, test_clock};
use portico_web::{
    AmbientState, CORRELATION_ID_HEADER, Handler, MountConfig, correlation_id_layer,
    handle_escalation, mount_with, sync_handler,
};
use serde_json::{Value, json as json_value};
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};

const STRING_ETAG: &str = "\"6-7LJSBEteoPZ57njsGhKQRznikE0\"";
const BUFFER_ETAG: &str = "\"6-5Twuof5L0reL9HI8fBVaV44CCiU\"";

fn serve<H: Handler>(handler: H, config: &MountConfig) -> MethodRouter {
    any_service(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_escalation))
            .service(mount_with(handler, config.clone())),
    )
}

fn fail(failure: impl Into<Failure>) -> Result<Response, Rejection> {
    Err(Rejection::Failure(failure.into()))
}

fn joi_error() -> ValidationError {
    ValidationError::new(
        "\"value\" must be a string",
        json_value!([{
            "message": "\"value\" must be a string",
            "path": [],
            "type": "string.base",
            "context": { "label": "value", "value": 123 }
        }]),
    )
}

fn boom_error() -> DomainError {
    DomainError::challenge("error message", "Basic", &[("realm", "protected area")]).unwrap()
}

async fn echo_url(request: Request) -> Result<Response, Rejection> {
    Ok(json(
        &json_value!({ "pathname": request.pathname, "query": request.query }),
        None,
    )?)
}

async fn echo_body(request: Request) -> Result<Response, Rejection> {
    Ok(json(
        &json_value!({
            "isReadable": request.body.is_stream(),
            "parsed": request.body.parsed(),
        }),
        None,
    )?)
}

fn app() -> (Router, Arc<RecordingReporter>) {
    init_tracing();

    let reporter = Arc::new(RecordingReporter::new());
    let config = MountConfig::builder()
        .reporter(reporter.clone())
        .clock(Arc::new(test_clock()))
        .build();

    let router = Router::new()
        .route(
            "/axios",
            serve(
                sync_handler(|_: Request| fail(TransportError::no_reply("connect ECONNREFUSED 127.0.0.1:80"))),
                &config,
            ),
        )
        .route(
            "/axios-reply",
            serve(
                sync_handler(|_: Request| {
                    fail(TransportError::from_reply(
                        StatusCode::FORBIDDEN,
                        json_value!({ "realm": "protected area", "error": "error message" }),
                    ))
                }),
                &config,
            ),
        )
        .route("/body", serve(echo_body, &config))
        .route("/boom", serve(sync_handler(|_: Request| fail(boom_error())), &config))
        .route(
            "/boom-expose",
            serve(
                sync_handler(|_: Request| fail(Failure::from(boom_error()).exposed(true))),
                &config,
            ),
        )
        .route(
            "/boom-hidden",
            serve(
                sync_handler(|_: Request| fail(Failure::from(boom_error()).exposed(false))),
                &config,
            ),
        )
        .route(
            "/broke",
            serve(
                sync_handler(|_: Request| {
                    let chunks = stream::iter(vec![
                        Ok("bro".to_owned()),
                        Err(std::io::Error::other("stream broke")),
                    ]);
                    Ok(Response::new(ResponseBody::stream(chunks)))
                }),
                &config,
            ),
        )
        .route(
            "/buffer",
            serve(
                sync_handler(|_: Request| Ok(Response::new(vec![0x62, 0x75, 0x66, 0x66, 0x65, 0x72]))),
                &config,
            ),
        )
        .route(
            "/cookie",
            serve(
                sync_handler(|request: Request| Ok(json(&request.cookies, None)?)),
                &config,
            ),
        )
        .route(
            "/cry",
            serve(
                sync_handler(|_: Request| fail(Failure::from(DomainError::bad_request("")).cry())),
                &config,
            ),
        )
        .route("/error", serve(sync_handler(|_: Request| fail(SystemError::new("error"))), &config))
        .route(
            "/error-expose",
            serve(
                sync_handler(|_: Request| fail(Failure::from(SystemError::new("error")).exposed(true))),
                &config,
            ),
        )
        .route(
            "/error-hidden",
            serve(
                sync_handler(|_: Request| fail(Failure::from(SystemError::new("error")).exposed(false))),
                &config,
            ),
        )
        .route(
            "/http",
            serve(
                sync_handler(|_: Request| fail(SystemError::from_status(StatusCode::NOT_FOUND))),
                &config,
            ),
        )
        .route(
            "/http-expose",
            serve(
                sync_handler(|_: Request| {
                    fail(Failure::from(SystemError::from_status(StatusCode::NOT_FOUND)).exposed(true))
                }),
                &config,
            ),
        )
        .route(
            "/http-hidden",
            serve(
                sync_handler(|_: Request| {
                    fail(Failure::from(SystemError::from_status(StatusCode::NOT_FOUND)).exposed(false))
                }),
                &config,
            ),
        )
        .route("/joi", serve(sync_handler(|_: Request| fail(joi_error())), &config))
        .route(
            "/joi-expose",
            serve(
                sync_handler(|_: Request| fail(Failure::from(joi_error()).exposed(true))),
                &config,
            ),
        )
        .route(
            "/joi-hidden",
            serve(
                sync_handler(|_: Request| fail(Failure::from(joi_error()).exposed(false))),
                &config,
            ),
        )
        .route(
            "/json",
            serve(sync_handler(|_: Request| Ok(json(&json_value!({}), None)?)), &config),
        )
        .route("/none", serve(sync_handler(|_: Request| Ok(Response::default())), &config))
        .route(
            "/protocol",
            serve(
                sync_handler(|request: Request| Ok(json(&json_value!({ "protocol": request.protocol }), None)?)),
                &config,
            ),
        )
        .route(
            "/reject",
            serve(
                sync_handler(|_: Request| Err(Rejection::Response(Response::new("rejected")))),
                &config,
            ),
        )
        .route(
            "/state",
            serve(
                sync_handler(|request: Request| Ok(json(&request, None)?)),
                &config,
            ),
        )
        .route(
            "/stream",
            serve(
                sync_handler(|_: Request| {
                    let chunks = stream::iter(vec![Ok::<_, std::io::Error>("stream")]);
                    Ok(Response::new(ResponseBody::stream(chunks)))
                }),
                &config,
            ),
        )
        .route("/string", serve(sync_handler(|_: Request| Ok(Response::new("string"))), &config))
        .route("/url", serve(echo_url, &config))
        .route(
            "/users/:id",
            serve(
                sync_handler(|request: Request| Ok(json(&request.params, None)?)),
                &config,
            ),
        )
        .layer(middleware::from_fn(ambient_state))
        .layer(correlation_id_layer());

    (router, reporter)
}

async fn ambient_state(mut request: HostRequest, next: Next) -> axum::response::Response {
    if request.uri().path() == "/state" {
        request.extensions_mut().insert(
            AmbientState::default()
                .with("user", json_value!("ada"))
                .with("url", json_value!("/spoofed")),
        );
    }
    next.run(request).await
}

async fn call(router: &Router, request: http::Request<Body>) -> axum::response::Response {
    router.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str) -> http::Request<Body> {
    http::Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

mod request {
    use super::*;

    #[tokio::test]
    async fn parses_the_pathname_and_query() {
        let (app, _) = app();
        let response = call(&app, get("/url?foo=bar")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json_value!({ "pathname": "/url", "query": { "foo": "bar" } })
        );
    }

    #[tokio::test]
    async fn parses_nested_queries() {
        let (app, _) = app();
        let response = call(&app, get("/url?a%5Bb%5D=1&a.c=2&list=x&list=y")).await;

        assert_eq!(
            body_json(response).await["query"],
            json_value!({ "a": { "b": "1", "c": "2" }, "list": ["x", "y"] })
        );
    }

    #[tokio::test]
    async fn parses_the_protocol() {
        let (app, _) = app();
        let response = call(&app, get("/protocol")).await;
        assert_eq!(body_json(response).await, json_value!({ "protocol": "http" }));
    }

    #[tokio::test]
    async fn parses_the_cookies() {
        let (app, _) = app();
        let request = http::Request::builder()
            .uri("/cookie")
            .header(header::COOKIE, "foo=bar; equation=E%3Dmc%5E2")
            .body(Body::empty())
            .unwrap();

        let body = body_json(call(&app, request).await).await;

        assert_eq!(body["foo"], "bar");
        assert_eq!(body["equation"], "E=mc^2");
    }

    #[tokio::test]
    async fn passes_route_params_through() {
        let (app, _) = app();
        let response = call(&app, get("/users/42")).await;
        assert_eq!(body_json(response).await, json_value!({ "id": "42" }));
    }

    #[tokio::test]
    async fn request_fields_shadow_ambient_state() {
        let (app, _) = app();
        let response = call(&app, get("/state?x=1")).await;

        let body = body_json(response).await;
        assert_eq!(body["user"], "ada");
        assert_eq!(body["url"], "/state?x=1");
        assert_eq!(body["method"], "GET");
    }
}

mod request_headers {
    use super::*;

    #[tokio::test]
    async fn stale_if_none_match_returns_full_body() {
        let (app, _) = app();
        let request = http::Request::builder()
            .uri("/string")
            .header(header::IF_NONE_MATCH, "\"not-the-right-etag\"")
            .body(Body::empty())
            .unwrap();

        let response = call(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ETAG], STRING_ETAG);
        assert_eq!(body_text(response).await, "string");
    }

    #[tokio::test]
    async fn matching_if_none_match_returns_304() {
        let (app, _) = app();
        let first = call(&app, get("/string")).await;
        let etag = first.headers()[header::ETAG].clone();

        let request = http::Request::builder()
            .uri("/string")
            .header(header::IF_NONE_MATCH, etag.clone())
            .body(Body::empty())
            .unwrap();
        let response = call(&app, request).await;

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], etag);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn zero_content_length_means_no_body() {
        let (app, _) = app();
        let request = http::Request::builder()
            .uri("/body")
            .header(header::CONTENT_LENGTH, "0")
            .body(Body::empty())
            .unwrap();

        let response = call(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["isReadable"], false);
    }

    #[tokio::test]
    async fn missing_content_type_does_not_explode() {
        let (app, _) = app();
        let request = http::Request::builder()
            .method("POST")
            .uri("/body")
            .header(header::CONTENT_TYPE, "")
            .body(Body::from("body"))
            .unwrap();

        let response = call(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["isReadable"], true);
    }

    #[tokio::test]
    async fn uses_x_forwarded_proto_when_present() {
        let (app, _) = app();
        let request = http::Request::builder()
            .uri("/protocol")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();

        let response = call(&app, request).await;

        assert_eq!(body_json(response).await, json_value!({ "protocol": "https" }));
    }
}

mod response_body {
    use super::*;

    #[tokio::test]
    async fn accepts_a_buffer() {
        let (app, _) = app();
        let response = call(&app, get("/buffer")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "buffer");
    }

    #[tokio::test]
    async fn accepts_a_string() {
        let (app, _) = app();
        assert_eq!(body_text(call(&app, get("/string")).await).await, "string");
    }

    #[tokio::test]
    async fn accepts_a_stream() {
        let (app, _) = app();
        let response = call(&app, get("/stream")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ETAG).is_none());
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(body_text(response).await, "stream");
    }

    #[tokio::test]
    async fn a_broken_stream_fails_the_body_not_the_status() {
        let (app, _) = app();
        let response = call(&app, get("/broke")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn accepts_no_content() {
        let (app, _) = app();
        let response = call(&app, get("/none")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ETAG).is_none());
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn drops_body_if_method_is_head() {
        let (app, _) = app();
        let request = http::Request::builder()
            .method("HEAD")
            .uri("/buffer")
            .body(Body::empty())
            .unwrap();

        let response = call(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "6");
        assert_eq!(body_text(response).await, "");
    }
}

mod response_headers {
    use super::*;

    #[tokio::test]
    async fn accepts_handler_headers() {
        let (app, _) = app();
        let response = call(&app, get("/json")).await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn defaults_the_content_type_to_octet_stream() {
        let (app, _) = app();
        let response = call(&app, get("/string")).await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn sets_content_length_for_buffers_and_strings() {
        let (app, _) = app();
        assert_eq!(call(&app, get("/buffer")).await.headers()[header::CONTENT_LENGTH], "6");
        assert_eq!(call(&app, get("/string")).await.headers()[header::CONTENT_LENGTH], "6");
    }

    #[tokio::test]
    async fn sets_the_etag_for_buffers_and_strings() {
        let (app, _) = app();
        assert_eq!(call(&app, get("/buffer")).await.headers()[header::ETAG], BUFFER_ETAG);
        assert_eq!(call(&app, get("/string")).await.headers()[header::ETAG], STRING_ETAG);
    }

    #[tokio::test]
    async fn echoes_the_correlation_id() {
        let (app, _) = app();
        let response = call(&app, get("/string")).await;
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn defaults_status_to_500() {
        let (app, reporter) = app();
        let response = call(&app, get("/error")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].failure.to_string(), "Error: error");
        assert_eq!(reports[0].context.method, "GET");
        assert_eq!(reports[0].context.url, "/error");
        assert!(reports[0].context.correlation_id.is_some());
    }

    #[tokio::test]
    async fn defaults_status_to_500_exposed() {
        let (app, reporter) = app();
        let response = call(&app, get("/error-expose")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json_value!({ "message": "error", "name": "Error" })
        );
        assert_eq!(reporter.len(), 1);
    }

    #[tokio::test]
    async fn defaults_status_to_500_hidden() {
        let (app, reporter) = app();
        let response = call(&app, get("/error-hidden")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");
        assert_eq!(reporter.len(), 1);
    }

    #[tokio::test]
    async fn formats_transport_errors() {
        let (app, reporter) = app();
        let response = call(&app, get("/axios-reply")).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await,
            json_value!({
                "statusCode": 403,
                "message": "Request failed with status code 403",
                "data": { "realm": "protected area", "error": "error message" }
            })
        );
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn escalates_transport_errors_without_a_reply() {
        let (app, reporter) = app();
        let response = call(&app, get("/axios")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "");
        assert!(reporter.is_empty());
    }

    async fn assert_boom(path: &str, exposed: bool) {
        let (app, reporter) = app();
        let response = call(&app, get(path)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap().to_owned();
        assert!(challenge.contains("Basic"));
        assert!(challenge.contains("realm=\"protected area\""));
        assert!(challenge.contains("error=\"error message\""));

        if exposed {
            assert_eq!(
                body_json(response).await,
                json_value!({
                    "statusCode": 401,
                    "error": "Unauthorized",
                    "message": "error message",
                    "attributes": { "realm": "protected area", "error": "error message" }
                })
            );
        } else {
            assert_eq!(body_text(response).await, "");
        }
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn formats_domain_errors() {
        assert_boom("/boom", true).await;
    }

    #[tokio::test]
    async fn formats_domain_errors_exposed() {
        assert_boom("/boom-expose", true).await;
    }

    #[tokio::test]
    async fn formats_domain_errors_hidden() {
        assert_boom("/boom-hidden", false).await;
    }

    #[tokio::test]
    async fn formats_http_errors() {
        for path in ["/http", "/http-expose"] {
            let (app, reporter) = app();
            let response = call(&app, get(path)).await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(
                body_json(response).await,
                json_value!({ "message": "Not Found", "name": "NotFoundError" })
            );
            assert!(reporter.is_empty());
        }
    }

    #[tokio::test]
    async fn formats_http_errors_hidden() {
        let (app, reporter) = app();
        let response = call(&app, get("/http-hidden")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "");
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn formats_validation_errors() {
        for path in ["/joi", "/joi-expose"] {
            let (app, reporter) = app();
            let response = call(&app, get(path)).await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                body_json(response).await,
                json_value!({
                    "message": "\"value\" must be a string",
                    "name": "ValidationError",
                    "details": [{
                        "message": "\"value\" must be a string",
                        "path": [],
                        "type": "string.base",
                        "context": { "label": "value", "value": 123 }
                    }]
                })
            );
            assert!(reporter.is_empty());
        }
    }

    #[tokio::test]
    async fn formats_validation_errors_hidden() {
        let (app, reporter) = app();
        let response = call(&app, get("/joi-hidden")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "");
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn reports_when_cry_is_set() {
        let (app, reporter) = app();
        let response = call(&app, get("/cry")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json_value!({ "error": "Bad Request", "message": "Bad Request", "statusCode": 400 })
        );

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, StatusCode::BAD_REQUEST);
        assert_eq!(reports[0].failure.kind().name(), "domain");
    }

    #[tokio::test]
    async fn accepts_rejected_responses() {
        let (app, reporter) = app();
        let response = call(&app, get("/reject")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "rejected");
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn error_responses_are_not_tagged() {
        let (app, _) = app();
        let response = call(&app, get("/http-expose")).await;
        assert!(response.headers().get(header::ETAG).is_none());
    }
}

#[tokio::test]
async fn parsed_bodies_reach_the_handler() {
    let (router, _) = app();
    let app = router.layer(middleware::from_fn(
        |mut request: HostRequest, next: Next| async move {
            request
                .extensions_mut()
                .insert(portico_web::ParsedBody(json_value!({ "name": "widget" })));
            next.run(request).await
        },
    ));

    let request = http::Request::builder()
        .method("POST")
        .uri("/body")
        .body(Body::from("{\"name\":\"widget\"}"))
        .unwrap();
    let body = body_json(call(&app, request).await).await;

    assert_eq!(body["isReadable"], false);
    assert_eq!(body["parsed"], json_value!({ "name": "widget" }));
}
