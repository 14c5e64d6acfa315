//! Axum host binding for Portico.
//!
//! This crate mounts plain handler functions (see [`portico_core`]) into an
//! axum application. The mounted handler is a tower service, so it plugs
//! into a `Router`, nests under other services and composes with any tower
//! layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Host (axum / tower)             │  ← routing, TLS, connections
//! ├─────────────────────────────────────────┤
//! │         Mount (this crate)              │
//! │  - normalize http::Request → Request    │  ← params, cookies, query
//! │  - classify + report failures           │  ← fault sink
//! │  - ETag / 304, materialize              │  ← content headers
//! ├─────────────────────────────────────────┤
//! │         Handler                         │
//! │  Request → Result<Response, Rejection>  │  ← plain values, no framework
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use axum::{Router, error_handling::HandleErrorLayer, routing::get_service};
//! use portico_core::failure::DomainError;
//! use portico_core::{Request, Response, Rejection, json};
//! use portico_web::{correlation_id_layer, handle_escalation, mount};
//! use tower::ServiceBuilder;
//!
//! async fn show_user(request: Request) -> Result<Response, Rejection> {
//!     let id = request
//!         .params
//!         .get("id")
//!         .ok_or_else(|| DomainError::not_found("no such user"))?;
//!     Ok(json(&serde_json::json!({ "id": id }), None)?)
//! }
//!
//! let users = ServiceBuilder::new()
//!     .layer(HandleErrorLayer::new(handle_escalation))
//!     .service(mount(show_user));
//!
//! let app: Router = Router::new()
//!     .route("/users/:id", get_service(users))
//!     .layer(correlation_id_layer());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extensions;
pub mod materialize;
pub mod middleware;
pub mod mount;
pub mod normalize;
pub mod reporter;

// Re-export key types for convenience
pub use config::{MountConfig, MountConfigBuilder};
pub use error::{ConfigError, Escalation, handle_escalation};
pub use extensions::{AmbientState, ParsedBody};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, CorrelationIdExt, correlation_id_layer};
pub use mount::{Handler, Mount, SyncHandler, mount, mount_with, sync_handler};
pub use reporter::FaultSink;
