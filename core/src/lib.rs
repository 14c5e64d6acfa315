//! # Portico Core
//!
//! Host-independent values and pure pipeline stages for Portico.
//!
//! Portico is a thin translation layer between a host HTTP framework and plain
//! handler functions. This crate holds everything that does not depend on the
//! host: the values handlers see and return, and the stages that normalize
//! what they produce.
//!
//! ## Core Concepts
//!
//! - **Request**: plain, serializable view of an incoming request
//! - **Response**: status, headers and a buffered or streamed body
//! - **Rejection**: what a handler fails with, either a classified [`Failure`]
//!   or a ready-made [`Response`] that passes straight through
//! - **Classification**: mapping of a [`Failure`] to a response plus the
//!   exposure and observability decisions
//! - **Conditional caching**: ETag fingerprinting and `If-None-Match` handling
//!
//! ## Pipeline
//!
//! ```text
//! host context ─▶ Request ─▶ handler ─┬─▶ Response ───────────────┐
//!                                     └─▶ Rejection ─▶ classify ──┤
//!                                                                 ▼
//!                                      host response ◀─ materialize ◀─ conditional
//! ```
//!
//! ## Example
//!
//! ```
//! use portico_core::{json, Request, Response, Rejection};
//! use portico_core::failure::DomainError;
//!
//! async fn show(request: Request) -> Result<Response, Rejection> {
//!     let Some(id) = request.params.get("id") else {
//!         return Err(DomainError::not_found("missing id").into());
//!     };
//!     Ok(json(&serde_json::json!({ "id": id }), None)?)
//! }
//! ```

pub mod classify;
pub mod conditional;
pub mod cookies;
pub mod environment;
pub mod failure;
pub mod query;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use classify::{Classification, classify, is_server_fault};
pub use conditional::{Freshness, fingerprint};
pub use environment::{Clock, FaultContext, FaultReport, FaultReporter, SystemClock};
pub use failure::{Failure, FailureKind, Rejection};
pub use query::QueryOptions;
pub use request::{Request, RequestBody};
pub use response::{Body, ByteStream, Response, html, json, redirect, send};

/// Boxed error used by streamed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
