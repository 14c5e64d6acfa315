//! Injected dependencies: the clock and the fault reporter.
//!
//! Nothing in the pipeline reaches for global state directly. The host
//! binding passes implementations of these traits in through its
//! configuration, which keeps the stages testable with fixed clocks and
//! recording reporters.

use crate::failure::Failure;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use portico_core::Clock;
///
/// struct FixedClock {
///     time: DateTime<Utc>,
/// }
///
/// impl Clock for FixedClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.time
///     }
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Request details attached to a fault report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultContext {
    /// Uppercase HTTP verb.
    pub method: String,
    /// Original request target.
    pub url: String,
    /// Correlation id, when the request carried one.
    pub correlation_id: Option<String>,
}

/// One reported failure.
#[derive(Debug, Clone)]
pub struct FaultReport {
    /// The failure as the handler raised it, before any body hiding.
    pub failure: Arc<Failure>,
    /// Status the client was answered with.
    pub status: StatusCode,
    /// Request details.
    pub context: FaultContext,
    /// When the failure was classified.
    pub occurred_at: DateTime<Utc>,
}

/// Destination for failures that must be observed.
///
/// Implementations are shared across concurrent requests, so one call to
/// [`report`](FaultReporter::report) must deliver one report atomically.
pub trait FaultReporter: Send + Sync {
    /// Deliver a report.
    fn report(&self, report: &FaultReport);
}

impl<R: FaultReporter + ?Sized> FaultReporter for Arc<R> {
    fn report(&self, report: &FaultReport) {
        (**self).report(report);
    }
}
