//! # Portico Testing
//!
//! Testing utilities and helpers for Portico.
//!
//! This crate provides:
//! - Mock implementations of the environment traits (clock, fault reporter)
//! - Helpers for reading materialized response bodies
//! - A test-friendly tracing subscriber
//!
//! ## Example
//!
//! ```ignore
//! use portico_testing::{RecordingReporter, body_text};
//!
//! #[tokio::test]
//! async fn test_hidden_failure_is_reported() {
//!     let reporter = Arc::new(RecordingReporter::new());
//!     let config = MountConfig::builder().reporter(reporter.clone()).build();
//!     let response = send(mount_with(handler, config), "/boom").await;
//!
//!     assert_eq!(body_text(response).await, "");
//!     assert_eq!(reporter.len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use portico_core::environment::{Clock, FaultReport, FaultReporter};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, FaultReport, FaultReporter, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use portico_testing::mocks::FixedClock;
    /// use portico_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Fault reporter that keeps every report in memory.
    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<FaultReport>>,
    }

    impl RecordingReporter {
        /// Create an empty reporter.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of everything reported so far, oldest first.
        #[must_use]
        pub fn reports(&self) -> Vec<FaultReport> {
            self.reports
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of reports received.
        #[must_use]
        pub fn len(&self) -> usize {
            self.reports
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Whether nothing was reported.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl FaultReporter for RecordingReporter {
        fn report(&self, report: &FaultReport) {
            self.reports
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(report.clone());
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use axum::body::{Body, to_bytes};
    use axum::response::Response;
    use bytes::Bytes;

    /// Collect a materialized response body.
    ///
    /// # Panics
    ///
    /// Panics if the body stream fails.
    #[allow(clippy::expect_used)]
    pub async fn body_bytes(response: Response<Body>) -> Bytes {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable")
    }

    /// Collect a materialized response body as text.
    ///
    /// # Panics
    ///
    /// Panics if the body stream fails or is not UTF-8.
    #[allow(clippy::expect_used)]
    pub async fn body_text(response: Response<Body>) -> String {
        String::from_utf8(body_bytes(response).await.to_vec())
            .expect("response body should be UTF-8")
    }

    /// Install a `tracing` subscriber that writes through the test harness.
    /// Safe to call from every test; only the first call installs it.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::{body_bytes, body_text, init_tracing};
pub use mocks::{FixedClock, RecordingReporter, test_clock};
