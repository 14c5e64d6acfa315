//! Process-wide fault sink.
//!
//! [`FaultSink`] is the default [`FaultReporter`]. Each report is logged,
//! counted, and broadcast as a single message to every subscriber, so
//! alerting and log shipping can attach without touching the pipeline.
//!
//! # Example
//!
//! ```
//! use portico_web::FaultSink;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut reports = FaultSink::global().subscribe();
//! tokio::spawn(async move {
//!     while let Ok(report) = reports.recv().await {
//!         eprintln!("{} {} failed: {}", report.context.method, report.context.url, report.failure);
//!     }
//! });
//! # }
//! ```

use metrics::counter;
use portico_core::environment::{FaultReport, FaultReporter};
use portico_core::is_server_fault;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

/// Reports kept for a subscriber that falls behind.
const CHANNEL_CAPACITY: usize = 256;

static GLOBAL: OnceLock<Arc<FaultSink>> = OnceLock::new();

/// Logs, counts and broadcasts fault reports.
#[derive(Debug)]
pub struct FaultSink {
    sender: broadcast::Sender<Arc<FaultReport>>,
}

impl Default for FaultSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSink {
    /// A sink with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// The sink shared by the whole process. Created on first use and never
    /// replaced.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Receive every report delivered after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FaultReport>> {
        self.sender.subscribe()
    }
}

impl FaultReporter for FaultSink {
    fn report(&self, report: &FaultReport) {
        let kind = report.failure.kind().name();
        let status = report.status.as_u16();
        let correlation_id = report.context.correlation_id.as_deref().unwrap_or("-");

        if is_server_fault(report.status) {
            tracing::error!(
                status,
                kind,
                method = %report.context.method,
                url = %report.context.url,
                correlation_id,
                message = %report.failure,
                "Handler failed"
            );
        } else {
            tracing::warn!(
                status,
                kind,
                method = %report.context.method,
                url = %report.context.url,
                correlation_id,
                message = %report.failure,
                "Handler failure reported on request"
            );
        }

        counter!(
            "portico_faults_reported_total",
            "kind" => kind,
            "status" => status.to_string()
        )
        .increment(1);

        // No subscribers is not an error.
        let _ = self.sender.send(Arc::new(report.clone()));
    }
}
