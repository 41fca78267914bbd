//! Fan-out of a deduplicated alert to every configured sink

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;

use super::candidate::AlertCandidate;
use super::notifier::{NotificationSink, NotifierError, SinkProvider};
use crate::scheduler::runtime::panic_message;

/// Hard cap on a single sink delivery, on top of the sink's own timeouts
const DEFAULT_SINK_DEADLINE: Duration = Duration::from_secs(30);

/// Outcome of one dispatch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    /// (sink name, error message)
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Dispatcher {
    provider: Box<dyn SinkProvider>,
    sink_deadline: Duration,
}

impl Dispatcher {
    pub fn new(provider: impl SinkProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            sink_deadline: DEFAULT_SINK_DEADLINE,
        }
    }

    pub fn with_sink_deadline(mut self, deadline: Duration) -> Self {
        self.sink_deadline = deadline;
        self
    }

    /// Log the alert and deliver it to every sink. Sink failures, including
    /// panics, are logged and reported, never returned.
    pub async fn dispatch(&self, alert: &AlertCandidate) -> DispatchReport {
        tracing::warn!(
            station = %alert.station_id,
            kind = %alert.kind,
            key = %alert.dedup_key,
            "ALERT ({}): {} :: {}",
            alert.severity.as_str().to_uppercase(),
            alert.title,
            alert.body
        );

        let sinks = self.provider.sinks();
        let outcomes = join_all(sinks.iter().map(|sink| self.deliver(sink, alert))).await;

        let mut report = DispatchReport::default();
        for (sink, outcome) in sinks.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.delivered.push(sink.name().to_string()),
                Err(e) => {
                    tracing::error!(
                        sink = sink.name(),
                        key = %alert.dedup_key,
                        error = %e,
                        "Failed to send notification"
                    );
                    report.failed.push((sink.name().to_string(), e.to_string()));
                }
            }
        }
        report
    }

    async fn deliver(
        &self,
        sink: &Arc<dyn NotificationSink>,
        alert: &AlertCandidate,
    ) -> Result<(), NotifierError> {
        let send = AssertUnwindSafe(sink.send(alert)).catch_unwind();
        match tokio::time::timeout(self.sink_deadline, send).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(NotifierError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(NotifierError::Timeout(self.sink_deadline)),
        }
    }
}
