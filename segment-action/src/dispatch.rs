use std::time::Instant;

use crate::sink::{AnalyticsSink, SinkError};
use crate::transform::{CallType, OutboundEvent};

/// Forwards events to a sink with the enqueue operation of the active call type, then
/// finishes with a single flush. `flush` consumes the dispatcher, so a batch is flushed
/// exactly once and nothing can be enqueued afterwards.
pub struct BatchDispatcher {
    call_type: CallType,
    sink: Box<dyn AnalyticsSink>,
    enqueued: usize,
}

impl BatchDispatcher {
    pub fn new(call_type: CallType, sink: Box<dyn AnalyticsSink>) -> Self {
        Self {
            call_type,
            sink,
            enqueued: 0,
        }
    }

    /// Hand one event to the sink without waiting for delivery.
    pub fn enqueue(&mut self, event: OutboundEvent) {
        self.sink.enqueue(self.call_type, event);
        self.enqueued += 1;
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    /// Flush the sink and report the outcome of the whole batch.
    /// Returns the number of events that were enqueued.
    pub async fn flush(mut self) -> Result<usize, SinkError> {
        let labels = [("call_type", self.call_type.as_str())];

        metrics::counter!("segment_action_events_enqueued_total", &labels)
            .increment(self.enqueued as u64);

        let start = Instant::now();
        let result = self.sink.flush().await;
        metrics::histogram!("segment_action_flush_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                tracing::debug!(events = self.enqueued, "batch delivered");
                Ok(self.enqueued)
            }
            Err(err) => {
                metrics::counter!("segment_action_flush_failures_total", &labels).increment(1);
                tracing::error!(events = self.enqueued, "failed to flush batch: {}", err);
                Err(err)
            }
        }
    }
}
