use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::time::TimeSource;
use crate::transform::{CallType, OutboundEvent};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to reach the analytics collector: {0}")]
    Request(#[from] reqwest::Error),
    #[error("analytics collector responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Delivery client for outbound events.
///
/// `enqueue` only buffers and never waits on the network. `flush` delivers everything
/// buffered so far and reports a single outcome for the whole batch.
#[async_trait]
pub trait AnalyticsSink: Send {
    fn enqueue(&mut self, call_type: CallType, event: OutboundEvent);
    async fn flush(&mut self) -> Result<(), SinkError>;
}

/// Builds one sink per invocation, bound to the caller's write key.
pub trait SinkFactory: Send + Sync {
    fn sink(&self, write_key: &str) -> Box<dyn AnalyticsSink>;
}

pub struct PrintSink {
    enqueued: usize,
}

#[async_trait]
impl AnalyticsSink for PrintSink {
    fn enqueue(&mut self, call_type: CallType, event: OutboundEvent) {
        tracing::info!("{} event: {:?}", call_type, event);
        self.enqueued += 1;
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        tracing::info!("flushed {} events", self.enqueued);
        self.enqueued = 0;

        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct PrintSinkFactory {}

impl SinkFactory for PrintSinkFactory {
    fn sink(&self, _write_key: &str) -> Box<dyn AnalyticsSink> {
        Box::new(PrintSink { enqueued: 0 })
    }
}

/// A message as the batch endpoint expects it: the event plus its call type and id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchMessage {
    #[serde(rename = "type")]
    call_type: CallType,
    message_id: Uuid,
    #[serde(flatten)]
    event: OutboundEvent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    batch: &'a [BatchMessage],
    #[serde(with = "time::serde::rfc3339")]
    sent_at: OffsetDateTime,
}

/// Sends buffered messages to a Segment-compatible `/v1/batch` endpoint.
pub struct SegmentSink {
    client: reqwest::Client,
    batch_url: String,
    write_key: String,
    max_batch_size: usize,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    queue: Vec<BatchMessage>,
}

#[async_trait]
impl AnalyticsSink for SegmentSink {
    fn enqueue(&mut self, call_type: CallType, event: OutboundEvent) {
        self.queue.push(BatchMessage {
            call_type,
            message_id: Uuid::new_v4(),
            event,
        });
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        let queue = std::mem::take(&mut self.queue);

        for chunk in queue.chunks(self.max_batch_size) {
            let request = BatchRequest {
                batch: chunk,
                sent_at: self.timesource.now(),
            };

            let response = self
                .client
                .post(&self.batch_url)
                .basic_auth(&self.write_key, Some(""))
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SinkError::Status { status, body });
            }

            metrics::histogram!("segment_action_batch_size").record(chunk.len() as f64);
            metrics::counter!("segment_action_messages_sent_total").increment(chunk.len() as u64);
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct SegmentSinkFactory {
    client: reqwest::Client,
    batch_url: String,
    max_batch_size: usize,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl SegmentSinkFactory {
    pub fn new<T: TimeSource + Send + Sync + 'static>(
        endpoint: &str,
        max_batch_size: usize,
        request_timeout: Duration,
        timesource: T,
    ) -> Result<Self, SinkError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("segment-action/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        let batch_url = format!("{}/v1/batch", endpoint.trim_end_matches('/'));
        info!("delivering events to {}", batch_url);

        Ok(Self {
            client,
            batch_url,
            max_batch_size: max_batch_size.max(1),
            timesource: Arc::new(timesource),
        })
    }
}

impl SinkFactory for SegmentSinkFactory {
    fn sink(&self, write_key: &str) -> Box<dyn AnalyticsSink> {
        Box::new(SegmentSink {
            client: self.client.clone(),
            batch_url: self.batch_url.clone(),
            write_key: write_key.to_owned(),
            max_batch_size: self.max_batch_size,
            timesource: self.timesource.clone(),
            queue: Vec::new(),
        })
    }
}
