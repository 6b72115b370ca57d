//! A sink that records what it is asked to do, for tests that must not touch the network.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::sink::{AnalyticsSink, SinkError, SinkFactory};
use crate::transform::{CallType, OutboundEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Enqueue(CallType, OutboundEvent),
    Flush,
}

#[derive(Default)]
struct Recording {
    write_keys: Vec<String>,
    calls: Vec<SinkCall>,
}

/// Builds sinks that share one recording. When `flush_error` is set every flush fails
/// with a 503 carrying that body.
#[derive(Clone, Default)]
pub struct RecordingSinkFactory {
    recording: Arc<Mutex<Recording>>,
    flush_error: Option<String>,
}

impl RecordingSinkFactory {
    pub fn failing(body: &str) -> Self {
        Self {
            flush_error: Some(body.to_owned()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.recording.lock().expect("poisoned lock").calls.clone()
    }

    /// Events handed to the sinks, in enqueue order.
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Enqueue(_, event) => Some(event),
                SinkCall::Flush => None,
            })
            .collect()
    }

    pub fn write_keys(&self) -> Vec<String> {
        self.recording.lock().expect("poisoned lock").write_keys.clone()
    }
}

impl SinkFactory for RecordingSinkFactory {
    fn sink(&self, write_key: &str) -> Box<dyn AnalyticsSink> {
        self.recording
            .lock()
            .expect("poisoned lock")
            .write_keys
            .push(write_key.to_owned());

        Box::new(RecordingSink {
            recording: self.recording.clone(),
            flush_error: self.flush_error.clone(),
        })
    }
}

pub struct RecordingSink {
    recording: Arc<Mutex<Recording>>,
    flush_error: Option<String>,
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    fn enqueue(&mut self, call_type: CallType, event: OutboundEvent) {
        self.recording
            .lock()
            .expect("poisoned lock")
            .calls
            .push(SinkCall::Enqueue(call_type, event));
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.recording
            .lock()
            .expect("poisoned lock")
            .calls
            .push(SinkCall::Flush);

        match &self.flush_error {
            Some(body) => Err(SinkError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: body.clone(),
            }),
            None => Ok(()),
        }
    }
}
