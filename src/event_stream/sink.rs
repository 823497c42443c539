use std::sync::Arc;

use alloy::{json_abi::Event, rpc::types::Log};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::StreamError;

/// A decoded, enriched log entry as delivered to a stream sink.
///
/// `log.block_timestamp` is filled in when the owning stream requests
/// timestamps (zero when the lookup failed).
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub subscription_id: String,
    pub subscription_name: String,
    /// Canonical event signature, e.g. `Transfer(address,address,uint256)`.
    pub signature: String,
    /// Structured payload produced by the stream's [`LogDecoder`].
    pub payload: Value,
    pub log: Log,
}

/// Destination for ordered event delivery.
///
/// `deliver` may block (a slow sink stalls the subscription's poll cycle,
/// which is the intended backpressure) or fail, in which case the entry is
/// logged and skipped while the batch continues.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: StreamEvent) -> Result<(), StreamError>;
}

#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn deliver(&self, event: StreamEvent) -> Result<(), StreamError> {
        (**self).deliver(event).await
    }
}

/// Seam for the external ABI decoder: consumes the subscription's event
/// descriptor and a raw log entry, produces a structured payload. The
/// engine itself never parses ABI data.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, event: &Event, entry: &Log) -> Result<Value, StreamError>;
}

/// Passthrough decoder: packages the raw topics and data without
/// interpreting the ABI.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawLogDecoder;

impl LogDecoder for RawLogDecoder {
    fn decode(&self, _event: &Event, entry: &Log) -> Result<Value, StreamError> {
        Ok(serde_json::json!({
            "address": entry.inner.address,
            "topics": entry.inner.data.topics(),
            "data": entry.inner.data.data,
        }))
    }
}

/// In-process sink delivering into a bounded channel, for embedding the
/// engine behind a consumer task.
#[derive(Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    /// Create a sink and the stream its events can be read from.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, ReceiverStream<StreamEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, ReceiverStream::new(receiver))
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: StreamEvent) -> Result<(), StreamError> {
        debug!(subscription = %event.subscription_id, "Sending event downstream");
        self.sender
            .send(event)
            .await
            .map_err(|_| StreamError::Delivery("downstream channel closed".into()))
    }
}
