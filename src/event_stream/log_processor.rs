use std::sync::Arc;

use alloy::{json_abi::Event, rpc::types::Log};

use crate::{
    StreamError,
    checkpoint::{self, CheckpointStore, SubscriptionCheckpoint},
    event_stream::{sink::StreamEvent, stream::EventStream, subscription::SubscriptionInfo},
};

/// Per-subscription delivery pipeline: decodes and forwards entries in node
/// order, tracks the block high-water-mark, and persists it.
pub(crate) struct LogProcessor {
    subscription_id: String,
    subscription_name: String,
    signature: String,
    event: Event,
    pub(crate) stream: Arc<EventStream>,
    checkpoints: Arc<dyn CheckpointStore>,
    hwm: u64,
}

impl LogProcessor {
    pub(crate) fn new(
        info: &SubscriptionInfo,
        stream: Arc<EventStream>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            subscription_id: info.id.clone(),
            subscription_name: info.name.clone(),
            signature: info.event.signature(),
            event: info.event.clone(),
            stream,
            checkpoints,
            hwm: 0,
        }
    }

    /// Seed the high-water-mark from a starting block or a restored
    /// checkpoint.
    pub(crate) fn init_block_hwm(&mut self, height: u64) {
        self.hwm = height;
    }

    /// Advance the high-water-mark; never moves it backwards.
    pub(crate) fn mark_block_hwm(&mut self, height: u64) {
        if height > self.hwm {
            self.hwm = height;
        }
    }

    pub(crate) fn block_hwm(&self) -> u64 {
        self.hwm
    }

    /// Decode one entry and hand it to the stream sink.
    ///
    /// # Errors
    ///
    /// Decode and delivery failures; the caller logs them and continues with
    /// the next entry.
    pub(crate) async fn process_log_entry(
        &self,
        log_name: &str,
        entry: &Log,
        index: usize,
    ) -> Result<(), StreamError> {
        let payload = self.stream.decoder.decode(&self.event, entry)?;
        debug!(subscription = %log_name, index = index, "Dispatching event to stream sink");
        let event = StreamEvent {
            subscription_id: self.subscription_id.clone(),
            subscription_name: self.subscription_name.clone(),
            signature: self.signature.clone(),
            payload,
            log: entry.clone(),
        };
        self.stream.sink.deliver(event).await
    }

    /// Persist the current high-water-mark.
    pub(crate) fn checkpoint(&self) -> Result<(), StreamError> {
        let value = serde_json::to_vec(&SubscriptionCheckpoint { hwm: self.hwm })
            .map_err(|err| StreamError::Checkpoint(err.to_string()))?;
        self.checkpoints.put(&checkpoint::checkpoint_key(&self.subscription_id), &value)
    }

    pub(crate) fn delete_checkpoint(&self) -> Result<(), StreamError> {
        self.checkpoints.delete(&checkpoint::checkpoint_key(&self.subscription_id))
    }
}
