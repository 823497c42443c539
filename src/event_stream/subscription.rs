use std::sync::Arc;

use alloy::{
    consensus::BlockHeader,
    json_abi::Event,
    network::{BlockResponse, Ethereum, Network},
    primitives::Address,
    rpc::types::Log,
};
use serde::{Deserialize, Serialize};

use crate::{
    StreamError,
    checkpoint::CheckpointStore,
    event_stream::{
        filter::{FilterState, PersistedFilter},
        log_processor::LogProcessor,
        stream::EventStream,
    },
    node_client::NodeClient,
};

/// Sentinel starting-block directive: begin at the node's current head.
pub const FROM_BLOCK_LATEST: &str = "latest";

/// The persisted record for one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Unique identifier, immutable once created.
    pub id: String,
    /// Human name; defaults to the generated summary when not supplied.
    #[serde(default)]
    pub name: String,
    /// System-generated `<address-or-*>:<event-signature>` label, recomputed
    /// on restore rather than persisted.
    #[serde(skip)]
    pub summary: String,
    /// Identifier of the owning stream.
    pub stream: String,
    pub filter: PersistedFilter,
    /// ABI descriptor of the single event type this subscription matches.
    pub event: Event,
    /// Absolute block number as a decimal string, or [`FROM_BLOCK_LATEST`].
    /// Absent means latest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_block: Option<String>,
}

/// Inputs for creating a new subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub id: String,
    pub name: Option<String>,
    /// Contract to match; `None` matches any address.
    pub address: Option<Address>,
    pub event: Event,
    pub stream: String,
    pub from_block: Option<String>,
}

/// Point-in-time view of a subscription's runtime state.
#[derive(Debug, Clone)]
pub struct SubscriptionStatus {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub stream: String,
    pub filter: FilterState,
    pub block_hwm: u64,
    pub deleting: bool,
    pub reset_requested: bool,
}

/// Runtime for one subscription: owns the remote filter handle and the log
/// processor.
///
/// All mutation happens through its own methods, invoked serially by the
/// stream poller; no two poll cycles for the same subscription ever overlap.
pub struct Subscription<N: Network = Ethereum> {
    info: SubscriptionInfo,
    node: NodeClient<N>,
    lp: LogProcessor,
    log_name: String,
    filter: FilterState,
    deleting: bool,
    reset_requested: bool,
}

impl<N: Network> Subscription<N> {
    /// Validate a request and build the runtime for a brand-new
    /// subscription.
    ///
    /// # Errors
    ///
    /// [`StreamError::MissingSubscriptionId`] or [`StreamError::MissingEvent`]
    /// when the request is malformed. Construction failures are fatal; the
    /// subscription is never created.
    pub fn create(
        stream: Arc<EventStream>,
        node: NodeClient<N>,
        checkpoints: Arc<dyn CheckpointStore>,
        request: SubscriptionRequest,
    ) -> Result<Self, StreamError> {
        if request.id.is_empty() {
            return Err(StreamError::MissingSubscriptionId);
        }
        if request.event.name.is_empty() {
            return Err(StreamError::MissingEvent);
        }

        let signature = request.event.signature();
        let address_label =
            request.address.map_or_else(|| "*".to_string(), |address| address.to_string());
        let summary = format!("{address_label}:{signature}");
        let name = match request.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                debug!(summary = %summary, "No name provided for subscription, using summary");
                summary.clone()
            }
        };

        let mut filter = PersistedFilter::default();
        if let Some(address) = request.address {
            filter.address = vec![address];
        }
        // Filtering is on the event type only, so topics hold exactly the
        // event's hash.
        filter.topics = vec![vec![request.event.selector()]];

        let info = SubscriptionInfo {
            id: request.id,
            name,
            summary,
            stream: stream.spec().id.clone(),
            filter,
            event: request.event,
            from_block: request.from_block,
        };
        info!(
            subscription = %info.id,
            name = %info.name,
            topic = %info.event.selector(),
            "Created subscription"
        );
        Ok(Self::build(stream, node, checkpoints, info))
    }

    /// Rebuild the runtime for a subscription rehydrated from storage.
    ///
    /// # Errors
    ///
    /// [`StreamError::MissingSubscriptionId`] or [`StreamError::MissingEvent`]
    /// when the stored record is unusable.
    pub fn restore(
        stream: Arc<EventStream>,
        node: NodeClient<N>,
        checkpoints: Arc<dyn CheckpointStore>,
        mut info: SubscriptionInfo,
    ) -> Result<Self, StreamError> {
        if info.id.is_empty() {
            return Err(StreamError::MissingSubscriptionId);
        }
        if info.event.name.is_empty() {
            return Err(StreamError::MissingEvent);
        }
        let address_label =
            info.filter.address.first().map_or_else(|| "*".to_string(), ToString::to_string);
        info.summary = format!("{address_label}:{}", info.event.signature());
        if info.name.is_empty() {
            info.name = info.summary.clone();
        }
        Ok(Self::build(stream, node, checkpoints, info))
    }

    fn build(
        stream: Arc<EventStream>,
        node: NodeClient<N>,
        checkpoints: Arc<dyn CheckpointStore>,
        info: SubscriptionInfo,
    ) -> Self {
        let log_name = format!("{}:{}", info.id, info.event.signature());
        let lp = LogProcessor::new(&info, stream, checkpoints);
        Self {
            info,
            node,
            lp,
            log_name,
            filter: FilterState::Stale,
            deleting: false,
            reset_requested: false,
        }
    }

    #[must_use]
    pub fn info(&self) -> &SubscriptionInfo {
        &self.info
    }

    #[must_use]
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus {
            id: self.info.id.clone(),
            name: self.info.name.clone(),
            summary: self.info.summary.clone(),
            stream: self.info.stream.clone(),
            filter: self.filter,
            block_hwm: self.lp.block_hwm(),
            deleting: self.deleting,
            reset_requested: self.reset_requested,
        }
    }

    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    #[must_use]
    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    #[must_use]
    pub fn block_hwm(&self) -> u64 {
        self.lp.block_hwm()
    }

    /// Replace the starting-block directive used by the next reset.
    pub fn set_from_block(&mut self, from_block: Option<String>) {
        self.info.from_block = from_block;
    }

    /// Seed the high-water-mark from the starting-block directive: an
    /// explicit decimal block number, or the node's current head for the
    /// [`FROM_BLOCK_LATEST`] sentinel.
    ///
    /// # Errors
    ///
    /// [`StreamError::BadFromBlock`] for an unparseable directive; any RPC
    /// error when the head has to be queried.
    pub async fn initial_block_height(&mut self) -> Result<u64, StreamError> {
        match self.info.from_block.as_deref() {
            Some(from_block) if from_block != FROM_BLOCK_LATEST => {
                let height = from_block
                    .parse::<u64>()
                    .map_err(|_| StreamError::BadFromBlock(from_block.to_string()))?;
                self.lp.init_block_hwm(height);
                Ok(height)
            }
            _ => {
                let height = self.node.block_number().await?;
                self.lp.init_block_hwm(height);
                info!(
                    subscription = %self.log_name,
                    block = height,
                    "Initial block height for event stream (latest block)"
                );
                Ok(height)
            }
        }
    }

    /// Seed the high-water-mark from a restored checkpoint.
    pub fn set_checkpoint_block_height(&mut self, height: u64) {
        self.lp.init_block_hwm(height);
        info!(
            subscription = %self.log_name,
            block = height,
            "Checkpoint restored block height for event stream"
        );
    }

    /// Install a node-side filter from `from_block`, open-ended at latest.
    ///
    /// On success the filter is fresh: the next poll uses the full-fetch
    /// method. On failure the state is left unchanged and the caller retries
    /// on its next cycle.
    ///
    /// # Errors
    ///
    /// Any [`StreamError`] from the installation call.
    pub async fn install_filter(&mut self, from_block: u64) -> Result<(), StreamError> {
        let filter = self.info.filter.wire_filter(from_block);
        let filter_id = self.node.new_filter(&filter).await?;
        self.filter = FilterState::Fresh { id: filter_id, from_block };
        info!(
            subscription = %self.log_name,
            from_block = from_block,
            filter_id = %filter_id,
            "Created filter"
        );
        Ok(())
    }

    /// One poll cycle: reinstall the filter from the high-water-mark when
    /// stale, then pull and dispatch whatever the node has for it.
    ///
    /// # Errors
    ///
    /// Poll-cycle errors are never fatal; the stream poller logs them and
    /// retries on the next cycle.
    pub async fn poll_once(&mut self) -> Result<(), StreamError> {
        if self.filter.is_stale() {
            let from_block = self.lp.block_hwm();
            self.install_filter(from_block).await?;
        }
        self.process_new_events().await
    }

    /// Pull pending logs through the installed filter and dispatch them.
    ///
    /// The poll method depends on the filter state: a fresh filter is polled
    /// with the full fetch, an incremental one with the changes-only fetch
    /// (half the payload at steady state, at the cost of requiring the
    /// filter to stay continuously installed, which is why staleness forces
    /// a reinstall from the checkpoint rather than a silent resume).
    pub(crate) async fn process_new_events(&mut self) -> Result<(), StreamError> {
        let (filter_id, first_poll) = match self.filter {
            FilterState::Stale => return Err(StreamError::FilterUnknown),
            FilterState::Fresh { id, .. } => (id, true),
            FilterState::Incremental { id, .. } => (id, false),
        };

        let result = if first_poll {
            self.node.filter_logs(filter_id).await
        } else {
            self.node.filter_changes(filter_id).await
        };
        let logs = match result {
            Ok(logs) => logs,
            Err(StreamError::FilterUnknown) => {
                self.mark_filter_stale(true).await;
                return Err(StreamError::FilterUnknown);
            }
            Err(err) => return Err(err),
        };

        if !logs.is_empty() {
            debug!(
                subscription = %self.log_name,
                count = logs.len(),
                first_poll = first_poll,
                "Received events"
            );
        }

        let previous_hwm = self.lp.block_hwm();
        // Entries are processed strictly in the order the node returned them.
        for (index, mut entry) in logs.into_iter().enumerate() {
            if self.lp.stream.spec().timestamps {
                self.enrich_timestamp(&mut entry).await;
            }
            if let Err(err) = self.lp.process_log_entry(&self.log_name, &entry, index).await {
                // One bad entry does not abort the batch; block progress is
                // what the resumability guarantee covers.
                error!(subscription = %self.log_name, error = %err, "Failed to process event");
            }
            if let Some(block_number) = entry.block_number {
                self.lp.mark_block_hwm(block_number);
            }
        }

        self.filter = self.filter.after_poll();
        if self.lp.block_hwm() != previous_hwm {
            self.lp.checkpoint()?;
        }
        Ok(())
    }

    /// Resolve the entry's block timestamp through the stream-wide cache,
    /// falling back to a header fetch under its own deadline. Failure
    /// degrades to a zero timestamp so delivery is never held up by
    /// enrichment, and nothing is cached on failure.
    async fn enrich_timestamp(&self, entry: &mut Log) {
        let Some(block_number) = entry.block_number else { return };
        let key = block_number.to_string();
        if let Some(timestamp) = self.lp.stream.timestamp_cache.get(&key) {
            entry.block_timestamp = Some(timestamp);
            return;
        }
        match self.node.block_by_number(block_number).await {
            Ok(block) => {
                let timestamp = block.header().timestamp();
                entry.block_timestamp = Some(timestamp);
                self.lp.stream.timestamp_cache.put(key, timestamp);
            }
            Err(err) => {
                error!(
                    subscription = %self.log_name,
                    block = %key,
                    error = %err,
                    "Unable to retrieve block timestamp"
                );
                entry.block_timestamp = Some(0);
            }
        }
    }

    /// Mark the remote filter stale, best-effort uninstalling it first.
    ///
    /// Idempotent: once stale there is no handle left to uninstall, so at
    /// most one uninstall call is ever issued per installed filter.
    pub async fn mark_filter_stale(&mut self, force_uninstall: bool) {
        debug!(
            subscription = %self.log_name,
            force_uninstall = force_uninstall,
            stale = self.filter.is_stale(),
            "Marking filter stale"
        );
        if force_uninstall {
            if let Some(filter_id) = self.filter.filter_id() {
                // The error is informational only; the filter may already be
                // gone after a node restart.
                match self.node.uninstall_filter(filter_id).await {
                    Ok(removed) => {
                        info!(subscription = %self.log_name, removed = removed, "Uninstalled filter");
                    }
                    Err(err) => {
                        info!(subscription = %self.log_name, error = %err, "Uninstalled filter");
                    }
                }
            }
        }
        self.filter = FilterState::Stale;
    }

    /// Tear down the remote filter. With `deleting` the subscription is on
    /// its way out; without it the caller intends to resubscribe.
    pub async fn unsubscribe(&mut self, deleting: bool) {
        info!(subscription = %self.log_name, deleting = deleting, "Unsubscribing existing filter");
        self.deleting = deleting;
        self.reset_requested = false;
        self.mark_filter_stale(true).await;
    }

    /// Ask the stream poller to restart this subscription from its current
    /// starting-block directive on the next cycle, discarding the old
    /// high-water-mark.
    pub fn request_reset(&mut self) {
        info!(
            subscription = %self.log_name,
            from_block = ?self.info.from_block,
            "Requested reset"
        );
        self.reset_requested = true;
    }

    /// Execute a requested reset: unsubscribe (non-deleting), drop the
    /// checkpoint, re-seed from the directive, and reinstall.
    ///
    /// # Errors
    ///
    /// Any failure leaves the reset pending so the next cycle retries it.
    pub async fn reset_cycle(&mut self) -> Result<(), StreamError> {
        info!(
            subscription = %self.log_name,
            from_block = ?self.info.from_block,
            "Resetting subscription"
        );
        self.unsubscribe(false).await;
        match self.reseed_from_directive().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reset_requested = true;
                Err(err)
            }
        }
    }

    async fn reseed_from_directive(&mut self) -> Result<(), StreamError> {
        self.lp.delete_checkpoint()?;
        let from_block = self.initial_block_height().await?;
        self.install_filter(from_block).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        checkpoint::MemoryCheckpointStore,
        event_stream::{
            sink::{ChannelSink, RawLogDecoder},
            stream::{EventStream, StreamSpec},
        },
        node_client::NodeClientBuilder,
    };
    use alloy::{
        json_abi::EventParam,
        providers::{RootProvider, mock::Asserter},
        rpc::client::RpcClient,
    };

    fn transfer_event() -> Event {
        Event {
            name: "Transferred".into(),
            inputs: vec![EventParam {
                ty: "uint256".into(),
                name: "value".into(),
                indexed: false,
                components: vec![],
                internal_type: None,
            }],
            anonymous: false,
        }
    }

    fn test_stream() -> Arc<EventStream> {
        let (sink, _receiver) = ChannelSink::new(8);
        Arc::new(EventStream::new(StreamSpec::new("main"), Box::new(sink), Box::new(RawLogDecoder)))
    }

    fn test_node() -> NodeClient {
        let provider = RootProvider::new(RpcClient::mocked(Asserter::new()));
        NodeClientBuilder::fragile(provider).build()
    }

    fn request(id: &str, address: Option<Address>) -> SubscriptionRequest {
        SubscriptionRequest {
            id: id.into(),
            name: None,
            address,
            event: transfer_event(),
            stream: "main".into(),
            from_block: Some("100".into()),
        }
    }

    #[test]
    fn create_defaults_name_to_summary() {
        let address = Address::repeat_byte(0x42);
        let sub = Subscription::create(
            test_stream(),
            test_node(),
            Arc::new(MemoryCheckpointStore::new()),
            request("sub1", Some(address)),
        )
        .unwrap();

        let expected = format!("{address}:Transferred(uint256)");
        assert_eq!(sub.info().summary, expected);
        assert_eq!(sub.info().name, expected);
    }

    #[test]
    fn create_without_address_uses_wildcard_summary() {
        let sub = Subscription::create(
            test_stream(),
            test_node(),
            Arc::new(MemoryCheckpointStore::new()),
            request("sub1", None),
        )
        .unwrap();

        assert_eq!(sub.info().summary, "*:Transferred(uint256)");
        assert!(sub.info().filter.address.is_empty());
    }

    #[test]
    fn create_pins_topics_to_the_event_hash() {
        let event = transfer_event();
        let sub = Subscription::create(
            test_stream(),
            test_node(),
            Arc::new(MemoryCheckpointStore::new()),
            request("sub1", None),
        )
        .unwrap();

        assert_eq!(sub.info().filter.topics, vec![vec![event.selector()]]);
        assert!(sub.status().filter.is_stale());
    }

    #[test]
    fn create_rejects_unnamed_event() {
        let mut req = request("sub1", None);
        req.event.name = String::new();

        let result = Subscription::create(
            test_stream(),
            test_node(),
            Arc::new(MemoryCheckpointStore::new()),
            req,
        );
        assert!(matches!(result, Err(StreamError::MissingEvent)));
    }

    #[test]
    fn restore_requires_an_id() {
        let info = SubscriptionInfo {
            id: String::new(),
            name: String::new(),
            summary: String::new(),
            stream: "main".into(),
            filter: PersistedFilter::default(),
            event: transfer_event(),
            from_block: None,
        };

        let result = Subscription::restore(
            test_stream(),
            test_node(),
            Arc::new(MemoryCheckpointStore::new()),
            info,
        );
        assert!(matches!(result, Err(StreamError::MissingSubscriptionId)));
    }

    #[tokio::test]
    async fn initial_height_rejects_garbage_directive() {
        let mut req = request("sub1", None);
        req.from_block = Some("not-a-number".into());
        let mut sub = Subscription::create(
            test_stream(),
            test_node(),
            Arc::new(MemoryCheckpointStore::new()),
            req,
        )
        .unwrap();

        let result = sub.initial_block_height().await;
        assert!(matches!(result, Err(StreamError::BadFromBlock(_))));
    }
}
