//! event-streams turns declarative subscriptions (contract address + event
//! signature + starting block) into durable, resumable streams of log events,
//! maintained against an Ethereum-style JSON-RPC node whose server-side
//! filters are best-effort and can silently expire.
//!
//! The main entry point is [`StreamManager`]: register one or more
//! [`EventStream`] destinations, create subscriptions with
//! [`StreamManager::subscribe`] (or rehydrate persisted ones with
//! [`StreamManager::restore_all`]), then call [`StreamManager::start`] to
//! spawn one polling driver per stream.
//!
//! # Ordering
//!
//! Entries are delivered to a stream's sink in the exact order the node
//! returns them. Ordering is preserved *per subscription*; there is no global
//! ordering guarantee across subscriptions.
//!
//! # Staleness and resumability
//!
//! Node-side filters disappear on node restarts, pruning, or load-balancer
//! failover. When a poll reports an unknown filter, the subscription marks it
//! stale and the next cycle reinstalls a fresh filter starting at the block
//! high-water-mark (HWM): the highest block whose logs were fully processed.
//! The HWM is checkpointed through a [`CheckpointStore`], so a restarted
//! process resumes from where it left off. Around a crash or a reinstall the
//! same events may be delivered more than once; consumers should treat
//! duplicates as benign (for example by keying on transaction hash and log
//! index). Events are never silently skipped.
//!
//! # Backpressure
//!
//! There is no explicit backpressure. A slow sink stalls its subscription's
//! poll cycle and delays HWM advancement, which is the intended fail-safe:
//! nothing is checkpointed ahead of delivery.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use alloy::{json_abi::Event, providers::RootProvider};
//! use event_streams::{
//!     ChannelSink, EventStream, MemoryCheckpointStore, NodeClientBuilder, RawLogDecoder,
//!     StreamManager, StreamSpec, SubscriptionRequest,
//! };
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = RootProvider::new_http("http://localhost:8545".parse()?);
//!     let node = NodeClientBuilder::new(provider).build();
//!
//!     let store = Arc::new(MemoryCheckpointStore::new());
//!     let manager: Arc<StreamManager> = Arc::new(StreamManager::new(node, store));
//!
//!     let (sink, mut events) = ChannelSink::new(256);
//!     manager
//!         .add_stream(EventStream::new(
//!             StreamSpec::new("transfers").timestamps(true),
//!             Box::new(sink),
//!             Box::new(RawLogDecoder),
//!         ))
//!         .await?;
//!
//!     let event = Event { name: "Transfer".into(), inputs: vec![], anonymous: false };
//!     manager
//!         .subscribe(SubscriptionRequest {
//!             id: "sub-1".into(),
//!             name: None,
//!             address: None,
//!             event,
//!             stream: "transfers".into(),
//!             from_block: Some("latest".into()),
//!         })
//!         .await?;
//!
//!     let poller = manager.start().await;
//!
//!     while let Some(event) = events.next().await {
//!         println!("{}: {}", event.subscription_name, event.payload);
//!     }
//!
//!     poller.shutdown().await;
//!     Ok(())
//! }
//! ```

#[macro_use]
mod logging;

pub mod checkpoint;
pub mod node_client;

mod error;
mod event_stream;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, SubscriptionCheckpoint};
pub use error::StreamError;
pub use node_client::{NodeClient, NodeClientBuilder};

pub use event_stream::{
    BlockTimestampCache, ChannelSink, DEFAULT_POLL_INTERVAL, DEFAULT_TIMESTAMP_CACHE_CAPACITY,
    EventSink, EventStream, FROM_BLOCK_LATEST, FilterState, LogDecoder, PersistedFilter,
    RawLogDecoder, StreamEvent, StreamManager, StreamPollerHandle, StreamSpec, Subscription,
    SubscriptionInfo, SubscriptionRequest, SubscriptionStatus,
};
