use std::time::Duration;

use crate::event_stream::{
    sink::{EventSink, LogDecoder},
    timestamp_cache::BlockTimestampCache,
};

/// Default polling interval for a stream's poll driver.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default capacity of the per-stream block timestamp cache.
pub const DEFAULT_TIMESTAMP_CACHE_CAPACITY: usize = 1000;

/// Configuration for one event stream.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub id: String,
    pub name: String,
    /// Enrich delivered entries with block timestamps.
    pub timestamps: bool,
    pub poll_interval: Duration,
    pub timestamp_cache_capacity: usize,
}

impl StreamSpec {
    /// Create a spec with default settings; the name defaults to the id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            timestamps: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timestamp_cache_capacity: DEFAULT_TIMESTAMP_CACHE_CAPACITY,
        }
    }

    /// Set a human-readable name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable block timestamp enrichment.
    #[must_use]
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Set the interval between poll cycles.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the capacity of the shared block timestamp cache.
    #[must_use]
    pub fn timestamp_cache_capacity(mut self, capacity: usize) -> Self {
        self.timestamp_cache_capacity = capacity;
        self
    }
}

/// A named delivery destination shared by one or more subscriptions.
///
/// Owns the sink, the decoder, and the stream-global timestamp cache.
/// Block timestamps are a property of the chain, not of any one
/// subscription, so the cache is shared across all subscriptions of the
/// stream and nothing is shared between different streams.
pub struct EventStream {
    pub(crate) spec: StreamSpec,
    pub(crate) sink: Box<dyn EventSink>,
    pub(crate) decoder: Box<dyn LogDecoder>,
    pub(crate) timestamp_cache: BlockTimestampCache,
}

impl EventStream {
    #[must_use]
    pub fn new(spec: StreamSpec, sink: Box<dyn EventSink>, decoder: Box<dyn LogDecoder>) -> Self {
        let timestamp_cache = BlockTimestampCache::new(spec.timestamp_cache_capacity);
        Self { spec, sink, decoder, timestamp_cache }
    }

    #[must_use]
    pub fn spec(&self) -> &StreamSpec {
        &self.spec
    }
}
