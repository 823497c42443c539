mod filter;
mod log_processor;
mod manager;
mod sink;
mod stream;
mod subscription;
mod timestamp_cache;

pub use filter::{FilterState, PersistedFilter};
pub use manager::{StreamManager, StreamPollerHandle};
pub use sink::{ChannelSink, EventSink, LogDecoder, RawLogDecoder, StreamEvent};
pub use stream::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMESTAMP_CACHE_CAPACITY, EventStream, StreamSpec};
pub use subscription::{
    FROM_BLOCK_LATEST, Subscription, SubscriptionInfo, SubscriptionRequest, SubscriptionStatus,
};
pub use timestamp_cache::BlockTimestampCache;
