use std::sync::Arc;

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;

/// Errors surfaced by the event stream engine.
///
/// Construction-time failures (unknown stream, unnamed event, unparseable
/// starting block) are fatal to the operation that raised them; the
/// subscription is never created. Everything raised from a poll cycle is
/// logged by the stream poller and retried on the next cycle, so no error
/// variant ever stops the polling driver itself.
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// The underlying RPC transport returned an error.
    #[error("RPC error: {0}")]
    Rpc(Arc<RpcError<TransportErrorKind>>),

    /// A remote call exceeded its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// The node no longer recognizes the installed filter handle.
    ///
    /// Not a hard failure: the subscription marks its filter stale and the
    /// next poll cycle reinstalls from the block high-water-mark.
    #[error("Filter is no longer known to the node")]
    FilterUnknown,

    /// A block header could not be retrieved.
    #[error("Block {0} not found")]
    BlockNotFound(u64),

    /// The subscription references a stream that has not been registered.
    #[error("Unknown event stream: {0}")]
    UnknownStream(String),

    /// No subscription is registered under the given identifier.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// A subscription with this identifier already exists.
    #[error("Subscription already exists: {0}")]
    DuplicateSubscription(String),

    /// A stream with this identifier already exists.
    #[error("Event stream already exists: {0}")]
    DuplicateStream(String),

    /// The subscription record carries no identifier.
    #[error("Subscription has no identifier")]
    MissingSubscriptionId,

    /// The ABI event descriptor is missing or unnamed.
    #[error("Subscription does not define a named event")]
    MissingEvent,

    /// The starting-block directive is neither "latest" nor a decimal number.
    #[error("Unparseable starting block: {0}")]
    BadFromBlock(String),

    /// The checkpoint store rejected an operation.
    #[error("Checkpoint store failure: {0}")]
    Checkpoint(String),

    /// The external decoder rejected a log entry.
    #[error("Failed to decode log entry: {0}")]
    Decode(String),

    /// The stream sink rejected a delivered event.
    #[error("Failed to deliver event: {0}")]
    Delivery(String),
}

impl From<RpcError<TransportErrorKind>> for StreamError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        StreamError::Rpc(Arc::new(error))
    }
}
