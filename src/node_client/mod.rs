//! Deadline-bounded JSON-RPC access to the Ethereum node.
//!
//! [`NodeClient`] wraps an Alloy [`RootProvider`](alloy::providers::RootProvider)
//! and exposes exactly the calls the engine needs: filter lifecycle
//! (`eth_newFilter`, `eth_getFilterLogs`, `eth_getFilterChanges`,
//! `eth_uninstallFilter`) and block queries (`eth_blockNumber`,
//! `eth_getBlockByNumber`). Every call runs under its own cancellable
//! deadline, with exponential-backoff retries inside that deadline.

mod builder;
mod client;

pub use builder::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, DEFAULT_STALE_FILTER_MARKERS,
    NodeClientBuilder,
};
pub use client::NodeClient;
