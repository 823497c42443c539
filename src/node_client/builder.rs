use std::{sync::Arc, time::Duration};

use alloy::{
    network::{Ethereum, Network},
    providers::RootProvider,
};

use crate::node_client::NodeClient;

/// Deadline applied to every remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default maximum number of retry attempts within one call deadline.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base delay between retries.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);
/// Error-text fragments meaning the node no longer knows the filter handle.
///
/// Node implementations word this differently; the set is extensible via
/// [`NodeClientBuilder::stale_filter_marker`] rather than hard-coded into
/// the engine's control flow.
pub const DEFAULT_STALE_FILTER_MARKERS: [&str; 2] = ["filter not found", "filter does not exist"];

/// Builder for constructing a [`NodeClient`].
///
/// Use this to configure the per-call deadline, retry/backoff, and the
/// stale-filter error classification.
pub struct NodeClientBuilder<N: Network = Ethereum> {
    provider: RootProvider<N>,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
    stale_filter_markers: Vec<String>,
}

impl<N: Network> NodeClientBuilder<N> {
    /// Create a builder with default settings.
    #[must_use]
    pub fn new(provider: RootProvider<N>) -> Self {
        Self {
            provider,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
            stale_filter_markers: DEFAULT_STALE_FILTER_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Create a builder with no retry attempts and only the deadline set.
    #[must_use]
    pub fn fragile(provider: RootProvider<N>) -> Self {
        Self::new(provider).max_retries(0).min_delay(Duration::ZERO)
    }

    /// Set the deadline for every remote call.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the maximum number of retry attempts.
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff retries.
    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Register an additional error-text fragment that marks a filter as
    /// unknown to the node.
    #[must_use]
    pub fn stale_filter_marker(mut self, marker: impl Into<String>) -> Self {
        self.stale_filter_markers.push(marker.into());
        self
    }

    /// Build the `NodeClient`.
    #[must_use]
    pub fn build(self) -> NodeClient<N> {
        debug!(
            call_timeout_ms = self.call_timeout.as_millis(),
            max_retries = self.max_retries,
            "Building NodeClient"
        );

        NodeClient {
            provider: self.provider,
            call_timeout: self.call_timeout,
            max_retries: self.max_retries,
            min_delay: self.min_delay,
            stale_filter_markers: Arc::new(self.stale_filter_markers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{providers::mock::Asserter, rpc::client::RpcClient};

    #[test]
    fn builder_defaults_match_constants() {
        let provider = RootProvider::<Ethereum>::new(RpcClient::mocked(Asserter::new()));
        let client = NodeClientBuilder::new(provider).build();

        assert_eq!(client.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(client.stale_filter_markers.len(), DEFAULT_STALE_FILTER_MARKERS.len());
    }

    #[test]
    fn fragile_disables_retries() {
        let provider = RootProvider::<Ethereum>::new(RpcClient::mocked(Asserter::new()));
        let client = NodeClientBuilder::fragile(provider).build();

        assert_eq!(client.max_retries, 0);
        assert_eq!(client.min_delay, Duration::ZERO);
    }

    #[test]
    fn custom_markers_are_appended() {
        let provider = RootProvider::<Ethereum>::new(RpcClient::mocked(Asserter::new()));
        let client =
            NodeClientBuilder::new(provider).stale_filter_marker("no such filter").build();

        assert!(client.stale_filter_markers.iter().any(|m| m == "no such filter"));
    }
}
