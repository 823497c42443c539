use std::{sync::Arc, time::Duration};

use alloy::{
    network::{Ethereum, Network},
    primitives::U256,
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;

use crate::StreamError;

/// Provider wrapper with per-call deadlines, retries, and stale-filter
/// error classification.
///
/// All remote calls are bounded by `call_timeout`; a timeout surfaces as
/// [`StreamError::Timeout`] and is handled by the caller like any other
/// transient RPC failure. Errors whose text matches one of the configured
/// stale-filter markers are classified as [`StreamError::FilterUnknown`],
/// the single trigger for a subscription's stale transition.
#[derive(Clone, Debug)]
pub struct NodeClient<N: Network = Ethereum> {
    pub(crate) provider: RootProvider<N>,
    pub(crate) call_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) min_delay: Duration,
    pub(crate) stale_filter_markers: Arc<Vec<String>>,
}

impl<N: Network> NodeClient<N> {
    /// Get a reference to the underlying provider.
    #[must_use]
    pub fn provider(&self) -> &RootProvider<N> {
        &self.provider
    }

    /// Install a node-side log filter, returning its opaque handle.
    ///
    /// # Errors
    ///
    /// Any [`StreamError`] from the transport; state on the node is unchanged
    /// on failure, so the caller simply retries on its next cycle.
    pub async fn new_filter(&self, filter: &Filter) -> Result<U256, StreamError> {
        info!("eth_newFilter called");
        let filter = filter.clone();
        let result = self
            .call(move |provider| {
                let filter = filter.clone();
                async move { provider.client().request("eth_newFilter", (filter,)).await }
            })
            .await;
        if let Err(err) = &result {
            error!(error = %err, "eth_newFilter failed");
        }
        result
    }

    /// Fetch all matching logs for a filter (full poll, used on the first
    /// poll after an install).
    ///
    /// # Errors
    ///
    /// [`StreamError::FilterUnknown`] when the node no longer recognizes the
    /// handle; any other transport error otherwise.
    pub async fn filter_logs(&self, filter_id: U256) -> Result<Vec<Log>, StreamError> {
        info!("eth_getFilterLogs called");
        let result = self
            .call(move |provider| async move {
                provider.client().request("eth_getFilterLogs", (filter_id,)).await
            })
            .await;
        if let Err(err) = &result {
            error!(error = %err, "eth_getFilterLogs failed");
        }
        result
    }

    /// Fetch only the logs that arrived since the previous poll
    /// (incremental poll).
    ///
    /// # Errors
    ///
    /// [`StreamError::FilterUnknown`] when the node no longer recognizes the
    /// handle; any other transport error otherwise.
    pub async fn filter_changes(&self, filter_id: U256) -> Result<Vec<Log>, StreamError> {
        info!("eth_getFilterChanges called");
        let result = self
            .call(move |provider| async move {
                provider.client().request("eth_getFilterChanges", (filter_id,)).await
            })
            .await;
        if let Err(err) = &result {
            error!(error = %err, "eth_getFilterChanges failed");
        }
        result
    }

    /// Remove a node-side filter. Returns whether the node knew the handle.
    ///
    /// # Errors
    ///
    /// Any [`StreamError`] from the transport. Callers uninstalling a
    /// possibly-expired filter treat the error as informational.
    pub async fn uninstall_filter(&self, filter_id: U256) -> Result<bool, StreamError> {
        info!("eth_uninstallFilter called");
        let result = self
            .call(move |provider| async move {
                provider.client().request("eth_uninstallFilter", (filter_id,)).await
            })
            .await;
        if let Err(err) = &result {
            error!(error = %err, "eth_uninstallFilter failed");
        }
        result
    }

    /// Fetch the current head block number.
    ///
    /// # Errors
    ///
    /// Any [`StreamError`] from the transport.
    pub async fn block_number(&self) -> Result<u64, StreamError> {
        info!("eth_blockNumber called");
        let result =
            self.call(move |provider| async move { provider.get_block_number().await }).await;
        if let Err(err) = &result {
            error!(error = %err, "eth_blockNumber failed");
        }
        result
    }

    /// Fetch a block by number, used for timestamp enrichment.
    ///
    /// # Errors
    ///
    /// [`StreamError::BlockNotFound`] when the node has no such block; any
    /// transport error otherwise.
    pub async fn block_by_number(&self, number: u64) -> Result<N::BlockResponse, StreamError> {
        info!("eth_getBlockByNumber called");
        let result = self
            .call(move |provider| async move { provider.get_block_by_number(number.into()).await })
            .await;
        if let Err(err) = &result {
            error!(error = %err, "eth_getBlockByNumber failed");
        }
        result?.ok_or(StreamError::BlockNotFound(number))
    }

    /// Execute `operation` with exponential backoff under the call deadline,
    /// classifying the final error.
    pub(crate) async fn call<T, F, Fut>(&self, operation: F) -> Result<T, StreamError>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let retry_strategy = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay);

        let result = timeout(
            self.call_timeout,
            (|| operation(self.provider.clone()))
                .retry(retry_strategy)
                .notify(|err: &RpcError<TransportErrorKind>, dur: Duration| {
                    debug!(error = %err, delay = ?dur, "RPC error, retrying");
                })
                .sleep(tokio::time::sleep),
        )
        .await;

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.classify(err)),
            Err(_) => Err(StreamError::Timeout),
        }
    }

    /// The single place where node error text is mapped to the stale-filter
    /// transition. Alternate node implementations are supported by adding
    /// markers on the builder, not by touching control flow.
    fn classify(&self, err: RpcError<TransportErrorKind>) -> StreamError {
        let message = err.to_string();
        if self.stale_filter_markers.iter().any(|marker| message.contains(marker.as_str())) {
            return StreamError::FilterUnknown;
        }
        StreamError::Rpc(Arc::new(err))
    }
}
