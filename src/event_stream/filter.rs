use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256, U256},
    rpc::types::Filter,
};
use serde::{Deserialize, Serialize};

/// The part of the filter that is recorded to storage.
///
/// The wire-level filter sent on installation is reconstructed from this
/// spec plus the current resume point; it is never persisted directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
    #[serde(default)]
    pub topics: Vec<Vec<B256>>,
}

impl PersistedFilter {
    /// Wire-level filter for `eth_newFilter`: the persisted spec plus the
    /// block window, always open-ended at "latest".
    pub(crate) fn wire_filter(&self, from_block: u64) -> Filter {
        let mut filter = Filter::new().from_block(from_block).to_block(BlockNumberOrTag::Latest);
        if !self.address.is_empty() {
            filter = filter.address(self.address.clone());
        }
        if let Some(topic0) = self.topics.first() {
            filter = filter.event_signature(topic0.clone());
        }
        filter
    }
}

/// Lifecycle of the remote filter handle owned by one subscription.
///
/// A single tagged value replaces the `filterStale`/`filteredOnce` flag
/// pair: which poll method to use and whether the handle is valid cannot
/// disagree, and a stale handle can never be polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// No valid remote filter; the next poll cycle must install one.
    Stale,
    /// Installed but not yet polled; the first poll fetches all matching
    /// logs for the filter.
    Fresh { id: U256, from_block: u64 },
    /// At least one poll succeeded; subsequent polls fetch only new logs.
    Incremental { id: U256, from_block: u64 },
}

impl FilterState {
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, FilterState::Stale)
    }

    /// The remote handle, when one is installed.
    #[must_use]
    pub fn filter_id(&self) -> Option<U256> {
        match self {
            FilterState::Stale => None,
            FilterState::Fresh { id, .. } | FilterState::Incremental { id, .. } => Some(*id),
        }
    }

    /// The from-block the current filter was installed with.
    #[must_use]
    pub fn from_block(&self) -> Option<u64> {
        match self {
            FilterState::Stale => None,
            FilterState::Fresh { from_block, .. } | FilterState::Incremental { from_block, .. } => {
                Some(*from_block)
            }
        }
    }

    /// Transition after a successful poll: a fresh filter becomes
    /// incremental, everything else is unchanged.
    #[must_use]
    pub(crate) fn after_poll(self) -> Self {
        match self {
            FilterState::Fresh { id, from_block } => FilterState::Incremental { id, from_block },
            other => other,
        }
    }
}
