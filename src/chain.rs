//! Chain read capability: nonce and transaction lookups
//!
//! The tracking layer only ever reads two things from a node: an account's
//! transaction count at a block tag, and a broadcast transaction by hash.
//! [`HttpChainReader`] serves both over HTTP with multi-RPC failover.

use crate::error::{TrackerError, TrackerResult};
use crate::types::BlockTag;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, BlockId, Transaction, H256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Read-only view of chain state consumed by the tracker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Transaction count for an address at the given block tag.
    async fn transaction_count(&self, address: Address, tag: BlockTag) -> TrackerResult<u64>;

    /// Look up a broadcast transaction by hash.
    ///
    /// Returns `Ok(None)` when the queried node does not know the hash yet,
    /// e.g. the transaction has not propagated to it.
    async fn transaction_by_hash(&self, hash: H256) -> TrackerResult<Option<Transaction>>;
}

/// HTTP chain reader with round-robin failover across RPC endpoints.
#[derive(Debug)]
pub struct HttpChainReader {
    providers: Vec<Provider<Http>>,
    /// Index of the active provider
    current: AtomicUsize,
}

impl HttpChainReader {
    /// Create a reader over one or more RPC URLs. Invalid URLs are skipped
    /// with a warning; at least one must survive.
    pub fn new(rpc_urls: &[String]) -> TrackerResult<Self> {
        let mut providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    providers.push(provider.interval(Duration::from_millis(100)));
                    debug!("Added RPC endpoint {}", url);
                }
                Err(e) => {
                    warn!("Skipping invalid RPC URL {}: {}", url, e);
                }
            }
        }

        if providers.is_empty() {
            return Err(TrackerError::Config("no valid RPC endpoints".to_string()));
        }

        Ok(Self {
            providers,
            current: AtomicUsize::new(0),
        })
    }

    /// Get the active provider
    fn active(&self) -> &Provider<Http> {
        let idx = self.current.load(Ordering::Relaxed);
        &self.providers[idx % self.providers.len()]
    }

    /// Switch to the next endpoint
    fn failover(&self) {
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("Failing over to RPC endpoint {}", next);
    }
}

#[async_trait]
impl ChainReader for HttpChainReader {
    async fn transaction_count(&self, address: Address, tag: BlockTag) -> TrackerResult<u64> {
        let block: BlockId = tag.into();

        for _ in 0..self.providers.len() {
            match self
                .active()
                .get_transaction_count(address, Some(block))
                .await
            {
                Ok(count) => return Ok(count.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get transaction count for {:?} at {:?}: {}",
                        address, tag, e
                    );
                    self.failover();
                }
            }
        }

        Err(TrackerError::Rpc(
            "all RPC endpoints failed to serve transaction count".to_string(),
        ))
    }

    async fn transaction_by_hash(&self, hash: H256) -> TrackerResult<Option<Transaction>> {
        self.active()
            .get_transaction(hash)
            .await
            .map_err(|e| TrackerError::Rpc(e.to_string()))
    }
}
