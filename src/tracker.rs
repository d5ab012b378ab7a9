//! Tracked transaction submission
//!
//! [`TrackedSubmitter`] wraps a signing/broadcast client with nonce
//! resolution, metadata pass-through, and post-broadcast nonce
//! verification. Six operations are exposed: contract call, plain
//! transfer, and pre-signed relay, each returning either the transaction
//! hash as soon as the network accepts the broadcast or the receipt once
//! the transaction is mined. All of them funnel through one internal
//! execute-and-verify routine, so the step sequence is written once.
//!
//! The wrapper never alters the underlying client's result: broadcast
//! failures propagate verbatim, and verification problems after a
//! successful broadcast are warnings, not errors.

use crate::broadcast::{Broadcaster, WalletBroadcaster};
use crate::chain::{ChainReader, HttpChainReader};
use crate::config::Settings;
use crate::error::{TrackerError, TrackerResult};
use crate::types::{
    BlockTag, CallRequest, NonceOption, SubmissionRequest, SubmitOptions, TrackedTransaction,
    TransactionMetadata, TransferRequest,
};

use chrono::Utc;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256};
use ethers::utils::rlp::Rlp;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Chain id recorded when the broadcaster does not report one.
const DEFAULT_CHAIN_ID: u64 = 1;

/// Downstream consumer of completed tracking records.
///
/// Invoked exactly once per successful submission, after nonce
/// verification completes. Never invoked when the broadcast fails.
pub trait TrackingSink: Send + Sync {
    fn transaction_tracked(&self, record: &TrackedTransaction);
}

/// Submission wrapper that produces a [`TrackedTransaction`] per broadcast.
///
/// Holds no state across calls: concurrent submissions for the same
/// account resolve their nonces independently and may race, which is an
/// accepted property of this layer, not something it arbitrates.
pub struct TrackedSubmitter {
    chain: Arc<dyn ChainReader>,
    broadcaster: Arc<dyn Broadcaster>,
    sink: Option<Arc<dyn TrackingSink>>,
}

impl TrackedSubmitter {
    /// Create a submitter over the two injected collaborators.
    pub fn new(chain: Arc<dyn ChainReader>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            chain,
            broadcaster,
            sink: None,
        }
    }

    /// Register the sink that receives each completed tracking record.
    pub fn with_sink(mut self, sink: Arc<dyn TrackingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Wire up an [`HttpChainReader`] and [`WalletBroadcaster`] from settings.
    pub fn from_settings(settings: &Settings) -> TrackerResult<Self> {
        let reader = HttpChainReader::new(&settings.rpc.rpc_urls)?;

        let provider = Provider::<Http>::try_from(settings.rpc.rpc_urls[0].as_str())
            .map_err(|e| TrackerError::Config(format!("invalid RPC URL: {}", e)))?;
        let broadcaster = WalletBroadcaster::from_env(
            provider,
            settings.wallet.key_env(),
            settings.rpc.chain_id,
        )?;

        Ok(Self::new(Arc::new(reader), Arc::new(broadcaster)))
    }

    /// Submit a contract call, returning the hash once broadcast.
    pub async fn write_contract(
        &self,
        call: CallRequest,
        opts: SubmitOptions,
    ) -> TrackerResult<H256> {
        let snapshot = SubmissionRequest::ContractCall(call.clone());
        self.execute(
            opts,
            snapshot,
            |from, nonce| self.broadcaster.write_contract(call, from, nonce),
            |hash: &H256| *hash,
        )
        .await
    }

    /// Submit a contract call and wait for it to be mined.
    pub async fn write_contract_sync(
        &self,
        call: CallRequest,
        opts: SubmitOptions,
    ) -> TrackerResult<TransactionReceipt> {
        let snapshot = SubmissionRequest::ContractCall(call.clone());
        self.execute(
            opts,
            snapshot,
            |from, nonce| self.broadcaster.write_contract_sync(call, from, nonce),
            |receipt: &TransactionReceipt| receipt.transaction_hash,
        )
        .await
    }

    /// Submit a plain value/data transfer, returning the hash once broadcast.
    pub async fn send_transaction(
        &self,
        transfer: TransferRequest,
        opts: SubmitOptions,
    ) -> TrackerResult<H256> {
        let snapshot = SubmissionRequest::Transfer(transfer.clone());
        self.execute(
            opts,
            snapshot,
            |from, nonce| self.broadcaster.send_transfer(transfer, from, nonce),
            |hash: &H256| *hash,
        )
        .await
    }

    /// Submit a plain value/data transfer and wait for it to be mined.
    pub async fn send_transaction_sync(
        &self,
        transfer: TransferRequest,
        opts: SubmitOptions,
    ) -> TrackerResult<TransactionReceipt> {
        let snapshot = SubmissionRequest::Transfer(transfer.clone());
        self.execute(
            opts,
            snapshot,
            |from, nonce| self.broadcaster.send_transfer_sync(transfer, from, nonce),
            |receipt: &TransactionReceipt| receipt.transaction_hash,
        )
        .await
    }

    /// Relay a pre-signed transaction, returning the hash once broadcast.
    ///
    /// The nonce and sender are decoded from the payload itself; no nonce
    /// lookup or post-broadcast verification runs, since a signed payload's
    /// nonce cannot be overridden by the relaying wallet.
    pub async fn send_raw_transaction(
        &self,
        payload: Bytes,
        metadata: Option<TransactionMetadata>,
    ) -> TrackerResult<H256> {
        self.execute_raw(
            payload,
            metadata,
            |payload| self.broadcaster.send_raw(payload),
            |hash: &H256| *hash,
        )
        .await
    }

    /// Relay a pre-signed transaction and wait for it to be mined.
    pub async fn send_raw_transaction_sync(
        &self,
        payload: Bytes,
        metadata: Option<TransactionMetadata>,
    ) -> TrackerResult<TransactionReceipt> {
        self.execute_raw(
            payload,
            metadata,
            |payload| self.broadcaster.send_raw_sync(payload),
            |receipt: &TransactionReceipt| receipt.transaction_hash,
        )
        .await
    }

    /// Shared step sequence for the contract-call and transfer families.
    async fn execute<T, F, Fut>(
        &self,
        opts: SubmitOptions,
        request: SubmissionRequest,
        submit: F,
        hash_of: fn(&T) -> H256,
    ) -> TrackerResult<T>
    where
        F: FnOnce(Address, u64) -> Fut,
        Fut: Future<Output = TrackerResult<T>>,
    {
        let initiated_at = Utc::now();

        // Sender must be resolvable before any network I/O.
        let from = opts
            .account
            .or_else(|| self.broadcaster.default_account())
            .ok_or_else(|| TrackerError::Config("no account available".to_string()))?;

        let metadata = opts.metadata.unwrap_or_default();
        let tracking_id = tracking_id(&metadata);

        let intended_nonce = self.resolve_nonce(from, opts.nonce).await?;
        debug!(
            "Submitting tracked transaction {} from {:?} with nonce {}",
            tracking_id, from, intended_nonce
        );

        let out = submit(from, intended_nonce).await?;
        let hash = hash_of(&out);

        let nonce = self.verify_nonce(hash, intended_nonce).await;

        self.notify(TrackedTransaction {
            tracking_id,
            tx_hash: hash,
            from,
            nonce,
            chain_id: self.broadcaster.chain_id().unwrap_or(DEFAULT_CHAIN_ID),
            metadata,
            initiated_at,
            request,
        });

        Ok(out)
    }

    /// Step sequence for the pre-signed relay family.
    async fn execute_raw<T, F, Fut>(
        &self,
        payload: Bytes,
        metadata: Option<TransactionMetadata>,
        submit: F,
        hash_of: fn(&T) -> H256,
    ) -> TrackerResult<T>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = TrackerResult<T>>,
    {
        let initiated_at = Utc::now();

        let (from, nonce) = decode_signed_payload(&payload)?;

        let metadata = metadata.unwrap_or_default();
        let tracking_id = tracking_id(&metadata);
        debug!(
            "Relaying tracked transaction {} from {:?} with embedded nonce {}",
            tracking_id, from, nonce
        );

        let out = submit(payload.clone()).await?;
        let hash = hash_of(&out);

        self.notify(TrackedTransaction {
            tracking_id,
            tx_hash: hash,
            from,
            nonce,
            chain_id: self.broadcaster.chain_id().unwrap_or(DEFAULT_CHAIN_ID),
            metadata,
            initiated_at,
            request: SubmissionRequest::Raw { payload },
        });

        Ok(out)
    }

    /// Turn the caller's nonce parameter into a concrete value.
    async fn resolve_nonce(&self, from: Address, nonce: NonceOption) -> TrackerResult<u64> {
        match nonce {
            NonceOption::Explicit(value) => Ok(value),
            NonceOption::Tag(tag) => self.chain.transaction_count(from, tag).await,
            NonceOption::Unspecified => {
                self.chain.transaction_count(from, BlockTag::Pending).await
            }
        }
    }

    /// Read back the nonce the broadcast transaction actually carries.
    ///
    /// The transaction is already on the wire, so nothing here can fail the
    /// call: a mismatch means the wallet overrode the nonce, an unknown
    /// hash means the node has not seen it yet. Both fall back to warnings.
    async fn verify_nonce(&self, hash: H256, intended: u64) -> u64 {
        match self.chain.transaction_by_hash(hash).await {
            Ok(Some(tx)) => {
                let actual = tx.nonce.as_u64();
                if actual != intended {
                    warn!(
                        "Nonce override on tx {:?}: intended {}, broadcast with {}",
                        hash, intended, actual
                    );
                }
                actual
            }
            Ok(None) => {
                warn!(
                    "Broadcast tx {:?} not visible yet; recording intended nonce {}",
                    hash, intended
                );
                intended
            }
            Err(e) => {
                warn!("Post-broadcast lookup failed for {:?}: {}", hash, e);
                intended
            }
        }
    }

    /// Hand the completed record to the registered sink, if any.
    fn notify(&self, record: TrackedTransaction) {
        debug!(
            "Tracked submission {} -> {:?} (nonce {})",
            record.tracking_id, record.tx_hash, record.nonce
        );
        if let Some(sink) = &self.sink {
            sink.transaction_tracked(&record);
        }
    }
}

/// Tracking identifier: the caller's id verbatim, else a fresh UUID.
/// Computable before any I/O.
fn tracking_id(metadata: &TransactionMetadata) -> String {
    metadata
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Decode a signed, serialized transaction into its sender and nonce.
fn decode_signed_payload(payload: &Bytes) -> TrackerResult<(Address, u64)> {
    let rlp = Rlp::new(payload.as_ref());
    let (tx, signature) = TypedTransaction::decode_signed(&rlp)
        .map_err(|e| TrackerError::Decode(format!("undecodable signed payload: {}", e)))?;

    let nonce = tx
        .nonce()
        .ok_or_else(|| TrackerError::Decode("signed payload carries no nonce".to_string()))?
        .as_u64();

    let from = signature
        .recover(tx.sighash())
        .map_err(|e| TrackerError::Decode(format!("sender recovery failed: {}", e)))?;

    Ok((from, nonce))
}
