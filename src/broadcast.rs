//! Signing/broadcast capability
//!
//! [`Broadcaster`] is the seam the tracker submits through: one operation
//! per transaction family, each in fire-and-return-hash and
//! wait-for-confirmation form. [`WalletBroadcaster`] implements it with a
//! local wallet over an HTTP provider.

use crate::error::{TrackerError, TrackerResult};
use crate::types::{CallRequest, TransferRequest};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256};
use tracing::debug;

/// Transaction signing and broadcast operations consumed by the tracker.
///
/// The resolved nonce is injected by the caller for the contract-call and
/// transfer families; raw relays carry their nonce inside the payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sender used when a call supplies no explicit account.
    fn default_account(&self) -> Option<Address>;

    /// Chain this client is configured for, if known.
    fn chain_id(&self) -> Option<u64>;

    async fn write_contract(
        &self,
        call: CallRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<H256>;

    async fn write_contract_sync(
        &self,
        call: CallRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<TransactionReceipt>;

    async fn send_transfer(
        &self,
        transfer: TransferRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<H256>;

    async fn send_transfer_sync(
        &self,
        transfer: TransferRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<TransactionReceipt>;

    /// Relay an already-signed, serialized transaction as-is.
    async fn send_raw(&self, payload: Bytes) -> TrackerResult<H256>;

    async fn send_raw_sync(&self, payload: Bytes) -> TrackerResult<TransactionReceipt>;
}

/// Broadcaster backed by a local wallet and a single HTTP provider.
#[derive(Debug)]
pub struct WalletBroadcaster {
    provider: Provider<Http>,
    wallet: LocalWallet,
    chain_id: u64,
}

impl WalletBroadcaster {
    /// Create a broadcaster for one chain.
    pub fn new(provider: Provider<Http>, wallet: LocalWallet, chain_id: u64) -> Self {
        let wallet = wallet.with_chain_id(chain_id);
        Self {
            provider,
            wallet,
            chain_id,
        }
    }

    /// Load the signing key from an environment variable.
    pub fn from_env(provider: Provider<Http>, var: &str, chain_id: u64) -> TrackerResult<Self> {
        let key = std::env::var(var)
            .map_err(|_| TrackerError::Wallet(format!("{} is not set", var)))?;
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| TrackerError::Wallet(format!("invalid private key: {}", e)))?;

        Ok(Self::new(provider, wallet, chain_id))
    }

    /// Build an ABI-encoded contract call.
    fn build_call(
        &self,
        call: &CallRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<TypedTransaction> {
        let function = call.abi.function(&call.function).map_err(|e| {
            TrackerError::Config(format!("unknown function {}: {}", call.function, e))
        })?;
        let data = function
            .encode_input(&call.args)
            .map_err(|e| TrackerError::Config(format!("argument encoding failed: {}", e)))?;

        let mut req = TransactionRequest::new()
            .from(from)
            .to(call.to)
            .data(data)
            .nonce(nonce)
            .chain_id(self.chain_id);

        if let Some(value) = call.value {
            req = req.value(value);
        }
        if let Some(gas) = call.gas {
            req = req.gas(gas);
        }

        Ok(TypedTransaction::Legacy(req))
    }

    /// Build a plain value/data transfer.
    fn build_transfer(
        &self,
        transfer: &TransferRequest,
        from: Address,
        nonce: u64,
    ) -> TypedTransaction {
        let mut req = TransactionRequest::new()
            .from(from)
            .to(transfer.to)
            .value(transfer.value)
            .nonce(nonce)
            .chain_id(self.chain_id);

        if let Some(ref data) = transfer.data {
            req = req.data(data.clone());
        }
        if let Some(gas) = transfer.gas {
            req = req.gas(gas);
        }

        TypedTransaction::Legacy(req)
    }

    /// Fill gas limit and gas price when the caller left them unset.
    async fn fill_gas(&self, mut tx: TypedTransaction) -> TrackerResult<TypedTransaction> {
        if tx.gas().is_none() {
            let gas = self
                .provider
                .estimate_gas(&tx, None)
                .await
                .map_err(|e| TrackerError::Broadcast(format!("gas estimation failed: {}", e)))?;
            tx.set_gas(gas);
        }

        if tx.gas_price().is_none() {
            let price = self
                .provider
                .get_gas_price()
                .await
                .map_err(|e| TrackerError::Broadcast(format!("gas price fetch failed: {}", e)))?;
            tx.set_gas_price(price);
        }

        Ok(tx)
    }

    /// Sign and broadcast a built transaction.
    async fn sign_and_send(
        &self,
        tx: TypedTransaction,
    ) -> TrackerResult<PendingTransaction<'_, Http>> {
        let tx = self.fill_gas(tx).await?;

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| TrackerError::Wallet(format!("signing failed: {}", e)))?;
        let raw = tx.rlp_signed(&signature);

        self.provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| TrackerError::Broadcast(e.to_string()))
    }

    /// Wait for a pending transaction to be mined.
    async fn wait_mined(
        &self,
        pending: PendingTransaction<'_, Http>,
    ) -> TrackerResult<TransactionReceipt> {
        pending
            .await
            .map_err(|e| TrackerError::Broadcast(e.to_string()))?
            .ok_or_else(|| {
                TrackerError::Broadcast("transaction dropped from the mempool".to_string())
            })
    }
}

#[async_trait]
impl Broadcaster for WalletBroadcaster {
    fn default_account(&self) -> Option<Address> {
        Some(self.wallet.address())
    }

    fn chain_id(&self) -> Option<u64> {
        Some(self.chain_id)
    }

    async fn write_contract(
        &self,
        call: CallRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<H256> {
        let tx = self.build_call(&call, from, nonce)?;
        let pending = self.sign_and_send(tx).await?;
        let hash = pending.tx_hash();
        debug!("Submitted contract call {:?} with nonce {}", hash, nonce);
        Ok(hash)
    }

    async fn write_contract_sync(
        &self,
        call: CallRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<TransactionReceipt> {
        let tx = self.build_call(&call, from, nonce)?;
        let pending = self.sign_and_send(tx).await?;
        self.wait_mined(pending).await
    }

    async fn send_transfer(
        &self,
        transfer: TransferRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<H256> {
        let tx = self.build_transfer(&transfer, from, nonce);
        let pending = self.sign_and_send(tx).await?;
        let hash = pending.tx_hash();
        debug!("Submitted transfer {:?} with nonce {}", hash, nonce);
        Ok(hash)
    }

    async fn send_transfer_sync(
        &self,
        transfer: TransferRequest,
        from: Address,
        nonce: u64,
    ) -> TrackerResult<TransactionReceipt> {
        let tx = self.build_transfer(&transfer, from, nonce);
        let pending = self.sign_and_send(tx).await?;
        self.wait_mined(pending).await
    }

    async fn send_raw(&self, payload: Bytes) -> TrackerResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(payload)
            .await
            .map_err(|e| TrackerError::Broadcast(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn send_raw_sync(&self, payload: Bytes) -> TrackerResult<TransactionReceipt> {
        let pending = self
            .provider
            .send_raw_transaction(payload)
            .await
            .map_err(|e| TrackerError::Broadcast(e.to_string()))?;
        self.wait_mined(pending).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{Abi, Token};
    use ethers::types::U256;

    fn test_broadcaster() -> WalletBroadcaster {
        let provider = Provider::<Http>::try_from("http://localhost:8545").unwrap();
        let wallet: LocalWallet =
            "0x0000000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap();
        WalletBroadcaster::new(provider, wallet, 1)
    }

    fn store_abi() -> Abi {
        serde_json::from_str(
            r#"[{
                "name": "store",
                "type": "function",
                "stateMutability": "nonpayable",
                "inputs": [{"name": "x", "type": "uint256"}],
                "outputs": []
            }]"#,
        )
        .unwrap()
    }

    #[test]
    fn build_call_encodes_selector_and_nonce() {
        let broadcaster = test_broadcaster();
        let call = CallRequest {
            to: Address::repeat_byte(0x22),
            abi: store_abi(),
            function: "store".to_string(),
            args: vec![Token::Uint(U256::from(5))],
            value: None,
            gas: None,
        };

        let tx = broadcaster
            .build_call(&call, Address::repeat_byte(0x11), 7)
            .unwrap();

        let data = tx.data().unwrap();
        assert_eq!(&data[..4], &ethers::utils::id("store(uint256)")[..]);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(tx.nonce(), Some(&U256::from(7)));
    }

    #[test]
    fn build_call_rejects_unknown_function() {
        let broadcaster = test_broadcaster();
        let call = CallRequest {
            to: Address::repeat_byte(0x22),
            abi: store_abi(),
            function: "missing".to_string(),
            args: vec![],
            value: None,
            gas: None,
        };

        let err = broadcaster
            .build_call(&call, Address::repeat_byte(0x11), 0)
            .unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn build_transfer_carries_value_and_data() {
        let broadcaster = test_broadcaster();
        let transfer = TransferRequest {
            to: Address::repeat_byte(0x33),
            value: U256::from(1_000u64),
            data: Some(Bytes::from(vec![0xde, 0xad])),
            gas: Some(U256::from(21_000u64)),
        };

        let tx = broadcaster.build_transfer(&transfer, Address::repeat_byte(0x11), 3);
        assert_eq!(tx.value(), Some(&U256::from(1_000u64)));
        assert_eq!(tx.data().map(|d| d.to_vec()), Some(vec![0xde, 0xad]));
        assert_eq!(tx.gas(), Some(&U256::from(21_000u64)));
    }

    #[test]
    fn from_env_requires_the_variable() {
        let provider = Provider::<Http>::try_from("http://localhost:8545").unwrap();
        let err =
            WalletBroadcaster::from_env(provider, "TXTRACK_TEST_UNSET_KEY", 1).unwrap_err();
        assert!(matches!(err, TrackerError::Wallet(_)));
    }
}
