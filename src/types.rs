//! Data model for tracked submissions
//!
//! Defines the caller-facing metadata bag, the nonce parameter, and the
//! tracking record produced after a successful broadcast.

use chrono::{DateTime, Utc};
use ethers::abi::{Abi, Token};
use ethers::types::{Address, BlockId, BlockNumber, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Caller-supplied tracking metadata attached to a submission.
///
/// Every field is optional and, apart from `id`, opaque to the submission
/// layer. `id`, when present, is used verbatim as the tracking identifier.
/// Unknown keys are preserved in `extra` for downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Hint for an external success detector: the event whose emission,
    /// rather than the transaction hash, signals that the submission had
    /// its intended effect. Not validated here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_event: Option<ExpectedEvent>,

    /// Any additional caller-defined fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Event hint carried inside [`TransactionMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedEvent {
    pub contract_address: Address,
    pub event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

/// Named chain-state reference used when resolving a nonce from the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    Latest,
    #[default]
    Pending,
    Earliest,
    Safe,
    Finalized,
}

impl From<BlockTag> for BlockId {
    fn from(tag: BlockTag) -> Self {
        let number = match tag {
            BlockTag::Latest => BlockNumber::Latest,
            BlockTag::Pending => BlockNumber::Pending,
            BlockTag::Earliest => BlockNumber::Earliest,
            BlockTag::Safe => BlockNumber::Safe,
            BlockTag::Finalized => BlockNumber::Finalized,
        };
        BlockId::Number(number)
    }
}

/// Per-call nonce parameter.
///
/// `Unspecified` resolves exactly like `Tag(BlockTag::Pending)`; an
/// explicit value is passed through without any chain lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NonceOption {
    Explicit(u64),
    Tag(BlockTag),
    #[default]
    Unspecified,
}

/// A named contract-function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Contract address.
    pub to: Address,
    /// Contract ABI used to encode the call.
    pub abi: Abi,
    /// Function name within the ABI.
    pub function: String,
    /// Encoded-as-tokens argument list.
    pub args: Vec<Token>,
    /// Native value to attach, if any.
    pub value: Option<U256>,
    /// Gas limit override; estimated when absent.
    pub gas: Option<U256>,
}

/// A plain value/data transfer without ABI encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub to: Address,
    pub value: U256,
    /// Arbitrary calldata, if any.
    pub data: Option<Bytes>,
    /// Gas limit override; estimated when absent.
    pub gas: Option<U256>,
}

/// Optional parameters shared by the contract-call and transfer families.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Sender override; the broadcaster's default account when absent.
    pub account: Option<Address>,
    pub nonce: NonceOption,
    pub metadata: Option<TransactionMetadata>,
}

/// Snapshot of the original call arguments, retained on the tracking
/// record for audit and replay reference. Metadata is excluded.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionRequest {
    ContractCall(CallRequest),
    Transfer(TransferRequest),
    Raw { payload: Bytes },
}

/// The output record of one tracked submission.
///
/// Constructed once, after the broadcast succeeds and nonce verification
/// completes. `nonce` is the value observed on-chain when the lookup
/// succeeds, otherwise the intended nonce the submission was built with.
#[derive(Debug, Clone)]
pub struct TrackedTransaction {
    /// `metadata.id` when supplied, else a freshly generated UUID.
    pub tracking_id: String,
    pub tx_hash: H256,
    pub from: Address,
    pub nonce: u64,
    pub chain_id: u64,
    pub metadata: TransactionMetadata,
    /// Wall-clock time captured at submission start.
    pub initiated_at: DateTime<Utc>,
    pub request: SubmissionRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_nonce_is_default() {
        assert_eq!(NonceOption::default(), NonceOption::Unspecified);
        assert_eq!(BlockTag::default(), BlockTag::Pending);
    }

    #[test]
    fn metadata_preserves_unknown_fields() {
        let json = r#"{
            "id": "order-1",
            "title": "Swap",
            "dapp_session": "abc123",
            "attempt": 2
        }"#;

        let meta: TransactionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id.as_deref(), Some("order-1"));
        assert_eq!(meta.title.as_deref(), Some("Swap"));
        assert_eq!(meta.extra["dapp_session"], serde_json::json!("abc123"));
        assert_eq!(meta.extra["attempt"], serde_json::json!(2));

        let round = serde_json::to_value(&meta).unwrap();
        assert_eq!(round["dapp_session"], serde_json::json!("abc123"));
    }

    #[test]
    fn block_tags_map_to_block_ids() {
        assert_eq!(BlockId::from(BlockTag::Pending), BlockId::Number(BlockNumber::Pending));
        assert_eq!(BlockId::from(BlockTag::Safe), BlockId::Number(BlockNumber::Safe));
    }
}
