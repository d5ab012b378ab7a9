//! Tracked transaction submission for EVM chains
//!
//! This crate wraps a signing/broadcast client so that every outgoing
//! transaction gets a resolved nonce, caller-supplied tracking metadata,
//! and a post-broadcast nonce verification pass, while the underlying
//! client's success and failure semantics stay untouched.
//!
//! The core is [`TrackedSubmitter`], which consumes two injected
//! capabilities: a [`ChainReader`] for nonce and transaction lookups and a
//! [`Broadcaster`] for signing and submission. Completed tracking records
//! are handed to an optional [`TrackingSink`]. Ready-made implementations
//! over HTTP RPC and a local wallet are provided, wired from TOML
//! [`Settings`].

pub mod broadcast;
pub mod chain;
pub mod config;
pub mod error;
pub mod tracker;
pub mod types;

pub use broadcast::{Broadcaster, WalletBroadcaster};
pub use chain::{ChainReader, HttpChainReader};
pub use config::Settings;
pub use error::{TrackerError, TrackerResult};
pub use tracker::{TrackedSubmitter, TrackingSink};
pub use types::{
    BlockTag, CallRequest, ExpectedEvent, NonceOption, SubmissionRequest, SubmitOptions,
    TrackedTransaction, TransactionMetadata, TransferRequest,
};
