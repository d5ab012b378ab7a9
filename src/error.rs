//! Error types for tracked transaction submission

use thiserror::Error;

/// Main error type for the tracking layer.
///
/// Post-broadcast verification problems are deliberately absent from this
/// enum: once a transaction is on the wire they are logged as warnings and
/// never raised.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Broadcast error: {0}")]
    Broadcast(String),
}

impl TrackerError {
    /// True for conditions detected before any network I/O takes place.
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            TrackerError::Config(_) | TrackerError::Wallet(_) | TrackerError::Decode(_)
        )
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
