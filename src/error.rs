use bitcoin::{BlockHash, Txid};
use thiserror::Error;

use crate::backend::BackendError;

/// All possible errors surfaced by the chain bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("block hash and block height mismatch; (height: {height}, hash at height: {hash_at_height}, expected hash: {expected_hash})")]
    HeightMismatch {
        height: u32,
        hash_at_height: BlockHash,
        expected_hash: BlockHash,
    },

    #[error("message serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("message type {msg_type} is outside the custom message range")]
    InvalidMessageType { msg_type: u32 },

    #[error("unexpected message type: expected {expected}, got {got}")]
    MessageTypeMismatch { expected: u32, got: u32 },

    #[error("no timestamp available for block height {height}")]
    TimestampUnavailable { height: u32 },

    #[error("confirmation height of transaction {txid} is unknown")]
    TxHeightUnknown { txid: Txid },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unable to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn backend(context: &'static str, source: BackendError) -> Self {
        Self::Backend { context, source }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` if the error came from the chain backend rather than
    /// from a check performed by the bridge itself.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }

    /// Returns the wrapped backend error, if any.
    pub fn backend_source(&self) -> Option<&BackendError> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}
