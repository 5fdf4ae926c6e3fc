//! Interfaces to the remote chain node.
//!
//! The bridge never talks to a node directly. It consumes these traits, which
//! a concrete RPC client implements. [`mock::MockBackend`] implements both for
//! tests and local development.

pub mod mock;

use async_trait::async_trait;
use bitcoin::block::Header;
use bitcoin::{Block, BlockHash, FeeRate, Transaction};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::notify::CancelHandle;
use crate::types::{ConfirmationRequest, CustomMessage, NodeInfo, TxConfirmation, Version};

/// Failure reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Live notification channels handed back by a backend subscription.
///
/// The backend keeps the senders until the subscription's [`CancelHandle`]
/// fires, then drops them so both receivers terminate.
#[derive(Debug)]
pub struct BackendFeed<T> {
    pub items: mpsc::Receiver<T>,
    pub errors: mpsc::Receiver<BackendError>,
}

/// Chain queries, broadcast and notifications offered by the node.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Fetch a full block by hash.
    async fn get_block(&self, hash: &BlockHash) -> BackendResult<Block>;

    /// Fetch only the header of a block. Only available on nodes that
    /// advertise header queries, see [`ChainBackend::get_version`].
    async fn get_block_header(&self, hash: &BlockHash) -> BackendResult<Header>;

    /// Hash of the best-chain block at `height`.
    async fn get_block_hash(&self, height: u32) -> BackendResult<BlockHash>;

    async fn get_info(&self) -> BackendResult<NodeInfo>;

    async fn get_version(&self) -> BackendResult<Version>;

    async fn publish_transaction(&self, tx: &Transaction, label: &str) -> BackendResult<()>;

    async fn estimate_fee_rate(&self, conf_target: u32) -> BackendResult<FeeRate>;

    /// Subscribe to the confirmation of `request.txid`. The subscription must
    /// end once `cancel` fires.
    async fn register_confirmations(
        &self,
        request: ConfirmationRequest,
        cancel: CancelHandle,
    ) -> BackendResult<BackendFeed<TxConfirmation>>;

    /// Subscribe to the height of every block connected to the best chain.
    async fn register_block_epochs(&self, cancel: CancelHandle) -> BackendResult<BackendFeed<u32>>;
}

/// Peer messaging offered by the node.
#[async_trait]
pub trait MessageBackend: Send + Sync {
    /// Subscribe to custom messages received from any peer.
    async fn subscribe_custom_messages(
        &self,
        cancel: CancelHandle,
    ) -> BackendResult<BackendFeed<CustomMessage>>;

    async fn send_custom_message(&self, msg: CustomMessage) -> BackendResult<()>;
}
