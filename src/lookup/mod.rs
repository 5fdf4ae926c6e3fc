//! Chain lookups scoped to a proof or proof file.
//!
//! Proof validation needs a few chain facts: the current height, the height
//! at which an anchor transaction confirmed and a mean block time. A
//! [`ProofChainLookup`] answers them from the proof chain first and falls
//! back to the anchor store and the chain bridge.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Txid;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::backend::BackendResult;
use crate::bridge::ChainBridge;
use crate::error::{BridgeError, Result};

/// Number of blocks averaged by [`ChainLookup::mean_block_timestamp`],
/// matching the median-time-past window.
pub const MEAN_TIMESTAMP_BLOCKS: u32 = 11;

/// Chain facts needed while validating a proof.
#[async_trait]
pub trait ChainLookup: Send + Sync {
    async fn current_height(&self) -> Result<u32>;

    /// Height of the block that confirmed `txid`.
    async fn tx_block_height(&self, txid: &Txid) -> Result<u32>;

    /// Mean timestamp of the [`MEAN_TIMESTAMP_BLOCKS`] blocks ending at
    /// `height`, fewer near genesis.
    async fn mean_block_timestamp(&self, height: u32) -> Result<DateTime<Utc>>;
}

/// Persistent record of anchor transactions confirmed in the past.
#[async_trait]
pub trait AnchorTxStore: Send + Sync {
    /// Confirmation height of `txid`, `None` if the store does not know it.
    async fn tx_height(&self, txid: &Txid) -> BackendResult<Option<u32>>;
}

/// Anchor data exposed by a proof or proof file.
pub trait ProofAnchors: Send + Sync {
    /// Block height recorded for the proof anchored in `txid`, if any.
    fn anchor_height(&self, txid: &Txid) -> Option<u32>;
}

/// The anchor of a single proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofAnchor {
    pub anchor_txid: Txid,
    /// Zero for legacy proofs recorded without a height.
    pub block_height: u32,
}

impl ProofAnchors for ProofAnchor {
    fn anchor_height(&self, txid: &Txid) -> Option<u32> {
        (self.anchor_txid == *txid).then_some(self.block_height)
    }
}

impl ProofAnchors for Vec<ProofAnchor> {
    fn anchor_height(&self, txid: &Txid) -> Option<u32> {
        self.iter().find_map(|anchor| anchor.anchor_height(txid))
    }
}

/// [`ChainLookup`] over a proof chain, the anchor store and a chain bridge.
/// Holds no state of its own.
pub struct ProofChainLookup {
    chain: Arc<dyn ChainBridge>,
    store: Option<Arc<dyn AnchorTxStore>>,
    proofs: Arc<dyn ProofAnchors>,
}

impl ProofChainLookup {
    pub fn new(
        chain: Arc<dyn ChainBridge>,
        store: Option<Arc<dyn AnchorTxStore>>,
        proofs: Arc<dyn ProofAnchors>,
    ) -> Self {
        Self {
            chain,
            store,
            proofs,
        }
    }
}

#[async_trait]
impl ChainLookup for ProofChainLookup {
    async fn current_height(&self) -> Result<u32> {
        self.chain.current_height().await
    }

    async fn tx_block_height(&self, txid: &Txid) -> Result<u32> {
        // A zero height means the proof predates height tracking.
        if let Some(height) = self.proofs.anchor_height(txid).filter(|h| *h > 0) {
            debug!("Resolved height {} for {} from proof chain", height, txid);
            return Ok(height);
        }

        let Some(store) = &self.store else {
            return Err(BridgeError::TxHeightUnknown { txid: *txid });
        };

        store
            .tx_height(txid)
            .await
            .map_err(|e| BridgeError::backend("unable to look up anchor tx height", e))?
            .ok_or(BridgeError::TxHeightUnknown { txid: *txid })
    }

    async fn mean_block_timestamp(&self, height: u32) -> Result<DateTime<Utc>> {
        let mut sum: i64 = 0;
        let mut count: i64 = 0;

        for offset in 0..MEAN_TIMESTAMP_BLOCKS {
            let block_height = match height.checked_sub(offset) {
                Some(h) if h > 0 => h,
                _ => break,
            };

            let ts = self.chain.get_block_timestamp(block_height).await;
            if ts == 0 {
                return Err(BridgeError::TimestampUnavailable {
                    height: block_height,
                });
            }

            sum += ts;
            count += 1;
        }

        if count == 0 {
            return Err(BridgeError::TimestampUnavailable { height });
        }

        DateTime::from_timestamp(sum / count, 0)
            .ok_or(BridgeError::TimestampUnavailable { height })
    }
}
