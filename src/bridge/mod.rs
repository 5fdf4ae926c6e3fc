//! Chain access for proof validation and minting.
//!
//! [`ChainBridge`] is the surface upper layers program against.
//! [`NodeChainBridge`] implements it on top of a single [`ChainBackend`]
//! connection, adding a block timestamp cache, memoized capability
//! detection and header verification with a fallback for older nodes.

mod capability;
mod verify;

pub use capability::CapabilityDetector;

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::block::Header;
use bitcoin::{Block, BlockHash, FeeRate, ScriptBuf, Transaction, Txid};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::ChainBackend;
use crate::cache::TimestampCache;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::lookup::{AnchorTxStore, ChainLookup, ProofAnchor, ProofAnchors, ProofChainLookup};
use crate::notify::{ConfirmationEvent, ConfirmationRegistrar, ErrorStream, Subscription};
use crate::types::ConfirmationRequest;

/// Chain queries, verification, broadcast and notifications.
#[async_trait]
pub trait ChainBridge: Send + Sync {
    /// Register to be notified once `txid` reaches `num_confs`
    /// confirmations. The returned event owns the registration's cancel
    /// handle.
    async fn register_confirmations(
        &self,
        txid: Txid,
        pk_script: ScriptBuf,
        num_confs: u32,
        height_hint: u32,
        include_block: bool,
        reorg_notify: Option<mpsc::Sender<()>>,
    ) -> Result<(ConfirmationEvent, ErrorStream)>;

    /// Register to be notified of each block connected to the main chain.
    async fn register_block_epochs(&self) -> Result<(Subscription<u32>, ErrorStream)>;

    async fn get_block(&self, hash: &BlockHash) -> Result<Block>;

    async fn get_block_header(&self, hash: &BlockHash) -> Result<Header>;

    /// Hash of the best-chain block at `height`.
    async fn get_block_hash(&self, height: u32) -> Result<BlockHash>;

    async fn is_header_query_supported(&self) -> Result<bool>;

    /// Checks that the block described by `header` is on-chain and, when
    /// `height` is non-zero, that it sits at `height` on the best chain.
    async fn verify_block(&self, header: &Header, height: u32) -> Result<()>;

    async fn current_height(&self) -> Result<u32>;

    /// Timestamp of the block at `height` in unix seconds, or `0` when it
    /// cannot be determined. Callers must treat `0` as unknown.
    async fn get_block_timestamp(&self, height: u32) -> i64;

    async fn publish_transaction(&self, tx: &Transaction) -> Result<()>;

    async fn estimate_fee(&self, conf_target: u32) -> Result<FeeRate>;

    /// Chain lookup that resolves anchor heights from a whole proof file.
    fn gen_file_chain_lookup(&self, proofs: Arc<dyn ProofAnchors>) -> Box<dyn ChainLookup>;

    /// Chain lookup scoped to a single proof.
    fn gen_proof_chain_lookup(&self, proof: ProofAnchor) -> Box<dyn ChainLookup>;
}

struct Inner<B> {
    backend: Arc<B>,
    capability: CapabilityDetector<B>,
    timestamps: TimestampCache,
    registrar: ConfirmationRegistrar<B>,
    publish_label: String,
    anchor_store: Option<Arc<dyn AnchorTxStore>>,
}

/// [`ChainBridge`] backed by a remote chain node.
///
/// Cloning is cheap and clones share the cache and capability state.
pub struct NodeChainBridge<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for NodeChainBridge<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ChainBackend + 'static> NodeChainBridge<B> {
    pub fn new(backend: Arc<B>, config: &BridgeConfig) -> Result<Self> {
        Self::build(backend, config, None)
    }

    /// Like [`NodeChainBridge::new`], with a store consulted for anchor
    /// transaction heights that proofs do not carry.
    pub fn with_anchor_store(
        backend: Arc<B>,
        config: &BridgeConfig,
        store: Arc<dyn AnchorTxStore>,
    ) -> Result<Self> {
        Self::build(backend, config, Some(store))
    }

    fn build(
        backend: Arc<B>,
        config: &BridgeConfig,
        anchor_store: Option<Arc<dyn AnchorTxStore>>,
    ) -> Result<Self> {
        config.validate()?;

        let inner = Inner {
            capability: CapabilityDetector::new(
                Arc::clone(&backend),
                config.backend.header_query_min_version,
            ),
            timestamps: TimestampCache::new(config.cache.timestamp_capacity),
            registrar: ConfirmationRegistrar::new(Arc::clone(&backend)),
            publish_label: config.backend.publish_label.clone(),
            anchor_store,
            backend,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.inner.backend)
    }

    pub fn timestamp_cache(&self) -> &TimestampCache {
        &self.inner.timestamps
    }

    /// Error-carrying form of [`ChainBridge::get_block_timestamp`].
    pub async fn lookup_block_timestamp(&self, height: u32) -> Result<u32> {
        if height == 0 {
            return Err(BridgeError::TimestampUnavailable { height });
        }

        if let Some(ts) = self.inner.timestamps.get(height) {
            debug!("Timestamp cache hit for height {}", height);
            return Ok(ts);
        }

        let hash = self.get_block_hash(height).await?;

        let header = if self.is_header_query_supported().await? {
            self.get_block_header(&hash).await?
        } else {
            self.get_block(&hash).await?.header
        };

        let ts = header.time;
        self.inner.timestamps.put(height, ts);
        debug!("Cached timestamp {} for height {}", ts, height);

        Ok(ts)
    }

    fn chain_lookup(&self, proofs: Arc<dyn ProofAnchors>) -> Box<dyn ChainLookup> {
        Box::new(ProofChainLookup::new(
            Arc::new(self.clone()),
            self.inner.anchor_store.clone(),
            proofs,
        ))
    }
}

#[async_trait]
impl<B: ChainBackend + 'static> ChainBridge for NodeChainBridge<B> {
    async fn register_confirmations(
        &self,
        txid: Txid,
        pk_script: ScriptBuf,
        num_confs: u32,
        height_hint: u32,
        include_block: bool,
        reorg_notify: Option<mpsc::Sender<()>>,
    ) -> Result<(ConfirmationEvent, ErrorStream)> {
        let request = ConfirmationRequest {
            txid,
            pk_script,
            num_confs,
            height_hint,
            include_block,
            reorg_notify,
        };

        self.inner.registrar.register_confirmations(request).await
    }

    async fn register_block_epochs(&self) -> Result<(Subscription<u32>, ErrorStream)> {
        self.inner.registrar.register_block_epochs().await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Block> {
        self.inner
            .backend
            .get_block(hash)
            .await
            .map_err(|e| BridgeError::backend("unable to retrieve block", e))
    }

    async fn get_block_header(&self, hash: &BlockHash) -> Result<Header> {
        self.inner
            .backend
            .get_block_header(hash)
            .await
            .map_err(|e| BridgeError::backend("unable to retrieve block header", e))
    }

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash> {
        self.inner
            .backend
            .get_block_hash(height)
            .await
            .map_err(|e| BridgeError::backend("unable to retrieve block hash", e))
    }

    async fn is_header_query_supported(&self) -> Result<bool> {
        self.inner.capability.is_header_query_supported().await
    }

    async fn verify_block(&self, header: &Header, height: u32) -> Result<()> {
        self.verify(header, height).await
    }

    async fn current_height(&self) -> Result<u32> {
        let info = self
            .inner
            .backend
            .get_info()
            .await
            .map_err(|e| BridgeError::backend("unable to grab block height", e))?;

        Ok(info.block_height)
    }

    async fn get_block_timestamp(&self, height: u32) -> i64 {
        // Shortcut any lookup in case we don't have a valid height.
        if height == 0 {
            return 0;
        }

        match self.lookup_block_timestamp(height).await {
            Ok(ts) => i64::from(ts),
            Err(e) => {
                warn!("Unable to determine timestamp of block {}: {}", height, e);
                0
            }
        }
    }

    async fn publish_transaction(&self, tx: &Transaction) -> Result<()> {
        let txid = tx.compute_txid();

        self.inner
            .backend
            .publish_transaction(tx, &self.inner.publish_label)
            .await
            .map_err(|e| BridgeError::backend("unable to publish transaction", e))?;

        info!(
            "Published transaction {} (label={})",
            txid, self.inner.publish_label
        );
        Ok(())
    }

    async fn estimate_fee(&self, conf_target: u32) -> Result<FeeRate> {
        self.inner
            .backend
            .estimate_fee_rate(conf_target)
            .await
            .map_err(|e| BridgeError::backend("unable to estimate fee rate", e))
    }

    fn gen_file_chain_lookup(&self, proofs: Arc<dyn ProofAnchors>) -> Box<dyn ChainLookup> {
        self.chain_lookup(proofs)
    }

    fn gen_proof_chain_lookup(&self, proof: ProofAnchor) -> Box<dyn ChainLookup> {
        self.chain_lookup(Arc::new(proof))
    }
}
