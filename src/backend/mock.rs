//! Mock backend for testing and development.
//!
//! [`MockBackend`] keeps an in-memory chain, counts every RPC it serves and
//! can be told to fail individual calls. Notification feeds are driven by
//! the test through helpers such as [`MockBackend::confirm`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version as TxVersion;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, FeeRate, ScriptBuf, Transaction, TxMerkleNode, TxOut,
    Txid,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::{BackendError, BackendFeed, BackendResult, ChainBackend, MessageBackend};
use crate::notify::CancelHandle;
use crate::types::{ConfirmationRequest, CustomMessage, NodeInfo, TxConfirmation, Version};

const FEED_BUFFER: usize = 16;

/// Build a block whose hash is unique per `nonce`, carrying one
/// transaction.
pub fn mock_block(nonce: u32, time: u32) -> Block {
    Block {
        header: Header {
            version: BlockVersion::ONE,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::all_zeros(),
            time,
            bits: CompactTarget::from_consensus(0x207f_ffff),
            nonce,
        },
        txdata: vec![mock_transaction(nonce)],
    }
}

/// Build a transaction whose txid is unique per `seed`.
pub fn mock_transaction(seed: u32) -> Transaction {
    Transaction {
        version: TxVersion::TWO,
        lock_time: LockTime::from_consensus(seed),
        input: vec![],
        output: vec![TxOut {
            value: Amount::from_sat(u64::from(seed) + 1_000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// Identifies a backend call for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockRpc {
    GetBlock,
    GetBlockHeader,
    GetBlockHash,
    GetInfo,
    GetVersion,
    PublishTransaction,
    EstimateFeeRate,
    RegisterConfirmations,
    RegisterBlockEpochs,
    SubscribeCustomMessages,
    SendCustomMessage,
}

struct FeedSenders<T> {
    items: mpsc::Sender<T>,
    errors: mpsc::Sender<BackendError>,
}

/// Backend end of a subscription. The senders are dropped by a watcher task
/// as soon as the cancel handle fires, which ends both receivers.
struct Feed<T> {
    senders: Arc<Mutex<Option<FeedSenders<T>>>>,
    cancel: CancelHandle,
}

impl<T: Send + 'static> Feed<T> {
    fn open(cancel: CancelHandle) -> (Self, BackendFeed<T>) {
        let (items_tx, items_rx) = mpsc::channel(FEED_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(FEED_BUFFER);

        let senders = Arc::new(Mutex::new(Some(FeedSenders {
            items: items_tx,
            errors: errors_tx,
        })));

        let slot = Arc::clone(&senders);
        let watched = cancel.clone();
        tokio::spawn(async move {
            watched.cancelled().await;
            slot.lock().take();
        });

        let feed = Self { senders, cancel };
        let backend_feed = BackendFeed {
            items: items_rx,
            errors: errors_rx,
        };
        (feed, backend_feed)
    }

    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn send_item(&self, item: T) -> bool {
        match self.senders.lock().as_ref() {
            Some(senders) if self.is_live() => senders.items.try_send(item).is_ok(),
            _ => false,
        }
    }

    fn send_error(&self, err: BackendError) {
        if let Some(senders) = self.senders.lock().as_ref() {
            let _ = senders.errors.try_send(err);
        }
    }
}

struct ConfirmationFeed {
    txid: Txid,
    include_block: bool,
    reorg_notify: Option<mpsc::Sender<()>>,
    feed: Feed<TxConfirmation>,
}

/// In-memory implementation of [`ChainBackend`] and [`MessageBackend`].
pub struct MockBackend {
    blocks: RwLock<HashMap<BlockHash, Block>>,
    best_chain: RwLock<HashMap<u32, BlockHash>>,
    tip_height: AtomicU32,
    version: RwLock<Version>,
    fee_rate: RwLock<FeeRate>,
    published: RwLock<Vec<(Transaction, String)>>,
    sent_messages: RwLock<Vec<CustomMessage>>,
    calls: Mutex<HashMap<MockRpc, usize>>,
    failures: RwLock<HashMap<MockRpc, BackendError>>,
    stalled: RwLock<HashSet<MockRpc>>,
    confirmation_feeds: Mutex<Vec<ConfirmationFeed>>,
    epoch_feeds: Mutex<Vec<Feed<u32>>>,
    message_feeds: Mutex<Vec<Feed<CustomMessage>>>,
}

impl MockBackend {
    /// Create an empty chain backed by a node new enough for header queries.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            best_chain: RwLock::new(HashMap::new()),
            tip_height: AtomicU32::new(0),
            version: RwLock::new(Version::new(0, 18, 0)),
            fee_rate: RwLock::new(FeeRate::from_sat_per_kwu(253)),
            published: RwLock::new(Vec::new()),
            sent_messages: RwLock::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            stalled: RwLock::new(HashSet::new()),
            confirmation_feeds: Mutex::new(Vec::new()),
            epoch_feeds: Mutex::new(Vec::new()),
            message_feeds: Mutex::new(Vec::new()),
        }
    }

    /// Create a backend reporting the given version.
    pub fn with_version(version: Version) -> Self {
        let backend = Self::new();
        backend.set_version(version);
        backend
    }

    pub fn set_version(&self, version: Version) {
        *self.version.write() = version;
    }

    pub fn set_fee_rate(&self, fee_rate: FeeRate) {
        *self.fee_rate.write() = fee_rate;
    }

    /// Connect `block` to the best chain at `height`, raising the tip if
    /// needed.
    pub fn add_block(&self, height: u32, block: Block) {
        let hash = block.block_hash();
        self.blocks.write().insert(hash, block);
        self.best_chain.write().insert(height, hash);
        self.tip_height.fetch_max(height, Ordering::Relaxed);
    }

    /// Store a block the node knows about but that is not on the best chain.
    pub fn add_stale_block(&self, block: Block) {
        self.blocks.write().insert(block.block_hash(), block);
    }

    /// Make every subsequent call of `rpc` fail with `err`.
    pub fn fail(&self, rpc: MockRpc, err: BackendError) {
        self.failures.write().insert(rpc, err);
    }

    /// Undo a previous [`MockBackend::fail`].
    pub fn recover(&self, rpc: MockRpc) {
        self.failures.write().remove(&rpc);
    }

    /// Make subscription calls of `rpc` set up their feed and then never
    /// answer, as a node would while the caller gives up waiting.
    pub fn stall(&self, rpc: MockRpc) {
        self.stalled.write().insert(rpc);
    }

    /// Number of times `rpc` was invoked.
    pub fn calls(&self, rpc: MockRpc) -> usize {
        self.calls.lock().get(&rpc).copied().unwrap_or(0)
    }

    pub fn published(&self) -> Vec<(Transaction, String)> {
        self.published.read().clone()
    }

    pub fn sent_messages(&self) -> Vec<CustomMessage> {
        self.sent_messages.read().clone()
    }

    /// Deliver a confirmation to every live registration for `txid`.
    /// Returns the number of registrations notified.
    pub fn confirm(&self, txid: Txid, conf: TxConfirmation) -> usize {
        let mut feeds = self.confirmation_feeds.lock();
        feeds.retain(|f| f.feed.is_live());

        let mut delivered = 0;
        for f in feeds.iter().filter(|f| f.txid == txid) {
            let mut conf = conf.clone();
            if !f.include_block {
                conf.block = None;
            }
            if f.feed.send_item(conf) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Signal a reorg to every live registration for `txid` that supplied a
    /// reorg channel.
    pub fn reorg(&self, txid: Txid) -> usize {
        let mut feeds = self.confirmation_feeds.lock();
        feeds.retain(|f| f.feed.is_live());

        let mut signalled = 0;
        for reorg in feeds
            .iter()
            .filter(|f| f.txid == txid)
            .filter_map(|f| f.reorg_notify.as_ref())
        {
            if reorg.try_send(()).is_ok() {
                signalled += 1;
            }
        }
        signalled
    }

    /// Push an asynchronous failure to every live confirmation registration.
    pub fn fail_confirmation_feeds(&self, err: BackendError) {
        let mut feeds = self.confirmation_feeds.lock();
        feeds.retain(|f| f.feed.is_live());
        for f in feeds.iter() {
            f.feed.send_error(err.clone());
        }
    }

    pub fn active_confirmation_feeds(&self) -> usize {
        let mut feeds = self.confirmation_feeds.lock();
        feeds.retain(|f| f.feed.is_live());
        feeds.len()
    }

    /// Connect a new block height and notify epoch subscribers.
    pub fn connect_block_epoch(&self, height: u32) {
        self.tip_height.fetch_max(height, Ordering::Relaxed);

        let mut feeds = self.epoch_feeds.lock();
        feeds.retain(|f| f.is_live());
        for f in feeds.iter() {
            f.send_item(height);
        }
    }

    pub fn active_epoch_feeds(&self) -> usize {
        let mut feeds = self.epoch_feeds.lock();
        feeds.retain(|f| f.is_live());
        feeds.len()
    }

    /// Simulate a message arriving from a peer.
    pub fn receive_custom_message(&self, msg: CustomMessage) -> usize {
        let mut feeds = self.message_feeds.lock();
        feeds.retain(|f| f.is_live());

        let mut delivered = 0;
        for f in feeds.iter() {
            if f.send_item(msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn fail_message_feeds(&self, err: BackendError) {
        let mut feeds = self.message_feeds.lock();
        feeds.retain(|f| f.is_live());
        for f in feeds.iter() {
            f.send_error(err.clone());
        }
    }

    pub fn active_message_feeds(&self) -> usize {
        let mut feeds = self.message_feeds.lock();
        feeds.retain(|f| f.is_live());
        feeds.len()
    }

    fn record(&self, rpc: MockRpc) -> BackendResult<()> {
        *self.calls.lock().entry(rpc).or_insert(0) += 1;

        match self.failures.read().get(&rpc) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn maybe_stall(&self, rpc: MockRpc) {
        let stalled = self.stalled.read().contains(&rpc);
        if stalled {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainBackend for MockBackend {
    async fn get_block(&self, hash: &BlockHash) -> BackendResult<Block> {
        self.record(MockRpc::GetBlock)?;
        self.blocks
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("block {hash}")))
    }

    async fn get_block_header(&self, hash: &BlockHash) -> BackendResult<Header> {
        self.record(MockRpc::GetBlockHeader)?;
        self.blocks
            .read()
            .get(hash)
            .map(|block| block.header)
            .ok_or_else(|| BackendError::not_found(format!("block header {hash}")))
    }

    async fn get_block_hash(&self, height: u32) -> BackendResult<BlockHash> {
        self.record(MockRpc::GetBlockHash)?;
        self.best_chain
            .read()
            .get(&height)
            .copied()
            .ok_or_else(|| BackendError::not_found(format!("no block at height {height}")))
    }

    async fn get_info(&self) -> BackendResult<NodeInfo> {
        self.record(MockRpc::GetInfo)?;
        Ok(NodeInfo {
            block_height: self.tip_height.load(Ordering::Relaxed),
        })
    }

    async fn get_version(&self) -> BackendResult<Version> {
        self.record(MockRpc::GetVersion)?;
        Ok(*self.version.read())
    }

    async fn publish_transaction(&self, tx: &Transaction, label: &str) -> BackendResult<()> {
        self.record(MockRpc::PublishTransaction)?;
        self.published.write().push((tx.clone(), label.to_string()));
        Ok(())
    }

    async fn estimate_fee_rate(&self, _conf_target: u32) -> BackendResult<FeeRate> {
        self.record(MockRpc::EstimateFeeRate)?;
        Ok(*self.fee_rate.read())
    }

    async fn register_confirmations(
        &self,
        request: ConfirmationRequest,
        cancel: CancelHandle,
    ) -> BackendResult<BackendFeed<TxConfirmation>> {
        self.record(MockRpc::RegisterConfirmations)?;

        let (feed, backend_feed) = Feed::open(cancel);
        self.confirmation_feeds.lock().push(ConfirmationFeed {
            txid: request.txid,
            include_block: request.include_block,
            reorg_notify: request.reorg_notify,
            feed,
        });
        self.maybe_stall(MockRpc::RegisterConfirmations).await;
        Ok(backend_feed)
    }

    async fn register_block_epochs(&self, cancel: CancelHandle) -> BackendResult<BackendFeed<u32>> {
        self.record(MockRpc::RegisterBlockEpochs)?;

        let (feed, backend_feed) = Feed::open(cancel);
        self.epoch_feeds.lock().push(feed);
        self.maybe_stall(MockRpc::RegisterBlockEpochs).await;
        Ok(backend_feed)
    }
}

#[async_trait]
impl MessageBackend for MockBackend {
    async fn subscribe_custom_messages(
        &self,
        cancel: CancelHandle,
    ) -> BackendResult<BackendFeed<CustomMessage>> {
        self.record(MockRpc::SubscribeCustomMessages)?;

        let (feed, backend_feed) = Feed::open(cancel);
        self.message_feeds.lock().push(feed);
        self.maybe_stall(MockRpc::SubscribeCustomMessages).await;
        Ok(backend_feed)
    }

    async fn send_custom_message(&self, msg: CustomMessage) -> BackendResult<()> {
        self.record(MockRpc::SendCustomMessage)?;
        self.sent_messages.write().push(msg);
        Ok(())
    }
}
