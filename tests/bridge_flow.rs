use std::sync::Arc;
use std::time::Duration;

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::ScriptBuf;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;

use chainbridge::backend::mock::{mock_block, mock_transaction, MockBackend, MockRpc};
use chainbridge::{
    decode_message, BridgeConfig, BridgeError, ChainBridge, MsgTransport, MsgTransportExt,
    NodeChainBridge, NodeMsgTransport, ProofAnchor, TxConfirmation, Version, WireMessage,
    CUSTOM_TYPE_START,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(version: Version, blocks: u32) -> (Arc<MockBackend>, NodeChainBridge<MockBackend>) {
    init_tracing();

    let backend = Arc::new(MockBackend::with_version(version));
    for height in 1..=blocks {
        backend.add_block(height, mock_block(height, 1_700_000_000 + height * 600));
    }

    let bridge = NodeChainBridge::new(Arc::clone(&backend), &BridgeConfig::default()).unwrap();
    (backend, bridge)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verification_and_timestamps() {
    let (backend, bridge) = setup(Version::new(0, 18, 0), 50);

    let handles: Vec<_> = (1..=50u32)
        .map(|height| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                let header = mock_block(height, 1_700_000_000 + height * 600).header;
                bridge.verify_block(&header, height).await.unwrap();
                bridge.get_block_timestamp(height).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let height = i as u32 + 1;
        assert_eq!(
            handle.await.unwrap(),
            i64::from(1_700_000_000 + height * 600)
        );
    }

    // Racing first users may each ask for the version, but never more than
    // once per caller, and the answer is then fixed.
    assert!(backend.calls(MockRpc::GetVersion) >= 1);
    assert!(backend.calls(MockRpc::GetVersion) <= 50);
    assert_eq!(backend.calls(MockRpc::GetBlock), 0);
    assert_eq!(bridge.timestamp_cache().len(), 50);

    let before = backend.calls(MockRpc::GetVersion);
    for height in 1..=50u32 {
        bridge.get_block_timestamp(height).await;
    }
    assert_eq!(backend.calls(MockRpc::GetVersion), before);
    assert_eq!(backend.calls(MockRpc::GetBlockHash), 100);
}

#[tokio::test]
async fn test_legacy_node_full_flow() {
    let (backend, bridge) = setup(Version::new(0, 16, 3), 3);

    let header = mock_block(2, 1_700_001_200).header;
    bridge.verify_block(&header, 2).await.unwrap();
    assert_eq!(bridge.get_block_timestamp(3).await, 1_700_001_800);

    assert_eq!(backend.calls(MockRpc::GetBlockHeader), 0);
    assert_eq!(backend.calls(MockRpc::GetBlock), 2);

    let wrong = mock_block(3, 1_700_001_800).header;
    assert!(matches!(
        bridge.verify_block(&wrong, 2).await,
        Err(BridgeError::HeightMismatch { height: 2, .. })
    ));
}

#[tokio::test]
async fn test_confirmation_with_block_and_reorg() {
    let (backend, bridge) = setup(Version::new(0, 18, 0), 10);
    let tx = mock_transaction(77);
    let txid = tx.compute_txid();
    let (reorg_tx, mut reorg_rx) = mpsc::channel(4);

    let (mut event, _errors) = bridge
        .register_confirmations(txid, ScriptBuf::new(), 3, 8, true, Some(reorg_tx))
        .await
        .unwrap();

    let block = mock_block(10, 1_700_006_000);
    let delivered = backend.confirm(
        txid,
        TxConfirmation {
            block_hash: block.block_hash(),
            block_height: 10,
            tx_index: 0,
            tx: tx.clone(),
            block: Some(block.clone()),
        },
    );
    assert_eq!(delivered, 1);

    let conf = timeout(Duration::from_secs(1), event.confirmed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conf.block_height, 10);
    assert_eq!(conf.tx.compute_txid(), txid);
    assert_eq!(conf.block.unwrap().block_hash(), block.block_hash());

    // At most one confirmation per registration.
    assert!(event.confirmed().await.is_none());

    // Reorgs are still reported until the registration is cancelled.
    assert_eq!(backend.reorg(txid), 1);
    assert_eq!(reorg_rx.recv().await, Some(()));

    event.cancel();
    event.cancel();
    assert!(event.is_cancelled());
    assert_eq!(backend.reorg(txid), 0);
    assert_eq!(backend.active_confirmation_feeds(), 0);
}

#[tokio::test]
async fn test_confirmation_without_block() {
    let (backend, bridge) = setup(Version::new(0, 18, 0), 1);
    let tx = mock_transaction(5);
    let txid = tx.compute_txid();

    let (mut event, _errors) = bridge
        .register_confirmations(txid, ScriptBuf::new(), 1, 1, false, None)
        .await
        .unwrap();

    let block = mock_block(1, 1_700_000_600);
    backend.confirm(
        txid,
        TxConfirmation {
            block_hash: block.block_hash(),
            block_height: 1,
            tx_index: 0,
            tx,
            block: Some(block),
        },
    );

    let conf = event.confirmed().await.unwrap();
    assert!(conf.block.is_none());
}

#[tokio::test]
async fn test_cancelled_registration_receives_nothing() {
    let (backend, bridge) = setup(Version::new(0, 18, 0), 1);
    let tx = mock_transaction(6);
    let txid = tx.compute_txid();

    let (mut event, _errors) = bridge
        .register_confirmations(txid, ScriptBuf::new(), 1, 1, false, None)
        .await
        .unwrap();
    event.cancel();

    let block = mock_block(1, 1_700_000_600);
    let delivered = backend.confirm(
        txid,
        TxConfirmation {
            block_hash: block.block_hash(),
            block_height: 1,
            tx_index: 0,
            tx,
            block: None,
        },
    );

    assert_eq!(delivered, 0);
    assert!(event.confirmed().await.is_none());
}

#[tokio::test]
async fn test_block_epochs_as_stream() {
    let (backend, bridge) = setup(Version::new(0, 18, 0), 0);

    let (epochs, _errors) = bridge.register_block_epochs().await.unwrap();
    let cancel = epochs.cancel_handle();
    let mut stream = epochs.into_stream();

    for height in 100..105u32 {
        backend.connect_block_epoch(height);
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(stream.next().await.unwrap());
    }
    assert_eq!(seen, vec![100, 101, 102, 103, 104]);
    assert_eq!(bridge.current_height().await.unwrap(), 104);

    cancel.cancel();
    backend.connect_block_epoch(105);
    assert_eq!(stream.next().await, None);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProofRequest {
    outpoint: String,
    depth: u16,
}

impl WireMessage for ProofRequest {
    const MSG_TYPE: u32 = CUSTOM_TYPE_START + 100;
}

fn peer_key(seed: u8) -> PublicKey {
    let secp = Secp256k1::new();
    PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[seed; 32]).unwrap())
}

#[tokio::test]
async fn test_peer_message_exchange() {
    init_tracing();
    let backend = Arc::new(MockBackend::new());
    let transport = NodeMsgTransport::new(Arc::clone(&backend));
    let (mut inbox, _errors) = transport.subscribe_custom_messages().await.unwrap();

    let request = ProofRequest {
        outpoint: "ab".repeat(32) + ":1",
        depth: 4,
    };
    transport.send_message(&peer_key(1), &request).await.unwrap();

    // Loop the sent envelope back in as if the peer echoed it.
    let sent = backend.sent_messages().remove(0);
    backend.receive_custom_message(sent);

    let received = timeout(Duration::from_secs(1), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.peer.public_key().unwrap(), peer_key(1));
    assert_eq!(decode_message::<ProofRequest>(&received).unwrap(), request);
}

#[tokio::test]
async fn test_proof_lookup_over_bridge() {
    let (_backend, bridge) = setup(Version::new(0, 18, 0), 30);
    let txid = mock_transaction(1).compute_txid();

    let lookup = bridge.gen_proof_chain_lookup(ProofAnchor {
        anchor_txid: txid,
        block_height: 25,
    });

    assert_eq!(lookup.current_height().await.unwrap(), 30);
    assert_eq!(lookup.tx_block_height(&txid).await.unwrap(), 25);

    // Heights 15..=25 average to height 20.
    let mean = lookup.mean_block_timestamp(25).await.unwrap();
    assert_eq!(mean.timestamp(), i64::from(1_700_000_000u32 + 20 * 600));
}

#[tokio::test]
async fn test_cancel_releases_error_stream_waiters() {
    let (backend, bridge) = setup(Version::new(0, 18, 0), 1);
    let txid = mock_transaction(9).compute_txid();

    let (event, mut conf_errors) = bridge
        .register_confirmations(txid, ScriptBuf::new(), 1, 1, false, None)
        .await
        .unwrap();
    event.cancel();
    let next = timeout(Duration::from_millis(500), conf_errors.recv()).await;
    assert!(matches!(next, Ok(None)));

    let transport: Arc<dyn MsgTransport> =
        Arc::new(NodeMsgTransport::new(Arc::clone(&backend)));
    let (inbox, mut msg_errors) = transport.subscribe_custom_messages().await.unwrap();
    inbox.cancel();
    let next = timeout(Duration::from_millis(500), msg_errors.recv()).await;
    assert!(matches!(next, Ok(None)));

    assert_eq!(backend.active_confirmation_feeds(), 0);
    assert_eq!(backend.active_message_feeds(), 0);
}
