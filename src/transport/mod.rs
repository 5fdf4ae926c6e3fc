//! Peer messaging over the node's custom message transport.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;
use tracing::debug;

use crate::backend::MessageBackend;
use crate::error::{BridgeError, Result};
use crate::notify::{CancelGuard, ErrorStream, Subscription};
use crate::types::{CustomMessage, PeerId, WireMessage, CUSTOM_TYPE_START};

/// Sends and receives application messages addressed to peers.
///
/// Inbound envelopes from every peer share one subscription; routing them by
/// peer or type is up to the consumer. Typed sends live on
/// [`MsgTransportExt`], which every transport gets for free.
#[async_trait]
pub trait MsgTransport: Send + Sync {
    async fn subscribe_custom_messages(
        &self,
    ) -> Result<(Subscription<CustomMessage>, ErrorStream)>;

    /// Sends a pre-built envelope as is.
    async fn send_custom_message(&self, msg: CustomMessage) -> Result<()>;
}

/// Typed sends over any [`MsgTransport`], trait objects included.
#[async_trait]
pub trait MsgTransportExt: MsgTransport {
    /// Encodes `msg` and sends it to `peer`. Encoding errors are returned
    /// before anything reaches the network.
    async fn send_message<M>(&self, peer: &PublicKey, msg: &M) -> Result<()>
    where
        M: WireMessage + Sync;
}

#[async_trait]
impl<T: MsgTransport + ?Sized> MsgTransportExt for T {
    async fn send_message<M>(&self, peer: &PublicKey, msg: &M) -> Result<()>
    where
        M: WireMessage + Sync,
    {
        let msg_type = msg.msg_type();
        if msg_type < CUSTOM_TYPE_START {
            return Err(BridgeError::InvalidMessageType { msg_type });
        }

        let data = msg.encode()?;

        self.send_custom_message(CustomMessage {
            peer: PeerId::from(peer),
            msg_type,
            data,
        })
        .await
    }
}

/// [`MsgTransport`] backed by the chain node's peer connections.
pub struct NodeMsgTransport<B> {
    backend: Arc<B>,
}

impl<B> Clone for NodeMsgTransport<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: MessageBackend> NodeMsgTransport<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: MessageBackend> MsgTransport for NodeMsgTransport<B> {
    async fn subscribe_custom_messages(
        &self,
    ) -> Result<(Subscription<CustomMessage>, ErrorStream)> {
        let guard = CancelGuard::new();

        let feed = self
            .backend
            .subscribe_custom_messages(guard.handle())
            .await
            .map_err(|e| BridgeError::backend("unable to subscribe to custom messages", e))?;
        let cancel = guard.disarm();

        debug!("Subscribed to custom peer messages");

        let errors = Subscription::new(feed.errors, cancel.clone());
        Ok((Subscription::new(feed.items, cancel), errors))
    }

    async fn send_custom_message(&self, msg: CustomMessage) -> Result<()> {
        let peer = msg.peer;
        let msg_type = msg.msg_type;
        let len = msg.data.len();

        self.backend
            .send_custom_message(msg)
            .await
            .map_err(|e| BridgeError::backend("unable to send custom message", e))?;

        debug!(
            "Sent custom message type {} ({} bytes) to {}",
            msg_type, len, peer
        );
        Ok(())
    }
}
