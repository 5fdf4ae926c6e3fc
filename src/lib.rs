//! Backend-agnostic chain access for asset proof validation and minting.
//!
//! [`NodeChainBridge`] wraps a single chain node connection ([`ChainBackend`])
//! and serves block queries, header verification, transaction broadcast, fee
//! estimation and confirmation notifications. [`NodeMsgTransport`] relays
//! typed application messages to peers over the same node.

pub mod backend;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod lookup;
pub mod notify;
pub mod transport;
pub mod types;

// Re-exports
pub use backend::{BackendError, BackendFeed, BackendResult, ChainBackend, MessageBackend};
pub use bridge::{ChainBridge, NodeChainBridge};
pub use cache::TimestampCache;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use lookup::{AnchorTxStore, ChainLookup, ProofAnchor, ProofAnchors, ProofChainLookup};
pub use notify::{CancelHandle, ConfirmationEvent, ErrorStream, Subscription};
pub use transport::{MsgTransport, MsgTransportExt, NodeMsgTransport};
pub use types::{
    decode_message, ConfirmationRequest, CustomMessage, NodeInfo, PeerId, TxConfirmation, Version,
    WireMessage, CUSTOM_TYPE_START,
};
