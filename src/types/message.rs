use std::fmt;

use bitcoin::secp256k1::PublicKey;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BridgeError, Result};

/// First message type code reserved for application-defined peer messages.
/// Lower codes belong to the node's own protocol.
pub const CUSTOM_TYPE_START: u32 = 32768;

/// Compressed public key identifying a remote peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 33]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Parses the identity back into a public key.
    pub fn public_key(&self) -> std::result::Result<PublicKey, bitcoin::secp256k1::Error> {
        PublicKey::from_slice(&self.0)
    }
}

impl From<&PublicKey> for PeerId {
    fn from(key: &PublicKey) -> Self {
        Self(key.serialize())
    }
}

impl From<PublicKey> for PeerId {
    fn from(key: PublicKey) -> Self {
        Self::from(&key)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

/// Raw envelope exchanged with the node's peer messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMessage {
    pub peer: PeerId,
    pub msg_type: u32,
    pub data: Vec<u8>,
}

/// An application message with a fixed type code and a binary wire form.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Type code carried in the envelope.
    const MSG_TYPE: u32;

    fn msg_type(&self) -> u32 {
        Self::MSG_TYPE
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Decodes the payload of an inbound envelope as `M`, rejecting envelopes
/// carrying a different type code.
pub fn decode_message<M: WireMessage>(msg: &CustomMessage) -> Result<M> {
    if msg.msg_type != M::MSG_TYPE {
        return Err(BridgeError::MessageTypeMismatch {
            expected: M::MSG_TYPE,
            got: msg.msg_type,
        });
    }

    M::decode(&msg.data)
}
