pub mod chain;
pub mod message;

// Re-export commonly used types
pub use chain::{ConfirmationRequest, NodeInfo, TxConfirmation, Version};
pub use message::{decode_message, CustomMessage, PeerId, WireMessage, CUSTOM_TYPE_START};
