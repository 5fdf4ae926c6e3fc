use std::fmt;
use std::str::FromStr;

use bitcoin::{Block, BlockHash, ScriptBuf, Transaction, Txid};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BridgeError;

/// Release version reported by the chain backend.
///
/// Field order matters: the derived ordering compares major, then minor, then
/// patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true if this version is at least `minimum`.
    pub fn is_at_least(&self, minimum: &Version) -> bool {
        self >= minimum
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept an optional leading "v" and ignore any pre-release suffix
        // such as "-beta".
        let core = s.trim().trim_start_matches('v');
        let core = core.split(['-', '+']).next().unwrap_or_default();

        let parts = core
            .split('.')
            .map(|p| {
                p.parse::<u32>()
                    .map_err(|_| BridgeError::config(format!("invalid version string: {s}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(BridgeError::config(format!("invalid version string: {s}"))),
        }
    }
}

/// Snapshot of the backend's view of the best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub block_height: u32,
}

/// Parameters of a confirmation registration.
///
/// `num_confs` and `height_hint` are hints passed through to the backend; the
/// bridge does not enforce them.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub txid: Txid,
    pub pk_script: ScriptBuf,
    pub num_confs: u32,
    pub height_hint: u32,
    /// Attach the full confirming block to the notification.
    pub include_block: bool,
    /// Signalled by the backend each time the confirming block is reorged out.
    pub reorg_notify: Option<mpsc::Sender<()>>,
}

/// Delivered once a transaction reaches the requested depth.
#[derive(Debug, Clone, PartialEq)]
pub struct TxConfirmation {
    pub block_hash: BlockHash,
    pub block_height: u32,
    pub tx_index: u32,
    pub tx: Transaction,
    /// Present only when the registration asked for `include_block`.
    pub block: Option<Block>,
}
