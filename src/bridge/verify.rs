use bitcoin::block::Header;
use tracing::{debug, warn};

use crate::backend::ChainBackend;
use crate::error::{BridgeError, Result};

use super::{ChainBridge, NodeChainBridge};

impl<B: ChainBackend + 'static> NodeChainBridge<B> {
    /// Verification pipeline:
    /// 1. Without a height (legacy proofs), only check the block exists
    /// 2. Compare the best-chain hash at `height` with the header's hash
    /// 3. Confirm the header is known, fetching only the header when the
    ///    backend supports it and the full block otherwise
    pub(super) async fn verify(&self, header: &Header, height: u32) -> Result<()> {
        let expected_hash = header.block_hash();

        // TODO: reject unset heights once every stored proof has been
        // migrated to carry one.
        if height == 0 {
            debug!("Verifying block {} without a height", expected_hash);
            self.get_block(&expected_hash).await?;
            return Ok(());
        }

        let hash_at_height = self.get_block_hash(height).await?;
        if hash_at_height != expected_hash {
            warn!(
                "Block {} is not at height {} (found {})",
                expected_hash, height, hash_at_height
            );
            return Err(BridgeError::HeightMismatch {
                height,
                hash_at_height,
                expected_hash,
            });
        }

        if self.is_header_query_supported().await? {
            self.get_block_header(&expected_hash).await?;
        } else {
            self.get_block(&expected_hash).await?;
        }

        debug!("Verified block {} at height {}", expected_hash, height);
        Ok(())
    }
}
