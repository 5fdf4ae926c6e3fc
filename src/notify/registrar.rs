use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::ChainBackend;
use crate::error::{BridgeError, Result};
use crate::types::ConfirmationRequest;

use super::{CancelGuard, ConfirmationEvent, ErrorStream, Subscription};

/// Opens confirmation and block epoch subscriptions on the backend, each
/// with its own cancel handle.
pub struct ConfirmationRegistrar<B> {
    backend: Arc<B>,
}

impl<B: ChainBackend> ConfirmationRegistrar<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn register_confirmations(
        &self,
        request: ConfirmationRequest,
    ) -> Result<(ConfirmationEvent, ErrorStream)> {
        let guard = CancelGuard::new();
        let txid = request.txid;
        let num_confs = request.num_confs;
        let height_hint = request.height_hint;

        // Dropping this future before the backend answers cancels the
        // registration through the guard.
        let feed = self
            .backend
            .register_confirmations(request, guard.handle())
            .await
            .map_err(|e| BridgeError::backend("unable to register for conf", e))?;
        let cancel = guard.disarm();

        info!(
            "Registered for confirmation of {} (num_confs={}, height_hint={})",
            txid, num_confs, height_hint
        );

        let errors = Subscription::new(feed.errors, cancel.clone());
        Ok((ConfirmationEvent::new(feed.items, cancel), errors))
    }

    pub async fn register_block_epochs(&self) -> Result<(Subscription<u32>, ErrorStream)> {
        let guard = CancelGuard::new();

        let feed = self
            .backend
            .register_block_epochs(guard.handle())
            .await
            .map_err(|e| BridgeError::backend("unable to register for block epochs", e))?;
        let cancel = guard.disarm();

        debug!("Registered for block epoch notifications");

        let errors = Subscription::new(feed.errors, cancel.clone());
        Ok((Subscription::new(feed.items, cancel), errors))
    }
}
