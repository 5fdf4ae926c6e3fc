use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::backend::ChainBackend;
use crate::error::{BridgeError, Result};
use crate::types::Version;

const UNKNOWN: u8 = 0;
const SUPPORTED: u8 = 1;
const UNSUPPORTED: u8 = 2;

/// Decides once whether the backend serves header-only queries.
///
/// The answer is memoized for the detector's lifetime. Concurrent first
/// calls may each query the backend; the first result stored wins and the
/// flag never changes afterwards.
pub struct CapabilityDetector<B> {
    backend: Arc<B>,
    min_version: Version,
    header_query: AtomicU8,
}

impl<B: ChainBackend> CapabilityDetector<B> {
    pub fn new(backend: Arc<B>, min_version: Version) -> Self {
        Self {
            backend,
            min_version,
            header_query: AtomicU8::new(UNKNOWN),
        }
    }

    /// Returns the memoized answer, or `None` before the first successful
    /// check.
    pub fn cached(&self) -> Option<bool> {
        match self.header_query.load(Ordering::Acquire) {
            SUPPORTED => Some(true),
            UNSUPPORTED => Some(false),
            _ => None,
        }
    }

    /// Failure to fetch the backend version is an error, not a negative
    /// answer, and leaves the flag unresolved.
    pub async fn is_header_query_supported(&self) -> Result<bool> {
        if let Some(supported) = self.cached() {
            return Ok(supported);
        }

        let version = self
            .backend
            .get_version()
            .await
            .map_err(|e| BridgeError::backend("unable to retrieve backend version", e))?;

        let supported = version.is_at_least(&self.min_version);
        let state = if supported { SUPPORTED } else { UNSUPPORTED };

        match self.header_query.compare_exchange(
            UNKNOWN,
            state,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                info!(
                    "Backend version {} {} header queries (minimum {})",
                    version,
                    if supported { "supports" } else { "does not support" },
                    self.min_version
                );
                Ok(supported)
            }
            Err(stored) => Ok(stored == SUPPORTED),
        }
    }
}
