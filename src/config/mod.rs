use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TIMESTAMP_CAPACITY;
use crate::error::{BridgeError, Result};
use crate::types::Version;

/// Environment variable prefix, e.g. `CHAINBRIDGE__CACHE__TIMESTAMP_CAPACITY`.
pub const ENV_PREFIX: &str = "CHAINBRIDGE";

/// First backend release that serves header-only queries.
pub const HEADER_QUERY_MIN_VERSION: Version = Version::new(0, 17, 1);

/// Label attached to transactions published through the bridge.
pub const DEFAULT_PUBLISH_LABEL: &str = "asset-minting";

/// Chain bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub cache: CacheConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub timestamp_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub header_query_min_version: Version,
    pub publish_label: String,
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.timestamp_capacity == 0 {
            return Err(BridgeError::config("Timestamp cache capacity must be > 0"));
        }

        if self.backend.publish_label.trim().is_empty() {
            return Err(BridgeError::config("Publish label must not be empty"));
        }

        Ok(())
    }

    /// Load configuration from defaults, an optional file and `CHAINBRIDGE__*`
    /// environment variables, later sources overriding earlier ones.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Like [`BridgeConfig::load`] without a file, after reading a `.env`
    /// file from the working directory if one exists.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load(None)
    }

    pub fn with_timestamp_capacity(mut self, capacity: usize) -> Self {
        self.cache.timestamp_capacity = capacity;
        self
    }

    pub fn with_header_query_min_version(mut self, version: Version) -> Self {
        self.backend.header_query_min_version = version;
        self
    }

    pub fn with_publish_label(mut self, label: impl Into<String>) -> Self {
        self.backend.publish_label = label.into();
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                timestamp_capacity: DEFAULT_TIMESTAMP_CAPACITY,
            },
            backend: BackendConfig {
                header_query_min_version: HEADER_QUERY_MIN_VERSION,
                publish_label: DEFAULT_PUBLISH_LABEL.to_string(),
            },
        }
    }
}
