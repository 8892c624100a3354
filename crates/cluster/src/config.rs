//! Cache configuration.
//!
//! A flat set of serde structs read from JSON. Option groups are composed
//! rather than layered: a store configuration embeds its generic
//! [`StoreOptions`] next to the backend selection.
//!
//! ```json
//! {
//!   "clustering": { "num_owners": 2, "num_segments": 256, "hash": "murmur3" },
//!   "store": { "backend": "memory", "options": { "clear_threshold": 10000 } }
//! }
//! ```

use std::path::Path;

use corelib::HashAlgorithm;
use distribution::FactoryKind;
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};
use crate::store::StoreBackend;

pub const DEFAULT_NUM_OWNERS: usize = 2;
pub const DEFAULT_NUM_SEGMENTS: usize = 256;
pub const DEFAULT_CLEAR_THRESHOLD: usize = 10_000;
pub const DEFAULT_EXPIRY_BATCH: usize = 10_000;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub clustering: ClusteringConfig,
    pub store: Option<StoreConfig>,
}

impl CacheConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.clustering.validate()?;
        if let Some(store) = &self.store {
            store.options.validate()?;
        }
        Ok(())
    }
}

/// Placement parameters of a cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub num_owners: usize,
    pub num_segments: usize,
    pub hash: HashAlgorithm,
    /// Capacity factor this node announces when it joins.
    pub capacity_factor: f32,
    /// One of `default`, `topology`, `sync` or `topology-sync`.
    pub factory: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            num_owners: DEFAULT_NUM_OWNERS,
            num_segments: DEFAULT_NUM_SEGMENTS,
            hash: HashAlgorithm::default(),
            capacity_factor: corelib::DEFAULT_CAPACITY_FACTOR,
            factory: FactoryKind::default().to_string(),
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_owners == 0 {
            return Err(ClusterError::InvalidConfig("num_owners must be positive".into()));
        }
        if self.num_segments == 0 || self.num_segments > u32::MAX as usize {
            return Err(ClusterError::InvalidConfig(format!(
                "num_segments must be in 1..={}, got {}",
                u32::MAX,
                self.num_segments
            )));
        }
        if !self.capacity_factor.is_finite() || self.capacity_factor < 0.0 {
            return Err(ClusterError::InvalidConfig(format!(
                "capacity_factor must be a non-negative number, got {}",
                self.capacity_factor
            )));
        }
        self.factory_kind()?;
        Ok(())
    }

    pub fn factory_kind(&self) -> Result<FactoryKind> {
        self.factory
            .parse()
            .map_err(|e: corelib::Error| ClusterError::InvalidConfig(e.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub options: StoreOptions,
}

/// Options shared by every store backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Clear the store when the cache starts.
    pub purge_on_startup: bool,
    /// Above this many entries, `clear` drops the whole store at once
    /// instead of removing entries one by one.
    pub clear_threshold: usize,
    /// Maximum number of expired entries removed per sweep.
    pub expiry_batch: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            purge_on_startup: false,
            clear_threshold: DEFAULT_CLEAR_THRESHOLD,
            expiry_batch: DEFAULT_EXPIRY_BATCH,
        }
    }
}

impl StoreOptions {
    pub fn validate(&self) -> Result<()> {
        if self.expiry_batch == 0 {
            return Err(ClusterError::InvalidConfig("expiry_batch must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = CacheConfig::from_json("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.clustering.num_owners, 2);
        assert_eq!(config.clustering.num_segments, 256);
        assert_eq!(config.clustering.hash, HashAlgorithm::Murmur3);
        assert!(config.store.is_none());
    }

    #[test]
    fn test_nested_store_options() {
        let config = CacheConfig::from_json(
            r#"{
                "clustering": { "num_owners": 3, "hash": "xxh3", "factory": "topology" },
                "store": { "backend": "memory", "options": { "purge_on_startup": true } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.clustering.num_owners, 3);
        assert_eq!(config.clustering.factory_kind().unwrap(), FactoryKind::TopologyAware);
        let store = config.store.unwrap();
        assert_eq!(store.backend, StoreBackend::Memory);
        assert!(store.options.purge_on_startup);
        assert_eq!(store.options.clear_threshold, DEFAULT_CLEAR_THRESHOLD);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CacheConfig::from_json(r#"{ "clustering": { "num_segments": 0 } }"#),
            Err(ClusterError::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::from_json(r#"{ "clustering": { "factory": "ketama" } }"#),
            Err(ClusterError::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::from_json(r#"{ "clustering": { "num_owners": "two" } }"#),
            Err(ClusterError::Config(_))
        ));
    }
}
