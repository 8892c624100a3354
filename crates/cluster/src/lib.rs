//! Cache topology management on top of segment placement.
//!
//! This crate connects placement to running caches:
//! - Publishing cache topologies atomically to lock-free readers
//! - Coordinating membership changes and rebalances
//! - The storage layer, cache registry and replicated lifecycle commands

pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod store;
pub mod topology;

pub use cache::{Cache, CacheManager, ComponentStatus, ManagementRegistration};
pub use command::{RemoveCacheCommand, ReplicableCommand};
pub use config::{CacheConfig, ClusteringConfig, StoreConfig, StoreOptions};
pub use error::{ClusterError, Result, StoreError};
pub use store::{MemoryStore, PersistenceManager, Store, StoreBackend};
pub use topology::{
    CacheTopology, MembershipView, RebalancePolicy, TopologyCoordinator, TopologyHolder,
};
