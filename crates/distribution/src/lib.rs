//! Segment ownership distribution for consistent hashing.
//!
//! This crate decides which members own which segments:
//! - How many segments each member should own, given its capacity
//! - How owner lists are spread over sites, racks and machines
//! - How few ownership changes are needed when members come and go

mod balance;
pub mod factory;
pub mod quota;
pub mod spread;
pub mod stats;

pub use factory::{
    ConsistentHashFactory, DefaultConsistentHashFactory, FactoryKind, SyncConsistentHashFactory,
    TopologyAwareConsistentHashFactory,
};
pub use quota::Quota;
pub use spread::{Flat, Spread, SpreadPolicy, TopologyInfo};
pub use stats::{MemberLoad, OwnershipStatistics};
