//! Consistent hash factory abstractions.
//!
//! A factory computes new [`ConsistentHash`] instances; it never mutates an
//! existing one. Different factories optimize for different goals:
//!
//! - **DefaultConsistentHashFactory**: capacity-weighted, minimal movement
//! - **TopologyAwareConsistentHashFactory**: also spreads owners across
//!   sites, racks and machines
//! - **SyncConsistentHashFactory**: output depends only on the member list,
//!   so every node computes the same table without coordination

pub mod default;
pub mod sync;
pub mod topology_aware;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use corelib::{CapacityFactors, ConsistentHash, Error, HashAlgorithm, Node, NodeId, Result};
use tracing::debug;

use crate::balance::Balancer;
use crate::spread::SpreadPolicy;

pub use default::DefaultConsistentHashFactory;
pub use sync::SyncConsistentHashFactory;
pub use topology_aware::TopologyAwareConsistentHashFactory;

/// Trait for consistent hash factories.
///
/// All operations are pure: they read immutable inputs and return a new
/// table, so they may run on any thread while readers keep using the
/// previous one.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as they may be
/// shared across threads.
pub trait ConsistentHashFactory: Send + Sync + 'static {
    /// Builds the first table for a cluster view.
    ///
    /// `capacity_factors` of `None` gives every member a factor of 1.0.
    fn create(
        &self,
        hash: HashAlgorithm,
        num_owners: usize,
        num_segments: usize,
        members: &[Node],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash>;

    /// Applies a membership change without rebalancing.
    ///
    /// Departed members are removed from every owner list; a segment left
    /// without owners gets one from `new_members`. Joiners are added to the
    /// member list only.
    fn update_members(
        &self,
        base: &ConsistentHash,
        new_members: &[Node],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash>;

    /// Moves the fewest owner assignments needed to bring every member back
    /// to its capacity-weighted share.
    ///
    /// Idempotent: rebalancing a balanced table returns an equal table.
    fn rebalance(&self, base: &ConsistentHash) -> Result<ConsistentHash>;

    /// Table that resolves to both the old and the new owners.
    fn union(&self, a: &ConsistentHash, b: &ConsistentHash) -> Result<ConsistentHash> {
        a.union(b)
    }

    /// Get the factory name (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// Closed set of factories, selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FactoryKind {
    #[default]
    Default,
    TopologyAware,
    Sync,
    TopologyAwareSync,
}

impl FactoryKind {
    pub fn build(self) -> Arc<dyn ConsistentHashFactory> {
        match self {
            FactoryKind::Default => Arc::new(DefaultConsistentHashFactory),
            FactoryKind::TopologyAware => Arc::new(TopologyAwareConsistentHashFactory),
            FactoryKind::Sync => Arc::new(SyncConsistentHashFactory::flat()),
            FactoryKind::TopologyAwareSync => Arc::new(SyncConsistentHashFactory::topology_aware()),
        }
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FactoryKind::Default => "default",
            FactoryKind::TopologyAware => "topology",
            FactoryKind::Sync => "sync",
            FactoryKind::TopologyAwareSync => "topology-sync",
        })
    }
}

impl FromStr for FactoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(FactoryKind::Default),
            "topology" => Ok(FactoryKind::TopologyAware),
            "sync" => Ok(FactoryKind::Sync),
            "topology-sync" => Ok(FactoryKind::TopologyAwareSync),
            other => Err(Error::InvalidConfiguration(format!("unknown factory '{other}'"))),
        }
    }
}

/// Owner lists of `ch` as member indices.
pub(crate) fn owner_indices(ch: &ConsistentHash) -> Vec<Vec<usize>> {
    (0..ch.num_segments())
        .map(|s| {
            ch.owners_of(s)
                .iter()
                .filter_map(|id| ch.member_position(id))
                .collect()
        })
        .collect()
}

/// Runs the balancing engine over `owners` and builds the resulting table.
pub(crate) fn balance(
    factory: &'static str,
    policy: &impl SpreadPolicy,
    hash: HashAlgorithm,
    num_owners: usize,
    members: Vec<Node>,
    capacity_factors: Vec<f32>,
    owners: Vec<Vec<usize>>,
) -> Result<ConsistentHash> {
    let num_segments = owners.len();
    let mut balancer = Balancer::new(policy, &capacity_factors, num_owners, owners);
    balancer.run();
    let moves = balancer.moves();

    let ids: Vec<NodeId> = members.iter().map(|m| m.id).collect();
    let segment_owners = balancer
        .into_owners()
        .into_iter()
        .map(|list| list.into_iter().map(|m| ids[m]).collect())
        .collect();

    metrics::counter!("distribution.rebalance.moves").increment(moves as u64);
    debug!(
        factory,
        members = members.len(),
        segments = num_segments,
        moves,
        "balanced segment owners"
    );

    ConsistentHash::from_parts(
        hash,
        num_owners,
        num_segments,
        members,
        capacity_factors,
        segment_owners,
    )
}

/// Validates the shape of a new table before any work is done.
pub(crate) fn check_params(num_owners: usize, num_segments: usize, members: &[Node]) -> Result<()> {
    if num_owners == 0 {
        return Err(Error::InvalidConfiguration(
            "the number of owners must be positive".into(),
        ));
    }
    if num_segments == 0 {
        return Err(Error::InvalidConfiguration(
            "the number of segments must be positive".into(),
        ));
    }
    if members.is_empty() {
        return Err(Error::InvalidConfiguration(
            "a consistent hash needs at least one member".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_kind_round_trip() {
        for kind in [
            FactoryKind::Default,
            FactoryKind::TopologyAware,
            FactoryKind::Sync,
            FactoryKind::TopologyAwareSync,
        ] {
            assert_eq!(kind.to_string().parse::<FactoryKind>().unwrap(), kind);
        }
        assert!("crush".parse::<FactoryKind>().is_err());
    }

    #[test]
    fn test_built_factory_names() {
        assert_eq!(FactoryKind::Default.build().name(), "DefaultConsistentHashFactory");
        assert_eq!(
            FactoryKind::TopologyAwareSync.build().name(),
            "TopologyAwareSyncConsistentHashFactory"
        );
    }
}
