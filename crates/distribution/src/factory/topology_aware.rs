//! Topology-aware consistent hash factory.
//!
//! Places the owners of a segment on different sites when possible, then on
//! different racks, then on different machines, so that a single failure
//! domain going down does not take out every copy.
//!
//! # Limitations
//!
//! Spread is best effort. When a fault domain does not have enough capacity
//! to hold one copy of every segment, quotas win and some segments end up
//! with several owners in the same domain.

use corelib::{capacity_vector, CapacityFactors, ConsistentHash, HashAlgorithm, Node, Result};

use crate::factory::default::update_members;
use crate::factory::{balance, check_params, owner_indices, ConsistentHashFactory};
use crate::spread::TopologyInfo;

/// Capacity-weighted factory that spreads owners across fault domains.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyAwareConsistentHashFactory;

impl ConsistentHashFactory for TopologyAwareConsistentHashFactory {
    fn create(
        &self,
        hash: HashAlgorithm,
        num_owners: usize,
        num_segments: usize,
        members: &[Node],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash> {
        check_params(num_owners, num_segments, members)?;
        let factors = capacity_vector(members, capacity_factors)?;
        balance(
            self.name(),
            &TopologyInfo::new(members),
            hash,
            num_owners,
            members.to_vec(),
            factors,
            vec![Vec::new(); num_segments],
        )
    }

    fn update_members(
        &self,
        base: &ConsistentHash,
        new_members: &[Node],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash> {
        update_members(self.name(), base, new_members, capacity_factors)
    }

    fn rebalance(&self, base: &ConsistentHash) -> Result<ConsistentHash> {
        balance(
            self.name(),
            &TopologyInfo::new(base.members()),
            base.hash_algorithm(),
            base.num_owners(),
            base.members().to_vec(),
            base.capacity_factor_list().to_vec(),
            owner_indices(base),
        )
    }

    fn name(&self) -> &'static str {
        "TopologyAwareConsistentHashFactory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{Location, NodeId};

    fn racked(id: u128, rack: &str) -> Node {
        Node::with_location(
            NodeId(id),
            format!("n{id}"),
            Location::new(Some("s1".to_string()), Some(rack.to_string()), Some(format!("m{id}"))),
        )
    }

    fn rack_of(ch: &ConsistentHash, id: &NodeId) -> Option<String> {
        ch.member(id).and_then(|m| m.location.rack.clone())
    }

    #[test]
    fn test_owners_on_different_racks() {
        let members = vec![racked(1, "a"), racked(2, "a"), racked(3, "b"), racked(4, "b")];
        let ch = TopologyAwareConsistentHashFactory
            .create(HashAlgorithm::Murmur3, 2, 32, &members, None)
            .unwrap();
        for s in 0..32 {
            let owners = ch.owners_of(s);
            assert_eq!(owners.len(), 2);
            assert_ne!(rack_of(&ch, &owners[0]), rack_of(&ch, &owners[1]), "segment {s}");
        }
    }

    #[test]
    fn test_unbalanced_racks_keep_quotas() {
        // Rack "a" has one member; giving it a copy of every segment would
        // double its share, so quotas take precedence.
        let members = vec![racked(1, "a"), racked(2, "b"), racked(3, "b"), racked(4, "b")];
        let ch = TopologyAwareConsistentHashFactory
            .create(HashAlgorithm::Murmur3, 2, 40, &members, None)
            .unwrap();
        for m in &members {
            assert_eq!(ch.primary_segments_count(&m.id), 10);
        }
        assert!(ch.owned_segments_count(&NodeId(1)) <= 20);
    }
}
