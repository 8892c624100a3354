//! Default consistent hash factory.
//!
//! Assigns owners in proportion to capacity, ignoring member locations.
//!
//! # Algorithm
//!
//! - `create` balances an empty table: every segment is filled from
//!   scratch by the balancing engine.
//! - `update_members` only touches segments whose owners left.
//! - `rebalance` runs the balancing engine over the existing table, so only
//!   the assignments needed to restore the quotas move.
//!
//! # Performance
//!
//! - **create / rebalance**: O(S · k · M) for filling, plus O(S) per
//!   transfer while balancing (S = segments, k = owners, M = members)
//! - **update_members**: O(S · k + M)

use std::collections::HashMap;

use corelib::{capacity_vector, CapacityFactors, ConsistentHash, HashAlgorithm, Node, Result};
use tracing::{debug, warn};

use crate::factory::{balance, check_params, owner_indices, ConsistentHashFactory};
use crate::spread::Flat;

/// Capacity-weighted factory without topology awareness.
///
/// Output is deterministic for a given input, but depends on the previous
/// table, so it is meant to run on a single coordinator that broadcasts the
/// result.
///
/// # Example
///
/// ```rust
/// use corelib::{HashAlgorithm, Node, NodeId};
/// use distribution::{ConsistentHashFactory, DefaultConsistentHashFactory};
///
/// let members = vec![Node::new(NodeId(1), "a"), Node::new(NodeId(2), "b")];
/// let ch = DefaultConsistentHashFactory
///     .create(HashAlgorithm::Murmur3, 2, 4, &members, None)
///     .unwrap();
/// assert_eq!(ch.owners_of(0).len(), 2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConsistentHashFactory;

impl ConsistentHashFactory for DefaultConsistentHashFactory {
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
            &Flat,
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
            &Flat,
            base.hash_algorithm(),
            base.num_owners(),
            base.members().to_vec(),
            base.capacity_factor_list().to_vec(),
            owner_indices(base),
        )
    }

    fn name(&self) -> &'static str {
        "DefaultConsistentHashFactory"
    }
}

/// Membership update shared by every factory.
///
/// Keeps the surviving owners of each segment in their current order,
/// dropping those whose capacity is now zero. A segment left without owners
/// gets the eligible new member with the fewest primaries relative to its
/// capacity (ties go to the earlier member).
pub(crate) fn update_members(
    factory: &'static str,
    base: &ConsistentHash,
    new_members: &[Node],
    capacity_factors: Option<&CapacityFactors>,
) -> Result<ConsistentHash> {
    check_params(base.num_owners(), base.num_segments(), new_members)?;
    let factors = capacity_vector(new_members, capacity_factors)?;
    let position: HashMap<_, _> = new_members
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id, i))
        .collect();

    let mut primaries = vec![0usize; new_members.len()];
    let mut segment_owners: Vec<Vec<_>> = (0..base.num_segments())
        .map(|s| {
            let owners: Vec<_> = base
                .owners_of(s)
                .iter()
                .copied()
                .filter(|id| position.get(id).is_some_and(|&i| factors[i] > 0.0))
                .collect();
            if let Some(p) = owners.first() {
                primaries[position[p]] += 1;
            }
            owners
        })
        .collect();

    let mut orphaned = 0usize;
    for owners in segment_owners.iter_mut().filter(|o| o.is_empty()) {
        let fallback = (0..new_members.len())
            .filter(|&i| factors[i] > 0.0)
            .min_by(|&a, &b| {
                let load = |i: usize| primaries[i] as f64 / f64::from(factors[i]);
                load(a).total_cmp(&load(b)).then(a.cmp(&b))
            });
        let Some(i) = fallback else {
            break;
        };
        owners.push(new_members[i].id);
        primaries[i] += 1;
        orphaned += 1;
    }

    let left = base
        .members()
        .iter()
        .filter(|m| !position.contains_key(&m.id))
        .count();
    let joined = new_members
        .iter()
        .filter(|m| !base.is_member(&m.id))
        .count();
    if orphaned > 0 {
        metrics::counter!("distribution.segments.orphaned").increment(orphaned as u64);
        warn!(factory, orphaned, "segments lost all owners, assigned temporary owners");
    }
    debug!(factory, joined, left, "updated consistent hash members");

    ConsistentHash::from_parts(
        base.hash_algorithm(),
        base.num_owners(),
        base.num_segments(),
        new_members.to_vec(),
        factors,
        segment_owners,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::NodeId;

    fn nodes(ids: &[u128]) -> Vec<Node> {
        ids.iter().map(|&i| Node::new(NodeId(i), format!("n{i}"))).collect()
    }

    #[test]
    fn test_create_two_members() {
        let ch = DefaultConsistentHashFactory
            .create(HashAlgorithm::Murmur3, 2, 4, &nodes(&[1, 2]), None)
            .unwrap();
        for s in 0..4 {
            let owners = ch.owners_of(s);
            assert!(owners == [NodeId(1), NodeId(2)] || owners == [NodeId(2), NodeId(1)]);
        }
        assert_eq!(ch.primary_segments_count(&NodeId(1)), 2);
        assert_eq!(ch.primary_segments_count(&NodeId(2)), 2);
    }

    #[test]
    fn test_leaver_removed_and_joiner_not_assigned() {
        let factory = DefaultConsistentHashFactory;
        let ch = factory
            .create(HashAlgorithm::Murmur3, 2, 8, &nodes(&[1, 2, 3]), None)
            .unwrap();
        let pending = factory.update_members(&ch, &nodes(&[1, 2, 4]), None).unwrap();

        for s in 0..8 {
            assert!(!pending.owners_of(s).contains(&NodeId(3)));
            assert!(!pending.owners_of(s).contains(&NodeId(4)));
            assert!(!pending.owners_of(s).is_empty());
        }
        assert!(pending.is_member(&NodeId(4)));
        assert!(!pending.is_member(&NodeId(3)));
    }

    #[test]
    fn test_orphaned_segment_gets_temporary_owner() {
        let factory = DefaultConsistentHashFactory;
        let ch = factory
            .create(HashAlgorithm::Murmur3, 1, 6, &nodes(&[1, 2]), None)
            .unwrap();
        let pending = factory.update_members(&ch, &nodes(&[2, 3]), None).unwrap();
        for s in 0..6 {
            assert_eq!(pending.owners_of(s).len(), 1);
        }
        // Every segment that lost member 1 goes to the joiner, which has
        // no primaries yet.
        assert_eq!(pending.primary_segments_count(&NodeId(2)), 3);
        assert_eq!(pending.primary_segments_count(&NodeId(3)), 3);
    }

    #[test]
    fn test_update_requires_members() {
        let factory = DefaultConsistentHashFactory;
        let ch = factory
            .create(HashAlgorithm::Murmur3, 1, 2, &nodes(&[1]), None)
            .unwrap();
        assert!(factory.update_members(&ch, &[], None).is_err());
    }
}
