//! Coordination-free consistent hash factory.
//!
//! Every operation is a pure function of the segment count, the owner
//! count, the member list (sorted internally), the capacity factors and the
//! member locations. Two nodes that see the same view compute byte-for-byte
//! the same table without exchanging messages, whatever order they received
//! the members in.
//!
//! # Algorithm
//!
//! 1. Sort members by id.
//! 2. Rank the eligible members of each segment by a rendezvous hash of
//!    `(member id, segment)` and pick owners greedily, preferring candidates
//!    that widen the fault-domain spread.
//! 3. Run the balancing engine to bring every member inside its quota.
//!
//! Rendezvous ranking keeps most segments in place when one member joins or
//! leaves, even though `rebalance` recomputes the table from scratch.

use std::cmp::Reverse;

use corelib::{capacity_vector, CapacityFactors, ConsistentHash, HashAlgorithm, Node, Result};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::factory::default::update_members;
use crate::factory::{balance, check_params, ConsistentHashFactory};
use crate::spread::{Flat, Spread, SpreadPolicy, TopologyInfo};

/// Fixed seed so that every node ranks members identically.
const RENDEZVOUS_SEED: u64 = 0x5e67_3e47_c0de_0001;

/// Factory whose output depends only on its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncConsistentHashFactory {
    topology_aware: bool,
}

impl SyncConsistentHashFactory {
    /// Ignores member locations.
    pub fn flat() -> Self {
        Self { topology_aware: false }
    }

    /// Spreads owners across sites, racks and machines.
    pub fn topology_aware() -> Self {
        Self { topology_aware: true }
    }

    pub fn is_topology_aware(&self) -> bool {
        self.topology_aware
    }

    fn compute(
        &self,
        hash: HashAlgorithm,
        num_owners: usize,
        num_segments: usize,
        members: Vec<Node>,
        factors: Vec<f32>,
    ) -> Result<ConsistentHash> {
        if self.topology_aware {
            let policy = TopologyInfo::new(&members);
            let owners = rendezvous_owners(&policy, &members, &factors, num_owners, num_segments);
            balance(self.name(), &policy, hash, num_owners, members, factors, owners)
        } else {
            let owners = rendezvous_owners(&Flat, &members, &factors, num_owners, num_segments);
            balance(self.name(), &Flat, hash, num_owners, members, factors, owners)
        }
    }
}

impl ConsistentHashFactory for SyncConsistentHashFactory {
    fn create(
        &self,
        hash: HashAlgorithm,
        num_owners: usize,
        num_segments: usize,
        members: &[Node],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash> {
        check_params(num_owners, num_segments, members)?;
        let sorted = sorted_members(members);
        let factors = capacity_vector(&sorted, capacity_factors)?;
        self.compute(hash, num_owners, num_segments, sorted, factors)
    }

    fn update_members(
        &self,
        base: &ConsistentHash,
        new_members: &[Node],
        capacity_factors: Option<&CapacityFactors>,
    ) -> Result<ConsistentHash> {
        update_members(self.name(), base, &sorted_members(new_members), capacity_factors)
    }

    /// Recomputes the table from the member list alone; the current owners
    /// of `base` are not consulted.
    fn rebalance(&self, base: &ConsistentHash) -> Result<ConsistentHash> {
        let sorted = sorted_members(base.members());
        let factors = sorted
            .iter()
            .map(|m| base.capacity_factor(&m.id).unwrap_or(0.0))
            .collect();
        self.compute(
            base.hash_algorithm(),
            base.num_owners(),
            base.num_segments(),
            sorted,
            factors,
        )
    }

    fn name(&self) -> &'static str {
        if self.topology_aware {
            "TopologyAwareSyncConsistentHashFactory"
        } else {
            "SyncConsistentHashFactory"
        }
    }
}

fn sorted_members(members: &[Node]) -> Vec<Node> {
    let mut sorted = members.to_vec();
    sorted.sort_by_key(|m| m.id);
    sorted
}

/// Rendezvous weight of `member` for `segment`.
fn rendezvous_score(member: &Node, segment: usize) -> u64 {
    let mut buf = [0u8; 24];
    buf[..16].copy_from_slice(&member.id.0.to_le_bytes());
    buf[16..].copy_from_slice(&(segment as u64).to_le_bytes());
    xxh3_64_with_seed(&buf, RENDEZVOUS_SEED)
}

/// Initial owner lists: highest rendezvous score first, with candidates that
/// widen the spread taking precedence.
fn rendezvous_owners<P: SpreadPolicy>(
    policy: &P,
    members: &[Node],
    factors: &[f32],
    num_owners: usize,
    num_segments: usize,
) -> Vec<Vec<usize>> {
    let eligible: Vec<usize> = (0..members.len()).filter(|&i| factors[i] > 0.0).collect();
    let k = num_owners.min(eligible.len());
    let domains = policy.spread(&eligible);

    (0..num_segments)
        .map(|segment| {
            let mut ranked: Vec<(u64, usize)> = eligible
                .iter()
                .map(|&i| (rendezvous_score(&members[i], segment), i))
                .collect();
            ranked.sort_by_key(|&(score, i)| (Reverse(score), i));

            let mut owners: Vec<usize> = Vec::with_capacity(k);
            let mut scratch: Vec<usize> = Vec::with_capacity(k);
            while owners.len() < k {
                let widest = widened(policy.spread(&owners), domains);
                let mut best: Option<(usize, Spread)> = None;
                for &(_, candidate) in &ranked {
                    if owners.contains(&candidate) {
                        continue;
                    }
                    scratch.clear();
                    scratch.extend_from_slice(&owners);
                    scratch.push(candidate);
                    let spread = policy.spread(&scratch);
                    // Ranked order breaks ties, so only a wider spread wins.
                    if best.as_ref().map_or(true, |(_, s)| spread > *s) {
                        best = Some((candidate, spread));
                    }
                    // Nobody further down can beat this one.
                    if !P::LOCATION_AWARE || spread == widest {
                        break;
                    }
                }
                match best {
                    Some((candidate, _)) => owners.push(candidate),
                    None => break,
                }
            }
            owners
        })
        .collect()
}

/// Widest spread one more owner could give a list spread as `spread`, when
/// the eligible members cover `domains`.
fn widened(spread: Spread, domains: Spread) -> Spread {
    Spread {
        sites: (spread.sites + 1).min(domains.sites),
        racks: (spread.racks + 1).min(domains.racks),
        machines: (spread.machines + 1).min(domains.machines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{Location, NodeId};

    fn nodes(ids: &[u128]) -> Vec<Node> {
        ids.iter().map(|&i| Node::new(NodeId(i), format!("n{i}"))).collect()
    }

    #[test]
    fn test_member_order_does_not_matter() {
        let factory = SyncConsistentHashFactory::flat();
        let a = factory
            .create(HashAlgorithm::Murmur3, 2, 64, &nodes(&[3, 1, 2, 5]), None)
            .unwrap();
        let b = factory
            .create(HashAlgorithm::Murmur3, 2, 64, &nodes(&[5, 2, 1, 3]), None)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_rebalance_ignores_current_owners() {
        let factory = SyncConsistentHashFactory::flat();
        let members = nodes(&[1, 2, 3]);
        let created = factory
            .create(HashAlgorithm::Murmur3, 2, 30, &members, None)
            .unwrap();
        let pending = factory.update_members(&created, &nodes(&[1, 2]), None).unwrap();
        let rebalanced = factory.rebalance(&pending).unwrap();
        let fresh = factory
            .create(HashAlgorithm::Murmur3, 2, 30, &nodes(&[1, 2]), None)
            .unwrap();
        assert_eq!(rebalanced, fresh);
    }

    #[test]
    fn test_topology_aware_ranking_uses_distinct_racks() {
        let members: Vec<Node> = (0..21u128)
            .map(|i| {
                Node::with_location(
                    NodeId(i + 1),
                    format!("n{i}"),
                    Location::new(
                        Some("s1".to_string()),
                        Some(format!("r{}", i % 7)),
                        Some(format!("m{i}")),
                    ),
                )
            })
            .collect();
        let policy = TopologyInfo::new(&members);
        let owners = rendezvous_owners(&policy, &members, &[1.0; 21], 3, 256);
        for list in &owners {
            assert_eq!(list.len(), 3);
            assert_eq!(policy.spread(list).racks, 3, "{list:?}");
        }

        // Highest score wins whenever it widens the spread as much as possible.
        let flat = rendezvous_owners(&Flat, &members, &[1.0; 21], 1, 256);
        for (list, first) in owners.iter().zip(&flat) {
            assert_eq!(list[0], first[0]);
        }
    }

    #[test]
    fn test_rendezvous_is_stable_for_survivors() {
        let members = nodes(&[1, 2, 3, 4]);
        let before = rendezvous_owners(&Flat, &members, &[1.0; 4], 1, 200);
        // Zero capacity for the last member is the same as it leaving.
        let after = rendezvous_owners(&Flat, &members, &[1.0, 1.0, 1.0, 0.0], 1, 200);
        for (b, a) in before.iter().zip(&after) {
            if b[0] != 3 {
                assert_eq!(a, b);
            }
        }
    }
}
