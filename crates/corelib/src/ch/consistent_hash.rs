//! Immutable segment ownership table.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::ch::segment::{Segment, SegmentSpace};
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use crate::node::{CapacityFactors, Node, NodeId, DEFAULT_CAPACITY_FACTOR};

/// Segment ownership for one generation of the cluster.
///
/// A `ConsistentHash` is never modified after construction. Membership
/// changes and rebalancing produce new instances, so a snapshot can be
/// shared by any number of readers (typically behind an `Arc`) while the
/// next one is being computed.
///
/// # Invariants
///
/// - every segment in `[0, num_segments)` has an owner list (possibly empty)
/// - owner lists only reference members and never contain duplicates
/// - the first owner of a non-empty list is the primary owner
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsistentHash {
    space: SegmentSpace,
    num_owners: usize,
    members: Vec<Node>,
    /// Parallel to `members`.
    capacity_factors: Vec<f32>,
    segment_owners: Vec<Vec<NodeId>>,
    #[serde(skip)]
    member_index: HashMap<NodeId, usize>,
}

/// Resolves optional capacity factors into a vector parallel to `members`.
///
/// `None` gives every member [`DEFAULT_CAPACITY_FACTOR`]. A supplied map must
/// cover every member with a finite, non-negative factor.
pub fn capacity_vector(members: &[Node], factors: Option<&CapacityFactors>) -> Result<Vec<f32>> {
    let Some(factors) = factors else {
        return Ok(vec![DEFAULT_CAPACITY_FACTOR; members.len()]);
    };
    members
        .iter()
        .map(|m| {
            factors.get(&m.id).copied().ok_or_else(|| {
                Error::invalid(format!("no capacity factor for member {}", m.name))
            })
        })
        .collect()
}

impl ConsistentHash {
    /// Builds a consistent hash from an explicit ownership table.
    ///
    /// Fails with [`Error::InvalidConfiguration`] when the segment or owner
    /// count is zero, the member list is empty or has duplicates, a capacity
    /// factor is missing or invalid, or an owner list references an unknown
    /// member or repeats one.
    pub fn new(
        hash: HashAlgorithm,
        num_owners: usize,
        num_segments: usize,
        members: Vec<Node>,
        capacity_factors: Option<&CapacityFactors>,
        segment_owners: Vec<Vec<NodeId>>,
    ) -> Result<Self> {
        let factors = capacity_vector(&members, capacity_factors)?;
        Self::from_parts(hash, num_owners, num_segments, members, factors, segment_owners)
    }

    /// Like [`ConsistentHash::new`], with capacity factors given in member order.
    pub fn from_parts(
        hash: HashAlgorithm,
        num_owners: usize,
        num_segments: usize,
        members: Vec<Node>,
        capacity_factors: Vec<f32>,
        segment_owners: Vec<Vec<NodeId>>,
    ) -> Result<Self> {
        let space = SegmentSpace::new(hash, num_segments)?;
        if num_owners == 0 {
            return Err(Error::invalid("the number of owners must be positive"));
        }
        if members.is_empty() {
            return Err(Error::invalid("a consistent hash needs at least one member"));
        }
        if capacity_factors.len() != members.len() {
            return Err(Error::invalid(format!(
                "expected {} capacity factors, got {}",
                members.len(),
                capacity_factors.len()
            )));
        }

        let mut member_index = HashMap::with_capacity(members.len());
        for (i, (member, factor)) in members.iter().zip(&capacity_factors).enumerate() {
            if member_index.insert(member.id, i).is_some() {
                return Err(Error::invalid(format!("duplicate member {}", member.name)));
            }
            if !factor.is_finite() || *factor < 0.0 {
                return Err(Error::invalid(format!(
                    "capacity factor of {} must be a non-negative number, got {factor}",
                    member.name
                )));
            }
        }

        if segment_owners.len() != num_segments {
            return Err(Error::invalid(format!(
                "expected owner lists for {num_segments} segments, got {}",
                segment_owners.len()
            )));
        }
        let mut seen = HashSet::new();
        for (segment, owners) in segment_owners.iter().enumerate() {
            seen.clear();
            for owner in owners {
                if !member_index.contains_key(owner) {
                    return Err(Error::invalid(format!(
                        "segment {segment} is owned by {owner}, which is not a member"
                    )));
                }
                if !seen.insert(*owner) {
                    return Err(Error::invalid(format!(
                        "segment {segment} lists owner {owner} more than once"
                    )));
                }
            }
        }

        Ok(Self {
            space,
            num_owners,
            members,
            capacity_factors,
            segment_owners,
            member_index,
        })
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.space.num_segments()
    }

    /// Desired replication factor; actual owner lists may be shorter.
    #[inline]
    pub fn num_owners(&self) -> usize {
        self.num_owners
    }

    #[inline]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.space.hash_algorithm()
    }

    #[inline]
    pub fn segment_space(&self) -> SegmentSpace {
        self.space
    }

    /// Members in view order.
    pub fn members(&self) -> &[Node] {
        &self.members
    }

    pub fn member(&self, id: &NodeId) -> Option<&Node> {
        self.member_index.get(id).map(|&i| &self.members[i])
    }

    pub fn is_member(&self, id: &NodeId) -> bool {
        self.member_index.contains_key(id)
    }

    /// Position of `id` in [`ConsistentHash::members`].
    pub fn member_position(&self, id: &NodeId) -> Option<usize> {
        self.member_index.get(id).copied()
    }

    pub fn capacity_factor(&self, id: &NodeId) -> Option<f32> {
        self.member_index.get(id).map(|&i| self.capacity_factors[i])
    }

    /// Capacity factors in member order.
    pub fn capacity_factor_list(&self) -> &[f32] {
        &self.capacity_factors
    }

    pub fn capacity_factors(&self) -> CapacityFactors {
        self.members
            .iter()
            .zip(&self.capacity_factors)
            .map(|(m, f)| (m.id, *f))
            .collect()
    }

    /// Ordered owners of `segment`, primary first.
    ///
    /// Empty when nobody can hold data, or when `segment` is out of range.
    #[inline]
    pub fn owners_of(&self, segment: Segment) -> &[NodeId] {
        self.segment_owners
            .get(segment)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn primary_owner(&self, segment: Segment) -> Option<NodeId> {
        self.owners_of(segment).first().copied()
    }

    #[inline]
    pub fn segment_of(&self, key: &[u8]) -> Segment {
        self.space.segment_of(key)
    }

    pub fn locate_owners(&self, key: &[u8]) -> &[NodeId] {
        self.owners_of(self.segment_of(key))
    }

    pub fn locate_primary_owner(&self, key: &[u8]) -> Option<NodeId> {
        self.primary_owner(self.segment_of(key))
    }

    pub fn is_segment_local_to(&self, member: &NodeId, segment: Segment) -> bool {
        self.owners_of(segment).contains(member)
    }

    pub fn is_key_local_to(&self, member: &NodeId, key: &[u8]) -> bool {
        self.is_segment_local_to(member, self.segment_of(key))
    }

    /// Number of segments for which `member` is the primary owner.
    pub fn primary_segments_count(&self, member: &NodeId) -> usize {
        self.segment_owners
            .iter()
            .filter(|owners| owners.first() == Some(member))
            .count()
    }

    /// Number of segments `member` owns, as primary or backup.
    pub fn owned_segments_count(&self, member: &NodeId) -> usize {
        self.segment_owners
            .iter()
            .filter(|owners| owners.contains(member))
            .count()
    }

    /// Segments owned by `member`, ascending.
    pub fn segments_for_owner(&self, member: &NodeId) -> Vec<Segment> {
        self.segment_owners
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.contains(member))
            .map(|(s, _)| s)
            .collect()
    }

    pub fn primary_segments_for_owner(&self, member: &NodeId) -> Vec<Segment> {
        self.segment_owners
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.first() == Some(member))
            .map(|(s, _)| s)
            .collect()
    }

    /// Merges the ownership of `self` and `other`.
    ///
    /// Used while data migrates from one mapping to the next: each owner list
    /// is the order-preserving union of both lists, so a lookup finds the data
    /// at either the old or the new location.
    pub fn union(&self, other: &ConsistentHash) -> Result<ConsistentHash> {
        if self.space != other.space {
            return Err(Error::invalid(format!(
                "cannot union consistent hashes with different segment spaces ({:?} vs {:?})",
                self.space, other.space
            )));
        }

        let mut members = self.members.clone();
        let mut factors = self.capacity_factors.clone();
        for (member, factor) in other.members.iter().zip(&other.capacity_factors) {
            if !self.is_member(&member.id) {
                members.push(member.clone());
                factors.push(*factor);
            }
        }

        let segment_owners = self
            .segment_owners
            .iter()
            .zip(&other.segment_owners)
            .map(|(mine, theirs)| {
                let mut owners = mine.clone();
                for owner in theirs {
                    if !owners.contains(owner) {
                        owners.push(*owner);
                    }
                }
                owners
            })
            .collect();

        Self::from_parts(
            self.hash_algorithm(),
            self.num_owners.max(other.num_owners),
            self.num_segments(),
            members,
            factors,
            segment_owners,
        )
    }

    /// BLAKE3 digest of the serialized table, as hex.
    ///
    /// Two nodes that computed the same mapping independently produce the same
    /// fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        bincode::serialize_into(&mut hasher, self)
            .map_err(|e| Error::invalid(format!("cannot encode consistent hash: {e}")))?;
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// One line per segment: `segment: owner, owner, ...`.
    pub fn routing_table(&self) -> String {
        let mut out = String::new();
        for (segment, owners) in self.segment_owners.iter().enumerate() {
            let names: Vec<&str> = owners
                .iter()
                .filter_map(|id| self.member(id))
                .map(|m| m.name.as_str())
                .collect();
            let _ = writeln!(out, "{segment:>5}: {}", names.join(", "));
        }
        out
    }
}

impl fmt::Display for ConsistentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConsistentHash(hash={}, segments={}, owners={}, members=[",
            self.hash_algorithm(),
            self.num_segments(),
            self.num_owners
        )?;
        for (i, (m, cf)) in self.members.iter().zip(&self.capacity_factors).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", m.name, cf)?;
        }
        f.write_str("])")
    }
}
