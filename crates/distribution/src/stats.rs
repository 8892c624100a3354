//! Per-member ownership statistics of a table.

use std::fmt;

use corelib::{ConsistentHash, NodeId};

use crate::quota::{effective_owners, owned_quotas, primary_quotas, Quota};

/// Segments one member owns compared to its fair share.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberLoad {
    pub id: NodeId,
    pub name: String,
    pub capacity_factor: f32,
    pub primary: usize,
    pub owned: usize,
    pub primary_quota: Quota,
    pub owned_quota: Quota,
}

impl MemberLoad {
    pub fn is_primary_balanced(&self) -> bool {
        self.primary_quota.contains(self.primary)
    }

    pub fn is_owned_balanced(&self) -> bool {
        self.owned_quota.contains(self.owned)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OwnershipStatistics {
    pub num_segments: usize,
    pub num_owners: usize,
    pub members: Vec<MemberLoad>,
}

impl OwnershipStatistics {
    pub fn from_ch(ch: &ConsistentHash) -> Self {
        let capacities = ch.capacity_factor_list();
        let k = effective_owners(ch.num_owners(), capacities);
        let primary_quota = primary_quotas(ch.num_segments(), capacities);
        let owned_quota = owned_quotas(ch.num_segments(), k, capacities);

        let members = ch
            .members()
            .iter()
            .enumerate()
            .map(|(i, node)| MemberLoad {
                id: node.id,
                name: node.name.clone(),
                capacity_factor: capacities[i],
                primary: ch.primary_segments_count(&node.id),
                owned: ch.owned_segments_count(&node.id),
                primary_quota: primary_quota[i],
                owned_quota: owned_quota[i],
            })
            .collect();

        OwnershipStatistics {
            num_segments: ch.num_segments(),
            num_owners: ch.num_owners(),
            members,
        }
    }

    /// Every member is inside its primary window.
    pub fn is_primary_balanced(&self) -> bool {
        self.members.iter().all(MemberLoad::is_primary_balanced)
    }

    pub fn is_owned_balanced(&self) -> bool {
        self.members.iter().all(MemberLoad::is_owned_balanced)
    }

    /// Largest distance between a member's primary count and its fair share.
    pub fn max_primary_deviation(&self) -> f64 {
        self.members
            .iter()
            .map(|m| (m.primary as f64 - m.primary_quota.exact).abs())
            .fold(0.0, f64::max)
    }

    pub fn max_owned_deviation(&self) -> f64 {
        self.members
            .iter()
            .map(|m| (m.owned as f64 - m.owned_quota.exact).abs())
            .fold(0.0, f64::max)
    }
}

impl fmt::Display for OwnershipStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} segments, {} owners, {} members",
            self.num_segments,
            self.num_owners,
            self.members.len()
        )?;
        for m in &self.members {
            writeln!(
                f,
                "{:<16} cf={:<5} primary={:>5} ({:.1}) owned={:>5} ({:.1})",
                m.name, m.capacity_factor, m.primary, m.primary_quota.exact, m.owned, m.owned_quota.exact
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{HashAlgorithm, Node};

    fn node(id: u128) -> Node {
        Node::new(NodeId(id), format!("node{id}"))
    }

    #[test]
    fn test_statistics_of_hand_built_table() {
        let members = vec![node(1), node(2)];
        let owners = vec![
            vec![NodeId(1), NodeId(2)],
            vec![NodeId(2), NodeId(1)],
            vec![NodeId(1), NodeId(2)],
            vec![NodeId(1), NodeId(2)],
        ];
        let ch = ConsistentHash::new(HashAlgorithm::Murmur3, 2, 4, members, None, owners).unwrap();
        let stats = OwnershipStatistics::from_ch(&ch);

        assert_eq!(stats.members[0].primary, 3);
        assert_eq!(stats.members[1].primary, 1);
        assert_eq!(stats.members[0].owned, 4);
        assert!(!stats.is_primary_balanced());
        assert!(stats.is_owned_balanced());
        assert!((stats.max_primary_deviation() - 1.0).abs() < 1e-9);
    }
}
