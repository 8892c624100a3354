//! Tests for the consistent hash value type.
//!
//! # Test Strategy
//!
//! 1. **Key lookup**: keys land in the right segment and resolve to owners
//! 2. **Degraded tables**: short and empty owner lists
//! 3. **Snapshots**: union, fingerprint, serialization

use corelib::{
    ConsistentHash, HashAlgorithm, HashFunction, Location, Node, NodeId, SegmentSpace,
};
use proptest::prelude::*;

fn node(id: u128) -> Node {
    Node::new(NodeId(id), format!("node{id}"))
}

/// Three members, four segments, two owners, rotating primaries.
fn rotating_ch() -> ConsistentHash {
    let members = vec![node(1), node(2), node(3)];
    let owners = vec![
        vec![NodeId(1), NodeId(2)],
        vec![NodeId(2), NodeId(3)],
        vec![NodeId(3), NodeId(1)],
        vec![NodeId(1), NodeId(3)],
    ];
    ConsistentHash::new(HashAlgorithm::Murmur3, 2, 4, members, None, owners).unwrap()
}

// ============================================================================
// Key Lookup Tests
// ============================================================================

#[test]
fn test_key_resolves_through_its_segment() {
    let ch = rotating_ch();
    for key in [&b"alpha"[..], b"beta", b"", b"a much longer key than the others"] {
        let segment = ch.segment_of(key);
        assert_eq!(segment, HashAlgorithm::Murmur3.hash(key) as usize % 4);
        assert_eq!(ch.locate_owners(key), ch.owners_of(segment));
        assert_eq!(ch.locate_primary_owner(key), ch.primary_owner(segment));
    }
}

#[test]
fn test_locality_and_counts() {
    let ch = rotating_ch();
    assert!(ch.is_segment_local_to(&NodeId(3), 1));
    assert!(!ch.is_segment_local_to(&NodeId(3), 0));

    assert_eq!(ch.primary_segments_count(&NodeId(1)), 2);
    assert_eq!(ch.owned_segments_count(&NodeId(1)), 3);
    assert_eq!(ch.segments_for_owner(&NodeId(3)), vec![1, 2, 3]);
    assert_eq!(ch.primary_segments_for_owner(&NodeId(2)), vec![1]);
}

#[test]
fn test_out_of_range_segment_has_no_owners() {
    let ch = rotating_ch();
    assert!(ch.owners_of(4).is_empty());
    assert_eq!(ch.primary_owner(99), None);
}

// ============================================================================
// Degraded Tables
// ============================================================================

#[test]
fn test_fewer_owners_than_requested_is_valid() {
    let ch = ConsistentHash::new(
        HashAlgorithm::Xxh3,
        3,
        2,
        vec![node(1)],
        None,
        vec![vec![NodeId(1)], vec![NodeId(1)]],
    )
    .unwrap();
    assert_eq!(ch.owners_of(0), [NodeId(1)]);
    assert_eq!(ch.num_owners(), 3);
}

#[test]
fn test_ownerless_segment_is_absent_not_an_error() {
    let ch = ConsistentHash::new(
        HashAlgorithm::Sip13,
        1,
        2,
        vec![node(1)],
        None,
        vec![vec![], vec![NodeId(1)]],
    )
    .unwrap();
    assert_eq!(ch.primary_owner(0), None);
    assert_eq!(ch.primary_owner(1), Some(NodeId(1)));
}

#[test]
fn test_owner_list_count_must_match_segments() {
    let result = ConsistentHash::new(
        HashAlgorithm::Murmur3,
        1,
        3,
        vec![node(1)],
        None,
        vec![vec![NodeId(1)]],
    );
    assert!(result.is_err());
}

// ============================================================================
// Snapshot Tests
// ============================================================================

#[test]
fn test_union_keeps_order_and_adds_new_owners() {
    let old = rotating_ch();
    let members = vec![node(1), node(2), node(3), node(4)];
    let owners = vec![
        vec![NodeId(4), NodeId(2)],
        vec![NodeId(2), NodeId(3)],
        vec![NodeId(3), NodeId(4)],
        vec![NodeId(1), NodeId(3)],
    ];
    let new = ConsistentHash::new(HashAlgorithm::Murmur3, 2, 4, members, None, owners).unwrap();

    let union = old.union(&new).unwrap();
    assert_eq!(union.owners_of(0), [NodeId(1), NodeId(2), NodeId(4)]);
    assert_eq!(union.owners_of(1), [NodeId(2), NodeId(3)]);
    assert_eq!(union.members().len(), 4);
    assert_eq!(union.primary_owner(0), Some(NodeId(1)));
}

#[test]
fn test_union_requires_same_segment_space() {
    let old = rotating_ch();
    let other = ConsistentHash::new(
        HashAlgorithm::Xxh3,
        2,
        4,
        vec![node(1)],
        None,
        vec![vec![NodeId(1)]; 4],
    )
    .unwrap();
    assert!(old.union(&other).is_err());
}

#[test]
fn test_fingerprint_tracks_content() {
    let a = rotating_ch();
    let b = rotating_ch();
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

    let swapped = ConsistentHash::new(
        HashAlgorithm::Murmur3,
        2,
        4,
        vec![node(1), node(2), node(3)],
        None,
        vec![
            vec![NodeId(2), NodeId(1)],
            vec![NodeId(2), NodeId(3)],
            vec![NodeId(3), NodeId(1)],
            vec![NodeId(1), NodeId(3)],
        ],
    )
    .unwrap();
    assert_ne!(a.fingerprint().unwrap(), swapped.fingerprint().unwrap());
}

#[test]
fn test_routing_table_lists_owner_names() {
    let table = rotating_ch().routing_table();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "    0: node1, node2");
    assert_eq!(lines[3], "    3: node1, node3");
}

#[test]
fn test_node_json_round_trip() {
    let node = Node::with_location(
        NodeId(7),
        "edge",
        Location::new(Some("eu".to_string()), Some("r2".to_string()), None),
    );
    let json = serde_json::to_string(&node).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(back, node);

    let bare: Node = serde_json::from_str(r#"{ "id": 3, "name": "bare" }"#).unwrap();
    assert_eq!(bare.location, Location::default());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every key maps into the segment space, for every hash function.
    #[test]
    fn prop_segment_in_range(
        key in prop::collection::vec(any::<u8>(), 0..64),
        num_segments in 1usize..10_000,
    ) {
        for hash in HashAlgorithm::ALL {
            let space = SegmentSpace::new(hash, num_segments).unwrap();
            prop_assert!(space.segment_of(&key) < num_segments);
        }
    }
}
