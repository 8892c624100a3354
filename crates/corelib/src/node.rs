//! Node abstractions for the segment space.
//!
//! Nodes represent cluster members that may own segments. They are identified
//! by a compact `NodeId` that is cheap to compare, hash and copy into owner
//! lists.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topology::Location;

/// Compact identifier for a node in the cluster.
///
/// Newtype over `u128` so comparisons and hashing are very fast while giving
/// plenty of space for uniqueness.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(pub u128);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Relative weight of each member: how large a share of the segments it
/// should own. A factor of `0.0` keeps the member in the view without
/// giving it any data.
///
/// A `BTreeMap` so that iteration order never depends on hashing state.
pub type CapacityFactors = BTreeMap<NodeId, f32>;

/// Capacity factor assumed for members when no factors are supplied.
pub const DEFAULT_CAPACITY_FACTOR: f32 = 1.0;

/// Logical node participating in the cluster.
///
/// Keep this struct small and cheap to clone; heavy mutable state (connections,
/// metrics, etc.) should live elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Human‑readable name or hostname.
    pub name: String,
    /// Fault-domain placement used by topology-aware factories.
    #[serde(default)]
    pub location: Location,
}

impl Node {
    /// Construct a new node without location metadata.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: Location::default(),
        }
    }

    pub fn with_location(id: NodeId, name: impl Into<String>, location: Location) -> Self {
        Self {
            id,
            name: name.into(),
            location,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
