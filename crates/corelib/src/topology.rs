//! Location descriptors for fault-domain aware placement.
//!
//! A member lives on a machine, in a rack, in a site. Two owners of the same
//! segment that share a site (or rack, or machine) fail together, so the
//! topology-aware factories try to keep them apart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hierarchical placement of a member: site → rack → machine.
///
/// Missing labels compare equal to each other, so members without any
/// location behave as if they all share one machine.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub rack: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
}

impl Location {
    pub fn new(
        site: impl Into<Option<String>>,
        rack: impl Into<Option<String>>,
        machine: impl Into<Option<String>>,
    ) -> Self {
        Self {
            site: site.into(),
            rack: rack.into(),
            machine: machine.into(),
        }
    }

    pub fn same_site(&self, other: &Self) -> bool {
        self.site == other.site
    }

    /// Racks are only comparable inside the same site.
    pub fn same_rack(&self, other: &Self) -> bool {
        self.same_site(other) && self.rack == other.rack
    }

    pub fn same_machine(&self, other: &Self) -> bool {
        self.same_rack(other) && self.machine == other.machine
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{}/{}/{}",
            label(&self.site),
            label(&self.rack),
            label(&self.machine)
        )
    }
}
