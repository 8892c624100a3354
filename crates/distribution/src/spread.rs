//! Fault-domain spread of owner lists.
//!
//! The balancing engine works on member indices. A [`SpreadPolicy`] tells it
//! how well an owner list is spread over independent fault domains, so it
//! can prefer candidates and moves that keep replicas apart.

use std::collections::HashMap;

use corelib::Node;

/// Number of distinct sites, racks and machines covered by an owner list.
///
/// Compared lexicographically: one more site beats any number of racks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Spread {
    pub sites: usize,
    pub racks: usize,
    pub machines: usize,
}

impl Spread {
    /// Upper bound on the spread of an owner list of `len` members, when
    /// `self` is the spread of every eligible member.
    pub(crate) fn capped(self, len: usize) -> Spread {
        Spread {
            sites: self.sites.min(len),
            racks: self.racks.min(len),
            machines: self.machines.min(len),
        }
    }
}

pub trait SpreadPolicy {
    /// `false` when every owner list has the same spread.
    const LOCATION_AWARE: bool;

    /// Spread of the owners (member indices).
    fn spread(&self, owners: &[usize]) -> Spread;

    /// Spread of `owners` with `from` replaced by `to`.
    fn spread_replacing(&self, owners: &[usize], from: usize, to: usize) -> Spread;
}

/// Ignores locations: every owner list is equally spread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Flat;

impl SpreadPolicy for Flat {
    const LOCATION_AWARE: bool = false;

    #[inline]
    fn spread(&self, _owners: &[usize]) -> Spread {
        Spread::default()
    }

    #[inline]
    fn spread_replacing(&self, _owners: &[usize], _from: usize, _to: usize) -> Spread {
        Spread::default()
    }
}

/// Interned site, rack and machine of every member.
#[derive(Clone, Debug)]
pub struct TopologyInfo {
    site: Vec<usize>,
    rack: Vec<usize>,
    machine: Vec<usize>,
}

impl TopologyInfo {
    pub fn new(members: &[Node]) -> Self {
        let mut sites = HashMap::new();
        let mut racks = HashMap::new();
        let mut machines = HashMap::new();
        let mut info = TopologyInfo {
            site: Vec::with_capacity(members.len()),
            rack: Vec::with_capacity(members.len()),
            machine: Vec::with_capacity(members.len()),
        };

        for member in members {
            let loc = &member.location;
            let next = sites.len();
            info.site.push(*sites.entry(loc.site.clone()).or_insert(next));
            let next = racks.len();
            info.rack
                .push(*racks.entry((loc.site.clone(), loc.rack.clone())).or_insert(next));
            let next = machines.len();
            info.machine.push(
                *machines
                    .entry((loc.site.clone(), loc.rack.clone(), loc.machine.clone()))
                    .or_insert(next),
            );
        }
        info
    }

    pub fn num_sites(&self) -> usize {
        distinct(self.site.len(), |i| self.site[i])
    }

    pub fn num_racks(&self) -> usize {
        distinct(self.rack.len(), |i| self.rack[i])
    }

    /// Spread of the `len` members returned by `member`.
    fn levels(&self, len: usize, member: impl Fn(usize) -> usize) -> Spread {
        Spread {
            sites: distinct(len, |i| self.site[member(i)]),
            racks: distinct(len, |i| self.rack[member(i)]),
            machines: distinct(len, |i| self.machine[member(i)]),
        }
    }
}

impl SpreadPolicy for TopologyInfo {
    const LOCATION_AWARE: bool = true;

    fn spread(&self, owners: &[usize]) -> Spread {
        self.levels(owners.len(), |i| owners[i])
    }

    fn spread_replacing(&self, owners: &[usize], from: usize, to: usize) -> Spread {
        self.levels(owners.len(), |i| if owners[i] == from { to } else { owners[i] })
    }
}

/// Number of distinct keys among positions `0..len`.
///
/// Quadratic, but owner lists are short and nothing is allocated.
fn distinct(len: usize, key: impl Fn(usize) -> usize) -> usize {
    (0..len)
        .filter(|&i| {
            let k = key(i);
            (0..i).all(|j| key(j) != k)
        })
        .count()
}
