//! Incremental balancing engine shared by all factories.
//!
//! # Algorithm
//!
//! Works on member indices and runs five phases over a mutable copy of the
//! owner lists:
//!
//! 1. **Drop** owners with zero capacity and trim lists longer than the
//!    effective owner count `k = min(num_owners, eligible members)`.
//! 2. **Fill** short lists. A new primary is the member furthest below its
//!    primary quota; a new backup is the member that best improves the
//!    fault-domain spread, then the one furthest below its owned quota.
//! 3. **Balance primaries** until every member is inside its
//!    `[floor, ceil]` primary window. Promoting an existing backup costs no
//!    data movement, so it is tried before replacing the primary.
//! 4. **Balance owned segments** by moving backup copies from members above
//!    their owned window to members below it.
//! 5. **Spread out** (location-aware policies only) by swapping two
//!    primaries, or two backups, between segments when that widens one
//!    list without narrowing the other. Per-member counts do not change.
//!
//! Every transfer goes from a member above its window (or above its floor)
//! to one below its ceiling (or below its floor), so the total distance to
//! the windows strictly decreases and both loops terminate. A table that is
//! already balanced is left exactly as it is, which makes rebalancing
//! idempotent.
//!
//! Moves that would reduce spread are only made when no spread-neutral move
//! exists: quota balance wins over fault-domain spread. Phase 5 wins back
//! whatever spread the quota phases gave up once the quotas allow it. Each
//! swap raises the summed spread of all lists, so it stops too.

use std::cmp::Ordering;

use crate::quota::{effective_owners, owned_quotas, primary_quotas, Quota};
use crate::spread::{Spread, SpreadPolicy};

pub(crate) struct Balancer<'a, P: SpreadPolicy> {
    policy: &'a P,
    num_owners: usize,
    eligible: Vec<bool>,
    owners: Vec<Vec<usize>>,
    primaries: Vec<usize>,
    owned: Vec<usize>,
    primary_quota: Vec<Quota>,
    owned_quota: Vec<Quota>,
    moves: usize,
}

/// Which per-member count a transfer adjusts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Load {
    Primary,
    Owned,
}

impl<'a, P: SpreadPolicy> Balancer<'a, P> {
    /// `owners` holds member indices into `capacities`.
    pub(crate) fn new(
        policy: &'a P,
        capacities: &[f32],
        num_owners: usize,
        owners: Vec<Vec<usize>>,
    ) -> Self {
        let num_segments = owners.len();
        let k = effective_owners(num_owners, capacities);
        let mut balancer = Balancer {
            policy,
            num_owners: k,
            eligible: capacities.iter().map(|&c| c > 0.0).collect(),
            owners,
            primaries: vec![0; capacities.len()],
            owned: vec![0; capacities.len()],
            primary_quota: primary_quotas(num_segments, capacities),
            owned_quota: owned_quotas(num_segments, k, capacities),
            moves: 0,
        };
        balancer.recount();
        balancer
    }

    pub(crate) fn run(&mut self) {
        self.drop_ineligible();
        self.fill();
        while self.step(Load::Primary) {}
        while self.step(Load::Owned) {}
        if P::LOCATION_AWARE {
            self.spread_out();
        }
    }

    /// Number of owner assignments added, removed or replaced.
    pub(crate) fn moves(&self) -> usize {
        self.moves
    }

    pub(crate) fn into_owners(self) -> Vec<Vec<usize>> {
        self.owners
    }

    fn recount(&mut self) {
        self.primaries.iter_mut().for_each(|c| *c = 0);
        self.owned.iter_mut().for_each(|c| *c = 0);
        for list in &self.owners {
            if let Some(&p) = list.first() {
                self.primaries[p] += 1;
            }
            for &m in list {
                self.owned[m] += 1;
            }
        }
    }

    fn drop_ineligible(&mut self) {
        let k = self.num_owners;
        let mut dropped = 0;
        for list in &mut self.owners {
            let before = list.len();
            list.retain(|&m| self.eligible[m]);
            list.truncate(k);
            dropped += before - list.len();
        }
        if dropped > 0 {
            self.moves += dropped;
            self.recount();
        }
    }

    fn fill(&mut self) {
        for segment in 0..self.owners.len() {
            while self.owners[segment].len() < self.num_owners {
                let primary = self.owners[segment].is_empty();
                let Some(candidate) = self.fill_candidate(segment, primary) else {
                    break;
                };
                self.owners[segment].push(candidate);
                self.owned[candidate] += 1;
                if primary {
                    self.primaries[candidate] += 1;
                }
                self.moves += 1;
            }
        }
    }

    fn fill_candidate(&self, segment: usize, primary: bool) -> Option<usize> {
        let list = &self.owners[segment];
        let mut scratch = list.clone();
        scratch.push(0);
        let last = scratch.len() - 1;

        let mut best: Option<(usize, (Spread, f64, f64))> = None;
        for m in 0..self.eligible.len() {
            if !self.eligible[m] || list.contains(&m) {
                continue;
            }
            scratch[last] = m;
            let key = (
                self.policy.spread(&scratch),
                if primary { self.deficit(Load::Primary, m) } else { 0.0 },
                self.deficit(Load::Owned, m),
            );
            let better = match &best {
                None => true,
                Some((_, b)) => compare_key(&key, b) == Ordering::Greater,
            };
            if better {
                best = Some((m, key));
            }
        }
        best.map(|(m, _)| m)
    }

    fn counts(&self, load: Load) -> &[usize] {
        match load {
            Load::Primary => &self.primaries,
            Load::Owned => &self.owned,
        }
    }

    fn quotas(&self, load: Load) -> &[Quota] {
        match load {
            Load::Primary => &self.primary_quota,
            Load::Owned => &self.owned_quota,
        }
    }

    /// How far `member` is below its fair share; negative when above.
    fn deficit(&self, load: Load, member: usize) -> f64 {
        self.quotas(load)[member].exact - self.counts(load)[member] as f64
    }

    /// Members sorted by deficit, largest first, ties by index.
    fn by_deficit(&self, load: Load, mut members: Vec<usize>) -> Vec<usize> {
        members.sort_by(|&a, &b| self.deficit(load, b).total_cmp(&self.deficit(load, a)));
        members
    }

    /// Members sorted by excess, largest first, ties by index.
    fn by_excess(&self, load: Load, mut members: Vec<usize>) -> Vec<usize> {
        members.sort_by(|&a, &b| self.deficit(load, a).total_cmp(&self.deficit(load, b)));
        members
    }

    /// Donor and receiver groups, in the order they should be tried.
    ///
    /// First members above their ceiling paired with members that still
    /// have room; then members below their floor paired with members that
    /// can spare one without dropping below their own floor.
    fn transfer_groups(&self, load: Load) -> [(Vec<usize>, Vec<usize>); 2] {
        let counts = self.counts(load);
        let quotas = self.quotas(load);
        let members = 0..counts.len();

        let over: Vec<usize> = members
            .clone()
            .filter(|&m| counts[m] > quotas[m].max)
            .collect();
        let room: Vec<usize> = if over.is_empty() {
            Vec::new()
        } else {
            members
                .clone()
                .filter(|&m| self.eligible[m] && counts[m] < quotas[m].max)
                .collect()
        };

        let under: Vec<usize> = members
            .clone()
            .filter(|&m| self.eligible[m] && counts[m] < quotas[m].min)
            .collect();
        let spare: Vec<usize> = if under.is_empty() {
            Vec::new()
        } else {
            members.filter(|&m| counts[m] > quotas[m].min).collect()
        };

        [
            (self.by_excess(load, over), self.by_deficit(load, room)),
            (self.by_excess(load, spare), self.by_deficit(load, under)),
        ]
    }

    /// Segments each member holds as primary, or as backup, ascending.
    fn held_segments(&self, load: Load) -> Vec<Vec<usize>> {
        let mut held = vec![Vec::new(); self.eligible.len()];
        for (segment, list) in self.owners.iter().enumerate() {
            match load {
                Load::Primary => {
                    if let Some(&p) = list.first() {
                        held[p].push(segment);
                    }
                }
                Load::Owned => {
                    for &m in list.iter().skip(1) {
                        held[m].push(segment);
                    }
                }
            }
        }
        held
    }

    /// Performs one transfer; `false` once nothing can be improved.
    fn step(&mut self, load: Load) -> bool {
        let groups = self.transfer_groups(load);
        let held = self.held_segments(load);
        for strict in [true, false] {
            for (donors, receivers) in &groups {
                for &donor in donors {
                    for &receiver in receivers {
                        if donor == receiver {
                            continue;
                        }
                        let segments = &held[donor];
                        let found = match load {
                            Load::Primary => {
                                self.find_primary_move(segments, donor, receiver, strict)
                            }
                            Load::Owned => self.find_backup_move(segments, donor, receiver, strict),
                        };
                        if let Some(segment) = found {
                            match load {
                                Load::Primary => self.move_primary(segment, donor, receiver),
                                Load::Owned => self.move_backup(segment, donor, receiver),
                            }
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Whether replacing `from` with `to` in `list` keeps the spread.
    fn keeps_spread(&self, list: &[usize], from: usize, to: usize) -> bool {
        !P::LOCATION_AWARE || self.policy.spread_replacing(list, from, to) >= self.policy.spread(list)
    }

    /// One of `segments`, where `donor` is primary, whose primary can pass
    /// to `receiver`.
    ///
    /// A segment where `receiver` is already a backup wins: the two just
    /// swap roles. Otherwise `receiver` replaces `donor`, which only counts
    /// in strict mode when the spread is kept.
    fn find_primary_move(
        &self,
        segments: &[usize],
        donor: usize,
        receiver: usize,
        strict: bool,
    ) -> Option<usize> {
        let mut replace = None;
        for &segment in segments {
            let list = &self.owners[segment];
            if list.contains(&receiver) {
                return Some(segment);
            }
            if replace.is_none() && (!strict || self.keeps_spread(list, donor, receiver)) {
                replace = Some(segment);
            }
        }
        replace
    }

    /// One of `segments`, where `donor` is a backup, that `receiver` can
    /// take over.
    fn find_backup_move(
        &self,
        segments: &[usize],
        donor: usize,
        receiver: usize,
        strict: bool,
    ) -> Option<usize> {
        segments.iter().copied().find(|&segment| {
            let list = &self.owners[segment];
            !list.contains(&receiver) && (!strict || self.keeps_spread(list, donor, receiver))
        })
    }

    fn move_primary(&mut self, segment: usize, donor: usize, receiver: usize) {
        let list = &mut self.owners[segment];
        match list.iter().position(|&m| m == receiver) {
            Some(pos) => list.swap(0, pos),
            None => {
                list[0] = receiver;
                self.owned[donor] -= 1;
                self.owned[receiver] += 1;
                self.moves += 1;
            }
        }
        self.primaries[donor] -= 1;
        self.primaries[receiver] += 1;
    }

    fn move_backup(&mut self, segment: usize, donor: usize, receiver: usize) {
        let list = &mut self.owners[segment];
        if let Some(pos) = list.iter().position(|&m| m == donor) {
            list[pos] = receiver;
            self.owned[donor] -= 1;
            self.owned[receiver] += 1;
            self.moves += 1;
        }
    }

    /// Swaps owners between segments until no swap widens the spread.
    fn spread_out(&mut self) {
        let eligible: Vec<usize> = (0..self.eligible.len()).filter(|&m| self.eligible[m]).collect();
        let domains = self.policy.spread(&eligible);
        let mut spreads: Vec<Spread> = self.owners.iter().map(|l| self.policy.spread(l)).collect();

        loop {
            let mut swapped = false;
            for first in 0..self.owners.len() {
                if spreads[first] == domains.capped(self.owners[first].len()) {
                    continue;
                }
                let Some(swap) = self.find_spread_swap(first, &spreads) else {
                    continue;
                };
                let out = self.owners[first][swap.first_pos];
                let into = self.owners[swap.second][swap.second_pos];
                self.owners[first][swap.first_pos] = into;
                self.owners[swap.second][swap.second_pos] = out;
                spreads[first] = swap.first_spread;
                spreads[swap.second] = swap.second_spread;
                self.moves += 2;
                swapped = true;
            }
            if !swapped {
                break;
            }
        }
    }

    /// A swap that widens segment `first` and keeps the other segment's
    /// spread. Primaries only swap with primaries and backups with backups.
    fn find_spread_swap(&self, first: usize, spreads: &[Spread]) -> Option<SpreadSwap> {
        let mine = &self.owners[first];
        for (first_pos, &out) in mine.iter().enumerate() {
            for (second, theirs) in self.owners.iter().enumerate() {
                if second == first || theirs.contains(&out) {
                    continue;
                }
                for (second_pos, &into) in theirs.iter().enumerate() {
                    if (first_pos == 0) != (second_pos == 0) || mine.contains(&into) {
                        continue;
                    }
                    let first_spread = self.policy.spread_replacing(mine, out, into);
                    if first_spread <= spreads[first] {
                        continue;
                    }
                    let second_spread = self.policy.spread_replacing(theirs, into, out);
                    if second_spread >= spreads[second] {
                        return Some(SpreadSwap {
                            first_pos,
                            second,
                            second_pos,
                            first_spread,
                            second_spread,
                        });
                    }
                }
            }
        }
        None
    }
}

struct SpreadSwap {
    first_pos: usize,
    second: usize,
    second_pos: usize,
    first_spread: Spread,
    second_spread: Spread,
}

fn compare_key(a: &(Spread, f64, f64), b: &(Spread, f64, f64)) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.total_cmp(&b.1))
        .then_with(|| a.2.total_cmp(&b.2))
}
