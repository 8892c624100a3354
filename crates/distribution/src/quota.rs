//! Capacity-weighted segment quotas.
//!
//! A member's fair share of primary segments is `S · cf / Σcf`; its share of
//! all owned segments is `S · k · cf / Σcf`, except that nobody can own a
//! segment twice, so owned quotas are capped at `S` and the surplus is
//! handed to the remaining members in proportion to their capacity.

/// Fair share of one member and the integer window accepted as balanced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quota {
    pub exact: f64,
    pub min: usize,
    pub max: usize,
}

/// Values this close to an integer are treated as that integer.
const EPSILON: f64 = 1e-9;

impl Quota {
    pub fn new(exact: f64) -> Self {
        let rounded = exact.round();
        if (exact - rounded).abs() < EPSILON {
            let n = rounded as usize;
            return Quota { exact: rounded, min: n, max: n };
        }
        Quota {
            exact,
            min: exact.floor() as usize,
            max: exact.ceil() as usize,
        }
    }

    #[inline]
    pub fn contains(&self, count: usize) -> bool {
        self.min <= count && count <= self.max
    }
}

/// Number of owners each segment can actually get.
pub fn effective_owners(num_owners: usize, capacities: &[f32]) -> usize {
    num_owners.min(capacities.iter().filter(|&&c| c > 0.0).count())
}

pub fn primary_quotas(num_segments: usize, capacities: &[f32]) -> Vec<Quota> {
    let total: f64 = capacities.iter().map(|&c| f64::from(c)).sum();
    capacities
        .iter()
        .map(|&c| {
            if c > 0.0 && total > 0.0 {
                Quota::new(num_segments as f64 * f64::from(c) / total)
            } else {
                Quota::new(0.0)
            }
        })
        .collect()
}

/// Owned-segment quotas for `owners` owners per segment.
pub fn owned_quotas(num_segments: usize, owners: usize, capacities: &[f32]) -> Vec<Quota> {
    let segments = num_segments as f64;
    let mut exact = vec![0.0; capacities.len()];
    let mut capped = vec![false; capacities.len()];

    loop {
        let capped_count = capped.iter().filter(|&&c| c).count();
        let slots = segments * owners as f64 - segments * capped_count as f64;
        let weight: f64 = capacities
            .iter()
            .zip(&capped)
            .filter(|(&c, &done)| c > 0.0 && !done)
            .map(|(&c, _)| f64::from(c))
            .sum();
        if weight <= 0.0 || slots <= 0.0 {
            break;
        }

        let mut overflow = false;
        for (i, &c) in capacities.iter().enumerate() {
            if c <= 0.0 || capped[i] {
                continue;
            }
            let share = slots * f64::from(c) / weight;
            if share > segments + EPSILON {
                capped[i] = true;
                overflow = true;
            } else {
                exact[i] = share;
            }
        }
        if !overflow {
            break;
        }
    }

    exact
        .iter()
        .zip(&capped)
        .map(|(&e, &done)| if done { Quota::new(segments) } else { Quota::new(e) })
        .collect()
}
