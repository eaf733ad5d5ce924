use crate::orientation::Variant;
use crate::types::Problem;

/// Remaining placeable quantity per part type.
///
/// All orientations of a part draw from the same pool, so the (part,
/// orientation) view returned by [`DemandMap::available`] can never add up to
/// more than the declared quantity. Updates return a new map; the solver
/// hands each branch its own copy and siblings never see each other's
/// consumption.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DemandMap {
    remaining: Vec<u32>,
}

impl DemandMap {
    pub fn new(problem: &Problem) -> Self {
        Self {
            remaining: problem.parts().iter().map(|p| p.quantity()).collect(),
        }
    }

    /// Every part available without limit, for sizing-only exploration.
    pub fn unbounded(parts: usize) -> Self {
        Self {
            remaining: vec![u32::MAX; parts],
        }
    }

    pub fn remaining(&self, part: usize) -> u32 {
        self.remaining[part]
    }

    pub fn available(&self, variant: &Variant) -> u32 {
        self.remaining(variant.part)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.iter().all(|&r| r == 0)
    }

    /// Copy of this map after `usage` has been taken out.
    pub fn after(&self, usage: &Usage) -> Self {
        let remaining = self
            .remaining
            .iter()
            .zip(&usage.counts)
            .map(|(&r, &u)| {
                debug_assert!(u <= r, "usage {u} exceeds remaining {r}");
                r.saturating_sub(u)
            })
            .collect();
        Self { remaining }
    }

    /// Memo key: remaining quantities capped by how many copies of each part
    /// could possibly fit in the current extent. Demand above the cap cannot
    /// change the outcome, so maps that agree below it share cache entries.
    pub fn capped(&self, caps: &[u32]) -> Vec<u32> {
        self.remaining
            .iter()
            .zip(caps)
            .map(|(&r, &c)| r.min(c))
            .collect()
    }
}

/// Units consumed per part type by one subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Usage {
    counts: Vec<u32>,
}

impl Usage {
    pub fn zero(parts: usize) -> Self {
        Self {
            counts: vec![0; parts],
        }
    }

    pub fn single(parts: usize, part: usize, n: u32) -> Self {
        let mut u = Self::zero(parts);
        u.counts[part] = n;
        u
    }

    pub fn combined(&self, other: &Usage) -> Self {
        Self {
            counts: self
                .counts
                .iter()
                .zip(&other.counts)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }

    pub fn get(&self, part: usize) -> u32 {
        self.counts[part]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}
