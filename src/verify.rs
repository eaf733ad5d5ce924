use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{Axis, PlacedPart, Problem};

/// Index pairs `(i, j)`, `i < j`, whose kerf-padded boxes intersect.
///
/// Sweeps along X: once a part starts past the padded end of the current
/// one, no later part in X order can touch it either.
pub fn overlapping_pairs(placements: &[PlacedPart], kerf: u32) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..placements.len()).collect();
    order.sort_by_key(|&i| placements[i].x);

    let mut pairs = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        let a = &placements[i];
        let reach = a.end(Axis::X) as u64 + kerf as u64;
        for &j in &order[pos + 1..] {
            let b = &placements[j];
            if b.x as u64 >= reach {
                break;
            }
            if a.overlaps(b, kerf) {
                pairs.push((i.min(j), i.max(j)));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

pub fn count_overlaps(placements: &[PlacedPart], kerf: u32) -> usize {
    overlapping_pairs(placements, kerf).len()
}

/// Placed count per part id.
pub fn placed_counts(placements: &[PlacedPart]) -> BTreeMap<u32, u32> {
    let mut counts = BTreeMap::new();
    for p in placements {
        *counts.entry(p.id).or_insert(0) += 1;
    }
    counts
}

/// Fails when any part id is placed more often than requested, or when a
/// placement names an id the problem does not know.
pub fn check_demand(problem: &Problem, placements: &[PlacedPart]) -> Result<()> {
    for (id, placed) in placed_counts(placements) {
        let quantity = problem.part(id).map_or(0, |p| p.quantity());
        if placed > quantity {
            return Err(Error::DemandOverconsumption {
                id,
                placed,
                quantity,
            });
        }
    }
    Ok(())
}

/// Placements reaching past the stock block on any axis.
pub fn outside_block(problem: &Problem, placements: &[PlacedPart]) -> usize {
    let stock = problem.stock().dims();
    placements
        .iter()
        .filter(|p| Axis::ALL.iter().any(|&a| p.end(a) > stock.get(a)))
        .count()
}
