use crate::orientation::part_orientations;
use crate::selector::Algorithm;
use crate::strategy::{PackContext, Packing, PackingStrategy, by_volume_desc};
use crate::types::{Axis, Dims, PlacedPart, Problem};

/// Greedy packing over maximal free spaces.
///
/// Free space is kept as a set of possibly overlapping boxes, none contained
/// in another. Each part instance goes to the lowest (z, y, x) space that
/// holds it. Every space the part touches, padded by kerf on both sides, is
/// then split into the up to six boxes left around it. The layouts are not
/// guillotine-cuttable in general, so no plan is produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximalSpaces;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Space {
    lo: [u32; 3],
    hi: [u32; 3],
}

impl Space {
    fn size(&self, axis: usize) -> u32 {
        self.hi[axis] - self.lo[axis]
    }

    fn fits(&self, d: Dims) -> bool {
        Axis::ALL.iter().all(|a| d.get(*a) <= self.size(a.index()))
    }

    fn intersects(&self, other: &Space) -> bool {
        (0..3).all(|a| self.lo[a] < other.hi[a] && other.lo[a] < self.hi[a])
    }

    fn contains(&self, other: &Space) -> bool {
        (0..3).all(|a| self.lo[a] <= other.lo[a] && other.hi[a] <= self.hi[a])
    }

    /// Pieces of `self` outside `cut`.
    fn split(&self, cut: &Space) -> Vec<Space> {
        let mut out = Vec::with_capacity(6);
        for a in 0..3 {
            if cut.lo[a] > self.lo[a] {
                let mut s = *self;
                s.hi[a] = cut.lo[a];
                out.push(s);
            }
            if cut.hi[a] < self.hi[a] {
                let mut s = *self;
                s.lo[a] = cut.hi[a];
                out.push(s);
            }
        }
        out
    }
}

fn occupy(spaces: Vec<Space>, placed: &PlacedPart, kerf: u32) -> Vec<Space> {
    let padded = Space {
        lo: [placed.x, placed.y, placed.z].map(|v| v.saturating_sub(kerf)),
        hi: Axis::ALL.map(|a| placed.end(a).saturating_add(kerf)),
    };
    let mut next: Vec<Space> = Vec::with_capacity(spaces.len() + 6);
    for s in spaces {
        if s.intersects(&padded) {
            next.extend(s.split(&padded));
        } else {
            next.push(s);
        }
    }

    // Drop duplicates and boxes nested in others
    let mut kept: Vec<Space> = Vec::with_capacity(next.len());
    for (i, s) in next.iter().enumerate() {
        let covered = next.iter().enumerate().any(|(j, o)| {
            i != j && o.contains(s) && (o != s || j < i)
        });
        if !covered {
            kept.push(*s);
        }
    }
    kept.sort_by_key(|s| (s.lo[2], s.lo[1], s.lo[0]));
    kept
}

impl PackingStrategy for MaximalSpaces {
    fn algorithm(&self) -> Algorithm {
        Algorithm::MaximalSpaces
    }

    fn pack(&self, problem: &Problem, ctx: &PackContext) -> Packing {
        let stock = problem.stock().dims();
        let kerf = problem.stock().kerf();
        let mut spaces = vec![Space {
            lo: [0; 3],
            hi: [stock.length, stock.width, stock.height],
        }];
        let mut placements = Vec::new();

        'parts: for p in by_volume_desc(problem) {
            let part = &problem.parts()[p];
            let orientations = part_orientations(part, ctx.allow_rotation);
            for _ in 0..part.quantity() {
                if ctx.expired() {
                    tracing::warn!(placed = placements.len(), "maximal spaces stopped at deadline");
                    break 'parts;
                }
                let choice = spaces.iter().find_map(|s| {
                    orientations.iter().find(|d| s.fits(**d)).map(|d| (s.lo, *d))
                });
                let Some((lo, dims)) = choice else {
                    continue 'parts;
                };
                let placed = PlacedPart {
                    id: part.id(),
                    x: lo[0],
                    y: lo[1],
                    z: lo[2],
                    dims,
                };
                spaces = occupy(spaces, &placed, kerf);
                placements.push(placed);
            }
        }

        tracing::debug!(placed = placements.len(), spaces = spaces.len(), "maximal spaces finished");
        Packing {
            plan: None,
            placements,
            dp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartType, StockBlock};
    use crate::verify::count_overlaps;

    #[test]
    fn test_split_leaves_six_pieces_around_interior_box() {
        let outer = Space {
            lo: [0; 3],
            hi: [10; 3],
        };
        let inner = Space {
            lo: [4; 3],
            hi: [6; 3],
        };
        assert_eq!(outer.split(&inner).len(), 6);
    }

    #[test]
    fn test_packs_without_overlap() {
        let p = Problem::new(
            StockBlock::new(Dims::new(300, 200, 150)).unwrap(),
            vec![
                PartType::new(1, Dims::new(110, 70, 50), 5).unwrap(),
                PartType::new(2, Dims::new(45, 45, 45), 12).unwrap(),
                PartType::new(3, Dims::new(150, 20, 20), 6).unwrap(),
            ],
        )
        .unwrap();
        let packing = MaximalSpaces.pack(&p, &PackContext::default());
        assert!(packing.plan.is_none());
        assert_eq!(packing.placements.len(), 23);
        assert_eq!(count_overlaps(&packing.placements, 4), 0);
        assert_eq!(crate::verify::outside_block(&p, &packing.placements), 0);
    }

    #[test]
    fn test_corner_first_then_along_x() {
        let p = Problem::new(
            StockBlock::new(Dims::new(100, 40, 40)).unwrap(),
            vec![PartType::new(1, Dims::new(30, 40, 40), 3).unwrap()],
        )
        .unwrap();
        let packing = MaximalSpaces.pack(&p, &PackContext::default());
        let xs: Vec<u32> = packing.placements.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0, 34, 68]);
    }
}
