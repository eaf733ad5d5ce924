use std::sync::Arc;

use crate::orientation::part_orientations;
use crate::plan::PlanNode;
use crate::selector::Algorithm;
use crate::strategy::{PackContext, Packing, PackingStrategy, by_volume_desc};
use crate::types::{Axis, Dims, Problem};

/// First-fit decreasing with guillotine slabs.
///
/// Each region takes the largest part that still fits, at its corner, then
/// the rest of the region is cut into three slabs: above the part, beside it
/// along Y, and beside it along X. Slabs are filled in that order from one
/// shared pool of remaining quantities.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFit;

struct Filler<'a> {
    problem: &'a Problem,
    ctx: &'a PackContext,
    order: Vec<usize>,
    orientations: Vec<Vec<Dims>>,
    pool: Vec<u32>,
}

impl Filler<'_> {
    fn pick(&mut self, region: Dims) -> Option<(usize, Dims)> {
        for &p in &self.order {
            if self.pool[p] == 0 {
                continue;
            }
            if let Some(d) = self.orientations[p].iter().find(|d| d.fits_in(&region)) {
                self.pool[p] -= 1;
                return Some((p, *d));
            }
        }
        None
    }

    /// Cuts `inner` (already sized to `region` on every axis but `axis`) off
    /// the start of `region` and fills the slab left behind, if usable.
    fn slab(&mut self, region: Dims, axis: Axis, inner: PlanNode) -> PlanNode {
        let kerf = self.problem.stock().kerf();
        let min_slice = self.problem.stock().min_slice();
        let used = inner.extent().get(axis);
        let total = region.get(axis);
        match total.checked_sub(used.saturating_add(kerf)) {
            Some(rest) if rest >= min_slice.max(1) => {
                let after = self.fill(region.with(axis, rest));
                if after.is_empty() {
                    inner.with_extent(region)
                } else {
                    PlanNode::cut(region, axis, used, kerf, Arc::new(inner), Arc::new(after))
                }
            }
            _ => inner.with_extent(region),
        }
    }

    fn fill(&mut self, region: Dims) -> PlanNode {
        let min_slice = self.problem.stock().min_slice();
        if region.min_side() < min_slice.max(1) || self.ctx.expired() {
            return PlanNode::empty(region);
        }
        let Some((p, d)) = self.pick(region) else {
            return PlanNode::empty(region);
        };
        let part = &self.problem.parts()[p];
        let leaf = PlanNode::leaf(d, part.id(), d, part.unit_value());

        let column = self.slab(Dims::new(d.length, d.width, region.height), Axis::Z, leaf);
        let row = self.slab(Dims::new(d.length, region.width, region.height), Axis::Y, column);
        self.slab(region, Axis::X, row)
    }
}

impl PackingStrategy for FirstFit {
    fn algorithm(&self) -> Algorithm {
        Algorithm::FirstFit
    }

    fn pack(&self, problem: &Problem, ctx: &PackContext) -> Packing {
        let mut filler = Filler {
            problem,
            ctx,
            order: by_volume_desc(problem),
            orientations: problem
                .parts()
                .iter()
                .map(|p| part_orientations(p, ctx.allow_rotation))
                .collect(),
            pool: problem.parts().iter().map(|p| p.quantity()).collect(),
        };
        let plan = filler.fill(problem.stock().dims());
        tracing::debug!(items = plan.item_count(), "first fit finished");
        Packing::from_plan(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartType, StockBlock};
    use crate::verify::count_overlaps;

    fn problem(block: Dims, parts: Vec<PartType>) -> Problem {
        Problem::new(StockBlock::new(block).unwrap(), parts).unwrap()
    }

    #[test]
    fn test_fills_column_then_row() {
        let p = problem(
            Dims::new(100, 100, 100),
            vec![PartType::new(1, Dims::new(48, 48, 48), 8).unwrap()],
        );
        let packing = FirstFit.pack(&p, &PackContext::default());
        assert_eq!(packing.placements.len(), 8);
        assert_eq!(count_overlaps(&packing.placements, 4), 0);
        let plan = packing.plan.unwrap();
        assert!(plan.check_guillotine().is_ok());
        // First column stacks along Z
        assert_eq!(packing.placements[1].z, 52);
    }

    #[test]
    fn test_largest_part_first() {
        let p = problem(
            Dims::new(100, 100, 100),
            vec![
                PartType::new(1, Dims::new(10, 10, 10), 1).unwrap(),
                PartType::new(2, Dims::new(90, 90, 90), 1).unwrap(),
            ],
        );
        let packing = FirstFit.pack(&p, &PackContext::default());
        assert_eq!(packing.placements[0].id, 2);
        // No slab around the big part is thick enough for the small one
        assert_eq!(packing.placements.len(), 1);
    }

    #[test]
    fn test_rotation_used_when_declared_does_not_fit() {
        let p = problem(
            Dims::new(300, 50, 50),
            vec![PartType::new(1, Dims::new(40, 200, 40), 1).unwrap()],
        );
        let packing = FirstFit.pack(&p, &PackContext::default());
        assert_eq!(packing.placements.len(), 1);
        assert_eq!(packing.placements[0].dims.length, 200);

        let fixed = PackContext {
            allow_rotation: false,
            ..PackContext::default()
        };
        assert!(FirstFit.pack(&p, &fixed).is_empty());
    }
}
