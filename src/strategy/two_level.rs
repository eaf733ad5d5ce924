use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::orientation::part_orientations;
use crate::plan::PlanNode;
use crate::selector::Algorithm;
use crate::strategy::{PackContext, Packing, PackingStrategy, stack};
use crate::types::{Axis, Dims, Problem};

/// Layered two-level packing.
///
/// Level one groups part instances by height and packs each group into
/// horizontal layers. A layer is a run of rows along X; each row holds parts
/// side by side along Y and is as long as its longest part. Level two stacks
/// the layers along Z, tallest first. The resulting plan cuts Z first, then
/// X between rows, then Y between parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoLevel;

#[derive(Debug, Clone, Copy)]
struct Instance {
    part: usize,
    dims: Dims,
}

#[derive(Debug, Default)]
struct Row {
    length: u32,
    width: u32,
    parts: Vec<Instance>,
}

/// Orientation that lies flattest while still fitting the block.
fn flat_orientation(problem: &Problem, part: usize, allow_rotation: bool) -> Option<Dims> {
    let stock = problem.stock().dims();
    part_orientations(&problem.parts()[part], allow_rotation)
        .into_iter()
        .filter(|d| d.fits_in(&stock))
        .min_by_key(|d| (d.height, Reverse(d.length)))
}

struct Layering<'a> {
    problem: &'a Problem,
    stock: Dims,
    kerf: u32,
}

impl Layering<'_> {
    /// Packs as many of `pending` as fit into one layer. Placed instances
    /// are removed from `pending`.
    fn layer(&self, pending: &mut Vec<Instance>) -> Vec<Row> {
        let kerf = self.kerf;
        let mut rows: Vec<Row> = Vec::new();
        let mut used_length = 0u32;
        let mut left = Vec::new();

        for inst in pending.drain(..) {
            let d = inst.dims;
            if let Some(row) = rows.last_mut() {
                let grown = row.length.max(d.length);
                if row.width as u64 + kerf as u64 + d.width as u64 <= self.stock.width as u64
                    && used_length - row.length + grown <= self.stock.length
                {
                    used_length = used_length - row.length + grown;
                    row.length = grown;
                    row.width += kerf + d.width;
                    row.parts.push(inst);
                    continue;
                }
            }
            let gap = if rows.is_empty() { 0 } else { kerf };
            if used_length as u64 + gap as u64 + d.length as u64 <= self.stock.length as u64 {
                used_length += gap + d.length;
                rows.push(Row {
                    length: d.length,
                    width: d.width,
                    parts: vec![inst],
                });
            } else {
                left.push(inst);
            }
        }
        *pending = left;
        rows
    }

    fn layer_plan(&self, rows: &[Row], height: u32) -> PlanNode {
        let layer_extent = self.stock.with(Axis::Z, height);
        let segments: Vec<(u32, PlanNode)> = rows
            .iter()
            .map(|row| {
                let row_extent = layer_extent.with(Axis::X, row.length);
                let cells: Vec<(u32, PlanNode)> = row
                    .parts
                    .iter()
                    .map(|inst| {
                        let part = &self.problem.parts()[inst.part];
                        let cell = row_extent.with(Axis::Y, inst.dims.width);
                        let leaf = PlanNode::leaf(cell, part.id(), inst.dims, part.unit_value());
                        (inst.dims.width, leaf)
                    })
                    .collect();
                (row.length, stack(row_extent, Axis::Y, self.kerf, &cells))
            })
            .collect();
        stack(layer_extent, Axis::X, self.kerf, &segments)
    }
}

impl PackingStrategy for TwoLevel {
    fn algorithm(&self) -> Algorithm {
        Algorithm::TwoLevel
    }

    fn pack(&self, problem: &Problem, ctx: &PackContext) -> Packing {
        let stock = problem.stock().dims();
        let kerf = problem.stock().kerf();

        let mut groups: BTreeMap<Reverse<u32>, Vec<Instance>> = BTreeMap::new();
        for (idx, part) in problem.parts().iter().enumerate() {
            let Some(dims) = flat_orientation(problem, idx, ctx.allow_rotation) else {
                continue;
            };
            let group = groups.entry(Reverse(dims.height)).or_default();
            group.extend((0..part.quantity()).map(|_| Instance { part: idx, dims }));
        }

        let layering = Layering {
            problem,
            stock,
            kerf,
        };
        let mut layers: Vec<(u32, PlanNode)> = Vec::new();
        let mut used_height = 0u32;
        'groups: for (Reverse(height), mut pending) in groups {
            pending.sort_by_key(|i| Reverse(i.dims.length as u64 * i.dims.width as u64));
            while !pending.is_empty() {
                let gap = if layers.is_empty() { 0 } else { kerf };
                if used_height as u64 + gap as u64 + height as u64 > stock.height as u64 {
                    continue 'groups;
                }
                if ctx.expired() {
                    tracing::warn!(layers = layers.len(), "two level packing stopped at deadline");
                    break 'groups;
                }
                let rows = layering.layer(&mut pending);
                if rows.is_empty() {
                    continue 'groups;
                }
                used_height += gap + height;
                layers.push((height, layering.layer_plan(&rows, height)));
            }
        }

        tracing::debug!(layers = layers.len(), "two level layers stacked");
        Packing::from_plan(stack(stock, Axis::Z, kerf, &layers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartType, StockBlock};
    use crate::verify::count_overlaps;

    #[test]
    fn test_rows_fill_layer_then_stack() {
        let p = Problem::new(
            StockBlock::new(Dims::new(210, 210, 100)).unwrap(),
            vec![PartType::new(1, Dims::new(100, 100, 40), 6).unwrap()],
        )
        .unwrap();
        let packing = TwoLevel.pack(&p, &PackContext::default());
        assert_eq!(packing.placements.len(), 6);
        assert_eq!(count_overlaps(&packing.placements, 4), 0);
        let plan = packing.plan.unwrap();
        assert!(plan.check_guillotine().is_ok());
        let mut zs: Vec<u32> = packing.placements.iter().map(|p| p.z).collect();
        zs.dedup();
        assert_eq!(zs, vec![0, 44]);
    }

    #[test]
    fn test_parts_laid_flat() {
        let p = Problem::new(
            StockBlock::new(Dims::new(500, 500, 500)).unwrap(),
            vec![PartType::new(1, Dims::new(20, 100, 300), 1).unwrap()],
        )
        .unwrap();
        let packing = TwoLevel.pack(&p, &PackContext::default());
        assert_eq!(packing.placements[0].dims, Dims::new(300, 100, 20));
    }

    #[test]
    fn test_taller_groups_first_and_height_limit() {
        let p = Problem::new(
            StockBlock::new(Dims::new(100, 100, 100)).unwrap(),
            vec![
                PartType::new(1, Dims::new(90, 90, 30), 3).unwrap().with_rotation(false),
                PartType::new(2, Dims::new(90, 90, 60), 1).unwrap().with_rotation(false),
            ],
        )
        .unwrap();
        let packing = TwoLevel.pack(&p, &PackContext::default());
        let counts = crate::verify::placed_counts(&packing.placements);
        // 60 + 4 + 30 leaves no room for a second 30 layer
        assert_eq!(counts.get(&2), Some(&1));
        assert_eq!(counts.get(&1), Some(&1));
        assert_eq!(packing.placements[0].id, 2);
    }
}
