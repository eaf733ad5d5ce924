use std::collections::BTreeMap;

use crate::dp::{DpConfig, GuillotineSolver};
use crate::plan::PlanNode;
use crate::selector::Algorithm;
use crate::strategy::{MaximalSpaces, PackContext, Packing, PackingStrategy, stack};
use crate::types::{Axis, PlacedPart, Problem};
use crate::verify::placed_counts;

/// Parts whose bases lie closer than this along Z share a layer.
const LAYER_TOLERANCE: u32 = 10;

/// Maximal-spaces selection re-cut as guillotine layers.
///
/// The free-space heuristic decides which parts travel together. Its
/// placements are grouped into horizontal layers by base height, and each
/// layer becomes a full-footprint slab that the guillotine DP packs with
/// that layer's part mix. The slabs are stacked along Z, so the result
/// always has a plan even though the first pass does not.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hybrid;

#[derive(Debug, PartialEq, Eq)]
struct Layer {
    height: u32,
    counts: BTreeMap<u32, u32>,
}

/// Groups placements into layers by base height. A layer is as tall as the
/// highest part top minus its lowest base.
fn layers(placements: &[PlacedPart]) -> Vec<Layer> {
    let mut sorted: Vec<&PlacedPart> = placements.iter().collect();
    sorted.sort_by_key(|p| p.z);

    let mut out = Vec::new();
    let mut members: Vec<PlacedPart> = Vec::new();
    for p in sorted {
        if members.first().is_some_and(|first| p.z - first.z >= LAYER_TOLERANCE) {
            out.push(layer_of(&members));
            members.clear();
        }
        members.push(*p);
    }
    if !members.is_empty() {
        out.push(layer_of(&members));
    }
    out
}

/// Stage order for a layer slab: the block's order with Z moved last, so
/// the first stages cut across the footprint.
fn slab_order(order: &[Axis]) -> Vec<Axis> {
    let mut out: Vec<Axis> = order.iter().copied().filter(|a| *a != Axis::Z).collect();
    if out.len() < order.len() {
        out.push(Axis::Z);
    }
    out
}

fn layer_of(members: &[PlacedPart]) -> Layer {
    let base = members.iter().map(|p| p.z).min().unwrap_or(0);
    let top = members.iter().map(|p| p.end(Axis::Z)).max().unwrap_or(base);
    Layer {
        height: top - base,
        counts: placed_counts(members),
    }
}

impl PackingStrategy for Hybrid {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Hybrid
    }

    fn pack(&self, problem: &Problem, ctx: &PackContext) -> Packing {
        let free = MaximalSpaces.pack(problem, ctx);
        let stock = problem.stock().dims();
        let kerf = problem.stock().kerf();
        let config = DpConfig {
            allow_rotation: ctx.allow_rotation,
            deadline: ctx.deadline,
            ..DpConfig::default()
        };

        let order = slab_order(problem.stock().stage_order());
        let mut segments: Vec<(u32, PlanNode)> = Vec::new();
        let mut used = 0u64;
        for layer in layers(&free.placements) {
            if ctx.expired() {
                tracing::warn!(layers = segments.len(), "hybrid stopped at deadline");
                break;
            }
            let gap = if segments.is_empty() { 0 } else { kerf as u64 };
            if used + gap + layer.height as u64 > stock.height as u64 {
                break;
            }
            let slab = problem.limited(
                stock.with(Axis::Z, layer.height),
                order.clone(),
                &layer.counts,
            );
            let plan = GuillotineSolver::new(&slab, config.clone()).solve().plan;
            if plan.is_empty() {
                continue;
            }
            used += gap + layer.height as u64;
            segments.push((layer.height, plan));
        }

        tracing::debug!(
            selected = free.placements.len(),
            layers = segments.len(),
            "hybrid finished"
        );
        if segments.is_empty() {
            return Packing::default();
        }
        Packing::from_plan(stack(stock, Axis::Z, kerf, &segments))
    }
}
