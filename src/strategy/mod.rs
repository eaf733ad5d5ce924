//! Packing strategies the selector can run.
//!
//! Every strategy turns a [`Problem`] into placements. The guillotine ones
//! also hand back the plan the placements were expanded from, so the
//! selector can build a cutting sequence for them.

mod first_fit;
mod hybrid;
mod maximal_spaces;
mod two_level;

use std::sync::Arc;
use std::time::Instant;

pub use first_fit::FirstFit;
pub use hybrid::Hybrid;
pub use maximal_spaces::MaximalSpaces;
pub use two_level::TwoLevel;

use crate::dp::{DpConfig, DpStats, GuillotineSolver};
use crate::expand::expand;
use crate::plan::PlanNode;
use crate::selector::Algorithm;
use crate::types::{Axis, Dims, PlacedPart, Problem};

/// Per-attempt settings handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct PackContext {
    pub allow_rotation: bool,
    pub deadline: Option<Instant>,
}

impl Default for PackContext {
    fn default() -> Self {
        Self {
            allow_rotation: true,
            deadline: None,
        }
    }
}

impl PackContext {
    pub(crate) fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Packing {
    /// `None` for strategies that do not produce guillotine plans.
    pub plan: Option<PlanNode>,
    pub placements: Vec<PlacedPart>,
    pub dp: Option<DpStats>,
}

impl Packing {
    fn from_plan(plan: PlanNode) -> Self {
        let placements = expand(&plan);
        Self {
            plan: Some(plan),
            placements,
            dp: None,
        }
    }

    pub fn filled_volume(&self) -> u64 {
        self.placements.iter().map(|p| p.volume()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

pub trait PackingStrategy: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn pack(&self, problem: &Problem, ctx: &PackContext) -> Packing;
}

/// The staged guillotine dynamic program.
#[derive(Debug, Clone, Default)]
pub struct GuillotineDp {
    pub config: DpConfig,
}

impl PackingStrategy for GuillotineDp {
    fn algorithm(&self) -> Algorithm {
        Algorithm::GuillotineDp
    }

    fn pack(&self, problem: &Problem, ctx: &PackContext) -> Packing {
        let config = DpConfig {
            allow_rotation: ctx.allow_rotation,
            deadline: ctx.deadline.or(self.config.deadline),
            ..self.config.clone()
        };
        let solution = GuillotineSolver::new(problem, config).solve();
        Packing {
            dp: Some(solution.stats),
            ..Packing::from_plan(solution.plan)
        }
    }
}

pub fn strategy_for(algorithm: Algorithm) -> Box<dyn PackingStrategy> {
    match algorithm {
        Algorithm::GuillotineDp => Box::new(GuillotineDp::default()),
        Algorithm::TwoLevel => Box::new(TwoLevel),
        Algorithm::FirstFit => Box::new(FirstFit),
        Algorithm::MaximalSpaces => Box::new(MaximalSpaces),
        Algorithm::Hybrid => Box::new(Hybrid),
    }
}

/// Part indices by decreasing volume, input order among equals.
pub(crate) fn by_volume_desc(problem: &Problem) -> Vec<usize> {
    let mut order: Vec<usize> = (0..problem.parts().len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(problem.parts()[i].dims().volume()));
    order
}

/// Lays `segments` one after the other along `axis`, separated by kerf
/// cuts. Each segment is `(length along axis, node)`; the caller guarantees
/// the lengths plus kerfs fit in `extent`. Leftover material after the last
/// segment becomes an empty offcut.
pub(crate) fn stack(extent: Dims, axis: Axis, kerf: u32, segments: &[(u32, PlanNode)]) -> PlanNode {
    let Some(((len, node), rest)) = segments.split_first() else {
        return PlanNode::empty(extent);
    };
    let total = extent.get(axis);
    if rest.is_empty() && len.saturating_add(kerf) >= total {
        return node.with_extent(extent);
    }
    let after_extent = extent.with(axis, total - len - kerf);
    let after = stack(after_extent, axis, kerf, rest);
    PlanNode::cut(
        extent,
        axis,
        *len,
        kerf,
        Arc::new(node.clone()),
        Arc::new(after),
    )
}
