//! Staged guillotine dynamic program over reduced raster points.
//!
//! `dp(extent, depth, demand)` returns the best plan for one block. Three
//! kinds of action compete, the first one to reach a value wins ties:
//!
//! 1. a single best-value part placed at the block origin,
//! 2. a grid of identical copies of one oriented part, capped by demand,
//! 3. a cut along the axis the stage order prescribes for this depth, at
//!    every raster point, with both sides solved recursively. A stage whose
//!    axis has no cut points is skipped and the next axis in the order is
//!    tried, so the children may sit more than one stage deeper.
//!
//! The `before` side of a cut is solved against the incoming demand and the
//! `after` side against what `before` left over, so the consumption of a
//! subtree never exceeds what its caller handed it. Results are memoized on
//! the snapped extent, the stage index and the demand capped by what could
//! possibly fit in the extent.
//!
//! The key holds the depth modulo the number of stages, not the depth
//! itself. A cached subtree may have been solved with more or less room
//! under the depth ceiling than the caller has, so `max_depth` bounds the
//! search approximately rather than capping every path of the returned plan.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::demand::{DemandMap, Usage};
use crate::orientation::{self, Variant};
use crate::plan::PlanNode;
use crate::raster::{self, SnapAxis};
use crate::types::{Axis, Dims, Problem};

#[derive(Debug, Clone)]
pub struct DpConfig {
    /// Recursion ceiling. Deeper blocks get a single part and no cuts.
    /// Memoized subtrees are shared across depths of the same stage, so
    /// the bound is approximate.
    pub max_depth: usize,
    /// Distinct sizes used for raster partial sums.
    pub max_prefix_sizes: usize,
    /// When false every part is treated as available without limit.
    pub respect_quantities: bool,
    pub allow_rotation: bool,
    /// Hard wall-clock limit checked on every call. Past it the solver
    /// degrades the same way it does at the depth ceiling.
    pub deadline: Option<Instant>,
}

impl Default for DpConfig {
    fn default() -> Self {
        Self {
            max_depth: 50,
            max_prefix_sizes: 12,
            respect_quantities: true,
            allow_rotation: true,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DpStats {
    /// Cut candidates per axis on the full stock block.
    pub raster_points: [usize; 3],
    pub cache_entries: usize,
    /// Set when the depth ceiling or the deadline cut the search short.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct DpSolution {
    pub plan: PlanNode,
    pub usage: Usage,
    pub stats: DpStats,
}

#[derive(Debug, Clone)]
struct Solved {
    value: u64,
    node: Arc<PlanNode>,
    usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
    extent: Dims,
    stage: usize,
    demand: Vec<u32>,
}

pub struct GuillotineSolver<'a> {
    problem: &'a Problem,
    config: DpConfig,
    variants: Vec<Variant>,
    /// Kerf-padded part volume per part type, orientation independent.
    padded_volume: Vec<u128>,
    unit_value: Vec<u64>,
    /// Every part is valued by its volume, so block volume also bounds value.
    volume_valued: bool,
    stage_order: Vec<Axis>,
    sizes: [Vec<u32>; 3],
    snap: [SnapAxis; 3],
    points: HashMap<(usize, u32), Rc<Vec<u32>>>,
    cache: HashMap<StateKey, Solved>,
    truncated: bool,
}

impl<'a> GuillotineSolver<'a> {
    pub fn new(problem: &'a Problem, config: DpConfig) -> Self {
        let stock = problem.stock();
        let kerf = stock.kerf();
        let variants = orientation::variants(problem, config.allow_rotation);

        let mut sizes: [Vec<u32>; 3] = Default::default();
        for v in &variants {
            for axis in Axis::ALL {
                let s = v.dims.get(axis).saturating_add(kerf);
                if !sizes[axis.index()].contains(&s) {
                    sizes[axis.index()].push(s);
                }
            }
        }
        let snap = Axis::ALL.map(|axis| {
            let raw: Vec<u32> = variants.iter().map(|v| v.dims.get(axis)).collect();
            SnapAxis::new(stock.dims().get(axis), &raw, kerf)
        });
        let padded_volume = problem
            .parts()
            .iter()
            .map(|p| {
                let d = p.dims();
                Axis::ALL
                    .iter()
                    .map(|&a| d.get(a) as u128 + kerf as u128)
                    .product::<u128>()
            })
            .collect();
        let unit_value = problem.parts().iter().map(|p| p.unit_value()).collect();
        let volume_valued = problem
            .parts()
            .iter()
            .all(|p| p.unit_value() == p.dims().volume());

        Self {
            problem,
            config,
            variants,
            padded_volume,
            unit_value,
            volume_valued,
            stage_order: stock.stage_order().to_vec(),
            sizes,
            snap,
            points: HashMap::new(),
            cache: HashMap::new(),
            truncated: false,
        }
    }

    pub fn solve(mut self) -> DpSolution {
        let started = Instant::now();
        let stock = self.problem.stock().dims();
        let demand = if self.config.respect_quantities {
            DemandMap::new(self.problem)
        } else {
            DemandMap::unbounded(self.problem.parts().len())
        };

        let root_points = Axis::ALL.map(|axis| self.cut_points(axis, stock.get(axis)).len());
        let solved = self.dp(stock, 0, &demand);

        let plan = if solved.value == 0 {
            PlanNode::empty(stock)
        } else {
            solved.node.with_extent(stock)
        };
        let stats = DpStats {
            raster_points: root_points,
            cache_entries: self.cache.len(),
            truncated: self.truncated,
        };
        tracing::debug!(
            value = solved.value,
            items = solved.usage.total(),
            cache_entries = stats.cache_entries,
            truncated = stats.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "guillotine dp finished"
        );
        DpSolution {
            plan,
            usage: solved.usage,
            stats,
        }
    }

    fn snapped(&self, extent: Dims) -> Dims {
        Dims::new(
            self.snap[0].snap(extent.length),
            self.snap[1].snap(extent.width),
            self.snap[2].snap(extent.height),
        )
    }

    fn empty(&self, extent: Dims) -> Solved {
        Solved {
            value: 0,
            node: Arc::new(PlanNode::empty(extent)),
            usage: Usage::zero(self.problem.parts().len()),
        }
    }

    fn past_deadline(&self) -> bool {
        self.config.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Upper bound on copies of each part that fit in `extent`: every part
    /// plus one kerf on each axis occupies a disjoint box inside the
    /// extent grown by one kerf.
    fn caps(&self, extent: Dims) -> Vec<u32> {
        let kerf = self.problem.stock().kerf() as u128;
        let room = Axis::ALL
            .iter()
            .map(|&a| extent.get(a) as u128 + kerf)
            .product::<u128>();
        self.padded_volume
            .iter()
            .map(|&pv| (room / pv).min(u32::MAX as u128) as u32)
            .collect()
    }

    /// Most value any plan could extract from `extent` under `capped` demand.
    fn value_bound(&self, extent: Dims, capped: &[u32]) -> u64 {
        let by_parts: u64 = capped
            .iter()
            .zip(&self.unit_value)
            .map(|(&n, &v)| (n as u64).saturating_mul(v))
            .fold(0u64, |acc, x| acc.saturating_add(x));
        if self.volume_valued {
            by_parts.min(extent.volume())
        } else {
            by_parts
        }
    }

    fn cut_points(&mut self, axis: Axis, len: u32) -> Rc<Vec<u32>> {
        let key = (axis.index(), len);
        if let Some(pts) = self.points.get(&key) {
            return Rc::clone(pts);
        }
        let stock = self.problem.stock();
        let kerf = stock.kerf();
        let min_slice = stock.min_slice();
        let pts = raster::raster_points(
            len,
            &self.sizes[axis.index()],
            kerf,
            min_slice,
            self.config.max_prefix_sizes,
        );
        let pts: Vec<u32> = raster::drop_dominated(pts, &self.snap[axis.index()])
            .into_iter()
            .filter(|&x| {
                x >= min_slice
                    && len
                        .checked_sub(x.saturating_add(kerf))
                        .is_some_and(|rest| rest >= min_slice)
            })
            .collect();
        let pts = Rc::new(pts);
        self.points.insert(key, Rc::clone(&pts));
        pts
    }

    fn single_best(&self, extent: Dims, demand: &DemandMap) -> Option<Solved> {
        let mut best: Option<&Variant> = None;
        for v in &self.variants {
            if demand.available(v) == 0 || !v.dims.fits_in(&extent) {
                continue;
            }
            if best.is_none_or(|b| v.unit_value > b.unit_value) {
                best = Some(v);
            }
        }
        best.map(|v| Solved {
            value: v.unit_value,
            node: Arc::new(PlanNode::leaf(extent, v.id, v.dims, v.unit_value)),
            usage: Usage::single(self.problem.parts().len(), v.part, 1),
        })
    }

    fn best_grid(&self, extent: Dims, demand: &DemandMap, floor: u64) -> Option<Solved> {
        let kerf = self.problem.stock().kerf();
        let mut best: Option<Solved> = None;
        let mut best_value = floor;
        for v in &self.variants {
            let avail = demand.available(v);
            if avail == 0 {
                continue;
            }
            let counts = Axis::ALL.map(|a| {
                let room = extent.get(a) as u64 + kerf as u64;
                (room / (v.dims.get(a) as u64 + kerf as u64)) as u32
            });
            if counts.contains(&0) {
                continue;
            }
            let cells = counts.iter().map(|&c| c as u64).product::<u64>();
            let count = cells.min(avail as u64) as u32;
            let value = count as u64 * v.unit_value;
            if value > best_value {
                best_value = value;
                best = Some(Solved {
                    value,
                    node: Arc::new(PlanNode::grid(
                        extent,
                        v.id,
                        v.dims,
                        counts,
                        count,
                        kerf,
                        v.unit_value,
                    )),
                    usage: Usage::single(self.problem.parts().len(), v.part, count),
                });
            }
        }
        best
    }

    /// First axis in stage order, starting at `depth`, that admits a cut.
    /// Axes without cut points are skipped. Returns the axis, its cut points
    /// and the depth of the children, one past the stage actually used.
    fn stage_axis(&mut self, extent: Dims, depth: usize) -> Option<(Axis, Rc<Vec<u32>>, usize)> {
        let stages = self.stage_order.len();
        for j in 0..stages {
            let axis = self.stage_order[(depth + j) % stages];
            let pts = self.cut_points(axis, extent.get(axis));
            if !pts.is_empty() {
                return Some((axis, pts, depth + j + 1));
            }
        }
        None
    }

    fn dp(&mut self, extent: Dims, depth: usize, demand: &DemandMap) -> Solved {
        let min_slice = self.problem.stock().min_slice();
        let s = self.snapped(extent);
        if s.min_side() < min_slice.max(1) || demand.is_exhausted() {
            return self.empty(extent);
        }

        if depth >= self.config.max_depth || self.past_deadline() {
            self.truncated = true;
            return self
                .single_best(s, demand)
                .unwrap_or_else(|| self.empty(extent));
        }

        let stages = self.stage_order.len();
        let capped = demand.capped(&self.caps(s));
        let key = StateKey {
            extent: s,
            stage: depth % stages,
            demand: capped,
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let bound = self.value_bound(s, &key.demand);

        let mut best = self.single_best(s, demand).unwrap_or_else(|| self.empty(s));
        if let Some(grid) = self.best_grid(s, demand, best.value) {
            best = grid;
        }

        let stage = if best.value < bound {
            self.stage_axis(s, depth)
        } else {
            None
        };
        if let Some((axis, pts, next_depth)) = stage {
            let kerf = self.problem.stock().kerf();
            let len = s.get(axis);
            for &x in pts.iter() {
                let before = self.dp(s.with(axis, x), next_depth, demand);
                let rest = demand.after(&before.usage);
                let after = self.dp(s.with(axis, len - x - kerf), next_depth, &rest);
                let total = before.value + after.value;
                if total > best.value {
                    best = Solved {
                        value: total,
                        usage: before.usage.combined(&after.usage),
                        node: Arc::new(PlanNode::cut(
                            s,
                            axis,
                            x,
                            kerf,
                            before.node,
                            after.node,
                        )),
                    };
                    if best.value >= bound {
                        break;
                    }
                }
            }
        }

        self.cache.insert(key, best.clone());
        best
    }
}
