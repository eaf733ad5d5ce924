//! Runs a packing strategy with its fallback chain and checks the result.
//!
//! An attempt that comes back empty hands over to the next strategy in the
//! chain. Every attempt shares one wall-clock deadline, so later attempts
//! only get what is left of the budget. Each non-empty result is verified
//! before it is accepted: overlapping, out-of-block or over-quantity
//! layouts are defects and are never returned.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dp::DpStats;
use crate::error::{Error, Result};
use crate::plan::PlanNode;
use crate::sequence::{CuttingSequence, build_sequence};
use crate::strategy::{PackContext, Packing, PackingStrategy, strategy_for};
use crate::types::{PlacedPart, Problem};
use crate::verify::{check_demand, count_overlaps, outside_block, placed_counts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "dp_rrp")]
    GuillotineDp,
    #[serde(rename = "two_level")]
    TwoLevel,
    #[serde(rename = "first_fit")]
    FirstFit,
    #[serde(rename = "maximal_spaces")]
    MaximalSpaces,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::GuillotineDp,
        Algorithm::TwoLevel,
        Algorithm::FirstFit,
        Algorithm::MaximalSpaces,
        Algorithm::Hybrid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::GuillotineDp => "dp_rrp",
            Algorithm::TwoLevel => "two_level",
            Algorithm::FirstFit => "first_fit",
            Algorithm::MaximalSpaces => "maximal_spaces",
            Algorithm::Hybrid => "hybrid",
        }
    }

    /// Strategies tried, in order, when this one comes back empty.
    pub fn fallbacks(self) -> &'static [Algorithm] {
        match self {
            Algorithm::GuillotineDp => {
                &[Algorithm::Hybrid, Algorithm::TwoLevel, Algorithm::FirstFit]
            }
            Algorithm::TwoLevel => &[Algorithm::FirstFit],
            Algorithm::FirstFit => &[Algorithm::TwoLevel],
            Algorithm::MaximalSpaces => &[Algorithm::FirstFit],
            Algorithm::Hybrid => &[Algorithm::TwoLevel, Algorithm::FirstFit],
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| Error::UnknownAlgorithm(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Replaces the stock block's kerf when set.
    pub kerf: Option<u32>,
    /// Combined with each part's own rotation flag.
    pub allow_rotation: bool,
    pub time_budget_ms: u64,
    /// Defaults to the guillotine DP.
    pub algorithm: Option<Algorithm>,
    /// Independent attempts with shuffled part order.
    pub iterations: u32,
    pub seed: u64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            kerf: None,
            allow_rotation: true,
            time_budget_ms: 60_000,
            algorithm: None,
            iterations: 1,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub filled_volume: u64,
    pub block_volume: u64,
    /// Percent of the block volume taken by parts.
    pub utilization: f64,
    pub waste: f64,
    pub item_counts: BTreeMap<u32, u32>,
    pub computation_time_ms: u64,
    pub collisions: usize,
    pub algorithm: Algorithm,
    pub attempted: Vec<Algorithm>,
    pub budget_exhausted: bool,
    pub iterations: u32,
    pub dp: Option<DpStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveOutcome {
    pub plan: Option<PlanNode>,
    pub placements: Vec<PlacedPart>,
    pub stats: Statistics,
}

impl SolveOutcome {
    /// Operator program for the plan, when the winning strategy made one.
    pub fn sequence(&self, problem: &Problem) -> Option<CuttingSequence> {
        self.plan
            .as_ref()
            .map(|plan| build_sequence(plan, problem.stock().dims()))
    }
}

/// Checks a strategy's output against the problem it was asked to solve.
pub fn validate(problem: &Problem, packing: &Packing, algorithm: Algorithm) -> Result<()> {
    let kerf = problem.stock().kerf();
    let count = count_overlaps(&packing.placements, kerf);
    if count > 0 {
        return Err(Error::Collision { algorithm, count });
    }
    let outside = outside_block(problem, &packing.placements);
    if outside > 0 {
        return Err(Error::InvalidPlan {
            algorithm,
            reason: format!("{outside} placement(s) outside the block"),
        });
    }
    check_demand(problem, &packing.placements)?;
    if let Some(plan) = &packing.plan {
        plan.check_guillotine()
            .map_err(|reason| Error::InvalidPlan { algorithm, reason })?;
    }
    Ok(())
}

struct Attempt {
    algorithm: Algorithm,
    packing: Packing,
    attempted: Vec<Algorithm>,
    /// The chain ran into the deadline before settling on this result.
    hit_deadline: bool,
}

fn run_chain(problem: &Problem, options: &SolveOptions, deadline: Instant) -> Attempt {
    run_chain_with(problem, options, deadline, strategy_for)
}

fn run_chain_with(
    problem: &Problem,
    options: &SolveOptions,
    deadline: Instant,
    make: impl Fn(Algorithm) -> Box<dyn PackingStrategy>,
) -> Attempt {
    let primary = options.algorithm.unwrap_or(Algorithm::GuillotineDp);
    let ctx = PackContext {
        allow_rotation: options.allow_rotation,
        deadline: Some(deadline),
    };
    let mut attempted = Vec::new();
    let mut hit_deadline = false;

    for &next in std::iter::once(&primary).chain(primary.fallbacks()) {
        if ctx.expired() {
            tracing::warn!(algorithm = %next, "time budget exhausted before attempt");
            hit_deadline = true;
            break;
        }
        let strategy = make(next);
        let algorithm = strategy.algorithm();
        attempted.push(algorithm);
        let packing = strategy.pack(problem, &ctx);
        hit_deadline = ctx.expired();

        if let Err(e) = validate(problem, &packing, algorithm) {
            if cfg!(debug_assertions) {
                panic!("invariant violation: {e}");
            }
            tracing::error!(%algorithm, error = %e, "rejecting invalid packing");
            continue;
        }
        if packing.is_empty() {
            tracing::warn!(%algorithm, "attempt placed nothing, trying fallback");
            continue;
        }
        return Attempt {
            algorithm,
            packing,
            attempted,
            hit_deadline,
        };
    }

    Attempt {
        algorithm: primary,
        packing: Packing::default(),
        attempted,
        hit_deadline,
    }
}

fn shuffled(problem: &Problem, seed: u64) -> Problem {
    let mut parts = problem.parts().to_vec();
    parts.shuffle(&mut StdRng::seed_from_u64(seed));
    problem.reordered(parts)
}

/// Solves `problem` under `options`.
///
/// Never fails: infeasible input and an exhausted budget both come back as
/// an empty outcome, with `budget_exhausted` telling them apart.
pub fn solve(problem: &Problem, options: &SolveOptions) -> SolveOutcome {
    let started = Instant::now();
    let deadline = started + Duration::from_millis(options.time_budget_ms);
    let problem = match options.kerf {
        Some(kerf) => problem.clone().with_kerf(kerf),
        None => problem.clone(),
    };
    let iterations = options.iterations.max(1);

    let attempts: Vec<Attempt> = (0..iterations)
        .into_par_iter()
        .map(|i| {
            if i == 0 {
                run_chain(&problem, options, deadline)
            } else {
                let reordered = shuffled(&problem, options.seed.wrapping_add(i as u64));
                run_chain(&reordered, options, deadline)
            }
        })
        .collect();

    let mut best: Option<Attempt> = None;
    for attempt in attempts {
        let better = best
            .as_ref()
            .is_none_or(|b| attempt.packing.filled_volume() > b.packing.filled_volume());
        if better {
            best = Some(attempt);
        }
    }
    let Attempt {
        algorithm,
        packing,
        attempted,
        hit_deadline,
    } = best.unwrap_or_else(|| Attempt {
        algorithm: options.algorithm.unwrap_or(Algorithm::GuillotineDp),
        packing: Packing::default(),
        attempted: Vec::new(),
        hit_deadline: true,
    });

    let filled_volume = packing.filled_volume();
    let block_volume = problem.stock().volume();
    let utilization = filled_volume as f64 / block_volume as f64 * 100.0;
    let stats = Statistics {
        filled_volume,
        block_volume,
        utilization,
        waste: 100.0 - utilization,
        item_counts: placed_counts(&packing.placements),
        computation_time_ms: started.elapsed().as_millis() as u64,
        collisions: count_overlaps(&packing.placements, problem.stock().kerf()),
        algorithm,
        attempted,
        budget_exhausted: hit_deadline,
        iterations,
        dp: packing.dp,
    };
    tracing::info!(
        %algorithm,
        items = packing.placements.len(),
        utilization = stats.utilization,
        elapsed_ms = stats.computation_time_ms,
        "solve finished"
    );

    SolveOutcome {
        plan: packing.plan,
        placements: packing.placements,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dims, PartType, StockBlock};

    fn problem(block: Dims, parts: Vec<PartType>) -> Problem {
        Problem::new(StockBlock::new(block).unwrap(), parts).unwrap()
    }

    /// Hands back the same packing whatever it is asked to solve.
    struct Canned(Algorithm, Packing);

    impl PackingStrategy for Canned {
        fn algorithm(&self) -> Algorithm {
            self.0
        }

        fn pack(&self, _problem: &Problem, _ctx: &PackContext) -> Packing {
            self.1.clone()
        }
    }

    fn cube(x: u32, y: u32, z: u32) -> PlacedPart {
        PlacedPart {
            id: 1,
            x,
            y,
            z,
            dims: Dims::new(10, 10, 10),
        }
    }

    fn cubes(qty: u32) -> Problem {
        problem(
            Dims::new(100, 100, 100),
            vec![PartType::new(1, Dims::new(10, 10, 10), qty).unwrap()],
        )
    }

    fn placed(placements: Vec<PlacedPart>) -> Packing {
        Packing {
            plan: None,
            placements,
            dp: None,
        }
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_algorithm_names_round_trip() {
        for a in Algorithm::ALL {
            assert_eq!(a.name().parse::<Algorithm>().unwrap(), a);
            assert_eq!(serde_json::to_string(&a).unwrap(), format!("\"{}\"", a.name()));
        }
        assert_eq!(
            "simulated_annealing".parse::<Algorithm>(),
            Err(Error::UnknownAlgorithm("simulated_annealing".to_string()))
        );
    }

    #[test]
    fn test_options_defaults_from_empty_json() {
        let opts: SolveOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, SolveOptions::default());
        let opts: SolveOptions =
            serde_json::from_str(r#"{"algorithm": "first_fit", "kerf": 2}"#).unwrap();
        assert_eq!(opts.algorithm, Some(Algorithm::FirstFit));
        assert_eq!(opts.kerf, Some(2));
    }

    #[test]
    fn test_quantity_scenario_stats() {
        let p = problem(
            Dims::new(1000, 1000, 1000),
            vec![PartType::new(1, Dims::new(200, 200, 200), 10).unwrap()],
        );
        let out = solve(&p, &SolveOptions::default());
        assert_eq!(out.placements.len(), 10);
        assert_eq!(out.stats.item_counts.get(&1), Some(&10));
        assert!((out.stats.utilization - 8.0).abs() < 1e-9);
        assert!((out.stats.waste - 92.0).abs() < 1e-9);
        assert_eq!(out.stats.collisions, 0);
        assert_eq!(out.stats.algorithm, Algorithm::GuillotineDp);
        assert_eq!(out.stats.attempted, vec![Algorithm::GuillotineDp]);
        assert!(out.stats.dp.is_some());
    }

    #[test]
    fn test_infeasible_runs_whole_chain() {
        let p = problem(
            Dims::new(100, 100, 100),
            vec![PartType::new(1, Dims::new(200, 200, 200), 1).unwrap()],
        );
        let out = solve(&p, &SolveOptions::default());
        assert!(out.placements.is_empty());
        assert_eq!(
            out.stats.attempted,
            vec![
                Algorithm::GuillotineDp,
                Algorithm::Hybrid,
                Algorithm::TwoLevel,
                Algorithm::FirstFit
            ]
        );
        assert_eq!(out.stats.algorithm, Algorithm::GuillotineDp);
        assert_eq!(out.stats.filled_volume, 0);
        assert!(!out.stats.budget_exhausted);
    }

    #[test]
    fn test_zero_budget_attempts_nothing() {
        let p = problem(
            Dims::new(100, 100, 100),
            vec![PartType::new(1, Dims::new(10, 10, 10), 1).unwrap()],
        );
        let opts = SolveOptions {
            time_budget_ms: 0,
            ..SolveOptions::default()
        };
        let out = solve(&p, &opts);
        assert!(out.stats.attempted.is_empty());
        assert!(out.stats.budget_exhausted);
        assert!(out.plan.is_none());
    }

    #[test]
    fn test_kerf_override_applied() {
        let p = problem(
            Dims::new(100, 100, 50),
            vec![PartType::new(1, Dims::new(50, 100, 50), 2).unwrap()],
        );
        // Default kerf 4 leaves room for one part only
        assert_eq!(solve(&p, &SolveOptions::default()).placements.len(), 1);
        let opts = SolveOptions {
            kerf: Some(0),
            ..SolveOptions::default()
        };
        assert_eq!(solve(&p, &opts).placements.len(), 2);
    }

    #[test]
    fn test_multi_start_never_worse_than_single() {
        let p = problem(
            Dims::new(400, 300, 200),
            vec![
                PartType::new(1, Dims::new(150, 120, 90), 3).unwrap(),
                PartType::new(2, Dims::new(70, 70, 70), 8).unwrap(),
                PartType::new(3, Dims::new(190, 40, 40), 5).unwrap(),
            ],
        );
        let single = SolveOptions {
            algorithm: Some(Algorithm::FirstFit),
            ..SolveOptions::default()
        };
        let multi = SolveOptions {
            iterations: 4,
            seed: 7,
            ..single.clone()
        };
        let a = solve(&p, &single);
        let b = solve(&p, &multi);
        assert!(b.stats.filled_volume >= a.stats.filled_volume);
        assert_eq!(b.stats.iterations, 4);
        assert_eq!(b.stats.collisions, 0);
    }

    #[test]
    fn test_maximal_spaces_has_no_sequence() {
        let p = problem(
            Dims::new(100, 100, 100),
            vec![PartType::new(1, Dims::new(30, 30, 30), 4).unwrap()],
        );
        let opts = SolveOptions {
            algorithm: Some(Algorithm::MaximalSpaces),
            ..SolveOptions::default()
        };
        let out = solve(&p, &opts);
        assert_eq!(out.placements.len(), 4);
        assert!(out.sequence(&p).is_none());
        let dp = solve(&p, &SolveOptions::default());
        assert_eq!(dp.sequence(&p).unwrap().total_items(), 4);
    }

    #[test]
    fn test_validate_accepts_clean_packing() {
        let p = cubes(2);
        let packing = placed(vec![cube(0, 0, 0), cube(20, 0, 0)]);
        assert_eq!(validate(&p, &packing, Algorithm::FirstFit), Ok(()));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let p = cubes(2);
        let packing = placed(vec![cube(0, 0, 0), cube(5, 0, 0)]);
        assert!(matches!(
            validate(&p, &packing, Algorithm::FirstFit),
            Err(Error::Collision {
                algorithm: Algorithm::FirstFit,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_part_past_block_edge() {
        let p = cubes(1);
        let packing = placed(vec![cube(95, 0, 0)]);
        assert!(matches!(
            validate(&p, &packing, Algorithm::TwoLevel),
            Err(Error::InvalidPlan {
                algorithm: Algorithm::TwoLevel,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_extra_copy() {
        let p = cubes(1);
        let packing = placed(vec![cube(0, 0, 0), cube(50, 0, 0)]);
        assert_eq!(
            validate(&p, &packing, Algorithm::MaximalSpaces),
            Err(Error::DemandOverconsumption {
                id: 1,
                placed: 2,
                quantity: 1
            })
        );
    }

    #[test]
    fn test_validate_rejects_broken_plan() {
        let p = cubes(1);
        let leaf = PlanNode::leaf(Dims::new(10, 10, 10), 1, Dims::new(20, 20, 20), 1000);
        let packing = Packing {
            plan: Some(leaf),
            placements: Vec::new(),
            dp: None,
        };
        assert!(matches!(
            validate(&p, &packing, Algorithm::GuillotineDp),
            Err(Error::InvalidPlan {
                algorithm: Algorithm::GuillotineDp,
                ..
            })
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_colliding_strategy_panics_in_debug() {
        let p = cubes(2);
        let bad = placed(vec![cube(0, 0, 0), cube(0, 0, 0)]);
        run_chain_with(&p, &SolveOptions::default(), later(), |a| {
            Box::new(Canned(a, bad.clone()))
        });
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_colliding_strategy_falls_back_in_release() {
        let p = cubes(2);
        let opts = SolveOptions {
            algorithm: Some(Algorithm::TwoLevel),
            ..SolveOptions::default()
        };
        let attempt = run_chain_with(&p, &opts, later(), |a| {
            let placements = match a {
                Algorithm::TwoLevel => vec![cube(0, 0, 0), cube(0, 0, 0)],
                _ => vec![cube(0, 0, 0), cube(20, 0, 0)],
            };
            Box::new(Canned(a, placed(placements)))
        });
        assert_eq!(attempt.algorithm, Algorithm::FirstFit);
        assert_eq!(attempt.attempted, vec![Algorithm::TwoLevel, Algorithm::FirstFit]);
        assert_eq!(attempt.packing.placements.len(), 2);
    }

    #[test]
    fn test_chain_records_strategy_algorithm() {
        let p = cubes(1);
        let attempt = run_chain_with(&p, &SolveOptions::default(), later(), |a| {
            let placements = match a {
                Algorithm::GuillotineDp => Vec::new(),
                _ => vec![cube(0, 0, 0)],
            };
            Box::new(Canned(a, placed(placements)))
        });
        assert_eq!(attempt.algorithm, Algorithm::Hybrid);
        assert_eq!(attempt.attempted, vec![Algorithm::GuillotineDp, Algorithm::Hybrid]);
        assert!(!attempt.hit_deadline);
    }

    #[test]
    fn test_fast_solve_keeps_budget() {
        let out = solve(&cubes(3), &SolveOptions::default());
        assert_eq!(out.placements.len(), 3);
        assert!(!out.stats.budget_exhausted);
    }
}
