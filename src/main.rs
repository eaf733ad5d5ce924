use block_cutter::render;
use block_cutter::types::{DEFAULT_KERF, DEFAULT_MIN_SLICE};
use block_cutter::{Algorithm, Axis, Dims, PartType, Problem, SolveOptions, StockBlock, solve};
use clap::Parser;
use serde::Serialize;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "block_cutter",
    about = "3D guillotine cutting planner for a single stock block"
)]
struct Cli {
    /// Stock block dimensions (LxWxH, e.g. 1000x1000x1000)
    #[arg(long, value_parser = parse_dimensions)]
    block: Dims,

    /// Parts as LxWxH:qty[:id] (e.g. 200x200x200:10 120x80x40:6:7)
    #[arg(long = "parts", num_args = 1..)]
    parts: Vec<String>,

    /// Blade kerf in mm
    #[arg(long, default_value_t = DEFAULT_KERF)]
    kerf: u32,

    /// Smallest usable fragment in mm
    #[arg(long, default_value_t = DEFAULT_MIN_SLICE)]
    min_slice: u32,

    /// Axis cycle for the cutting stages (e.g. ZXY)
    #[arg(long, default_value = "ZXY")]
    stage_order: String,

    /// Disable part rotation
    #[arg(long)]
    no_rotate: bool,

    /// dp_rrp, hybrid, two_level, first_fit or maximal_spaces
    #[arg(long)]
    algorithm: Option<Algorithm>,

    /// Wall-clock budget in milliseconds
    #[arg(long, default_value_t = 60_000)]
    time_budget: u64,

    /// Independent attempts with shuffled part order
    #[arg(long, default_value_t = 1)]
    iterations: u32,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Show the plan outline and an ASCII view of every layer
    #[arg(long)]
    layout: bool,

    /// Print the operator cutting sequence
    #[arg(long)]
    sequence: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log progress to stderr
    #[arg(long)]
    verbose: bool,
}

fn parse_dimensions(s: &str) -> Result<Dims, String> {
    let dims: Dims = s.parse()?;
    if dims.min_side() == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok(dims)
}

fn parse_stage_order(s: &str) -> Result<Vec<Axis>, String> {
    let axes = s
        .chars()
        .map(Axis::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    if axes.is_empty() {
        return Err("stage order must name at least one axis".to_string());
    }
    Ok(axes)
}

fn parse_part(s: &str, index: usize) -> Result<PartType, String> {
    let fields: Vec<&str> = s.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(format!("invalid part '{}', expected LxWxH:qty[:id]", s));
    }
    let dims = parse_dimensions(fields[0])?;
    let qty = fields[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    let id = match fields.get(2) {
        Some(id) => id
            .parse::<u32>()
            .map_err(|_| format!("invalid id in '{}'", s))?,
        None => index as u32 + 1,
    };
    PartType::new(id, dims, qty).map_err(|e| e.to_string())
}

fn build_problem(cli: &Cli) -> Result<Problem, String> {
    let stage_order = parse_stage_order(&cli.stage_order)?;
    let stock = StockBlock::new(cli.block)
        .and_then(|s| {
            s.with_kerf(cli.kerf)
                .with_min_slice(cli.min_slice)
                .with_stage_order(stage_order)
        })
        .map_err(|e| e.to_string())?;
    let parts = cli
        .parts
        .iter()
        .enumerate()
        .map(|(i, p)| parse_part(p, i))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.is_empty() {
        return Err("at least one part is required".to_string());
    }
    Problem::new(stock, parts).map_err(|e| e.to_string())
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    stats: &'a block_cutter::Statistics,
    placements: &'a [block_cutter::PlacedPart],
    #[serde(skip_serializing_if = "Option::is_none")]
    cutting_sequence: Option<block_cutter::sequence::SequenceSummary<'a>>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if cli.verbose { Level::INFO } else { Level::WARN })
        .init();

    let problem = build_problem(&cli).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let options = SolveOptions {
        kerf: None,
        allow_rotation: !cli.no_rotate,
        time_budget_ms: cli.time_budget,
        algorithm: cli.algorithm,
        iterations: cli.iterations,
        seed: cli.seed,
    };
    let outcome = solve(&problem, &options);
    let sequence = if cli.sequence {
        outcome.sequence(&problem)
    } else {
        None
    };

    if cli.json {
        let output = JsonOutput {
            stats: &outcome.stats,
            placements: &outcome.placements,
            cutting_sequence: sequence.as_ref().map(|s| s.summary()),
        };
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let stock = problem.stock().dims();
    println!("Block {}:", stock);
    for p in &outcome.placements {
        println!("  {}", p);
    }

    if cli.layout {
        if let Some(plan) = &outcome.plan {
            println!();
            println!("Plan: {} cuts, depth {}", plan.cut_count(), plan.depth());
            print!("{}", render::render_plan(plan));
        }
        let mut layers: Vec<u32> = outcome.placements.iter().map(|p| p.z).collect();
        layers.sort_unstable();
        layers.dedup();
        for z in layers {
            println!();
            println!("Layer z={}:", z);
            print!("{}", render::render_layer(stock, &outcome.placements, z));
        }
    }

    if cli.sequence {
        println!();
        match &sequence {
            Some(seq) => {
                for op in seq.operations() {
                    println!("{:>4} {:<9} {}", op.seq, op.operation, op.description);
                }
                for c in seq.conflicts() {
                    println!("Conflict: {}", c.description);
                }
            }
            None => println!("No cutting sequence: {} layouts are not guillotine", outcome.stats.algorithm),
        }
    }

    let stats = &outcome.stats;
    println!();
    println!(
        "Summary: {} of {} parts placed by {}, {:.1}% utilization, {:.1}% waste, {} ms",
        outcome.placements.len(),
        problem.total_quantity(),
        stats.algorithm,
        stats.utilization,
        stats.waste,
        stats.computation_time_ms,
    );
    if stats.budget_exhausted {
        println!("Time budget exhausted; result may be partial");
    }
}
