//! Three-dimensional guillotine cutting of a stock block into parts.

pub mod demand;
pub mod dp;
pub mod error;
pub mod expand;
pub mod orientation;
pub mod plan;
pub mod raster;
pub mod render;
pub mod selector;
pub mod sequence;
pub mod strategy;
pub mod types;
pub mod verify;

pub use error::{Error, Result};
pub use expand::expand;
pub use plan::PlanNode;
pub use selector::{Algorithm, SolveOptions, SolveOutcome, Statistics, solve};
pub use sequence::{CuttingSequence, build_sequence};
pub use types::{Axis, Dims, PartType, PlacedPart, Problem, StockBlock};
pub use verify::count_overlaps;
