use crate::selector::Algorithm;

/// Errors raised by the cutting planner.
///
/// Input problems are rejected before any search starts. `Collision`,
/// `InvalidPlan` and `DemandOverconsumption` are internal invariant
/// violations: a plan that produces one is never handed back to a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid stock block: {field} {reason}")]
    InvalidStock { field: &'static str, reason: String },

    #[error("invalid part {id}: {field} {reason}")]
    InvalidPart {
        id: u32,
        field: &'static str,
        reason: String,
    },

    #[error("duplicate part id {0}")]
    DuplicatePartId(u32),

    #[error("unknown algorithm '{0}', expected: dp_rrp, hybrid, two_level, first_fit, maximal_spaces")]
    UnknownAlgorithm(String),

    #[error("{algorithm} produced {count} overlapping placement pair(s)")]
    Collision { algorithm: Algorithm, count: usize },

    #[error("{algorithm} produced an invalid plan: {reason}")]
    InvalidPlan { algorithm: Algorithm, reason: String },

    #[error("part {id} placed {placed} times but only {quantity} requested")]
    DemandOverconsumption { id: u32, placed: u32, quantity: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
