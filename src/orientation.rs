use crate::types::{Dims, PartType, Problem};

/// Distinct (length, width, height) permutations of `dims`, declared
/// orientation first.
pub fn orientations(dims: Dims, allow_rotation: bool) -> Vec<Dims> {
    let (a, b, c) = (dims.length, dims.width, dims.height);
    if !allow_rotation {
        return vec![dims];
    }
    let perms = [
        (a, b, c),
        (a, c, b),
        (b, a, c),
        (b, c, a),
        (c, a, b),
        (c, b, a),
    ];
    let mut out: Vec<Dims> = Vec::with_capacity(6);
    for (l, w, h) in perms {
        let d = Dims::new(l, w, h);
        if !out.contains(&d) {
            out.push(d);
        }
    }
    out
}

pub fn part_orientations(part: &PartType, allow_rotation: bool) -> Vec<Dims> {
    orientations(part.dims(), allow_rotation && part.allow_rotation())
}

/// One (part type, orientation) pair the solvers may place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    /// Index of the part type in the problem's part list.
    pub part: usize,
    pub id: u32,
    pub dims: Dims,
    pub unit_value: u64,
}

/// Every variant of every part, in input order.
pub fn variants(problem: &Problem, allow_rotation: bool) -> Vec<Variant> {
    problem
        .parts()
        .iter()
        .enumerate()
        .flat_map(|(idx, part)| {
            part_orientations(part, allow_rotation)
                .into_iter()
                .map(move |dims| Variant {
                    part: idx,
                    id: part.id(),
                    dims,
                    unit_value: part.unit_value(),
                })
        })
        .collect()
}
