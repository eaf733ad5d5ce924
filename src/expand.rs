use crate::plan::PlanNode;
use crate::types::{Axis, Dims, PlacedPart};

/// Flattens a plan into absolute placements, depth first, `before` children
/// ahead of `after` children.
pub fn expand(plan: &PlanNode) -> Vec<PlacedPart> {
    expand_from(plan, [0, 0, 0])
}

/// Same as [`expand`] for a subtree whose region starts at `origin`.
pub(crate) fn expand_from(node: &PlanNode, origin: [u32; 3]) -> Vec<PlacedPart> {
    let mut out = Vec::with_capacity(node.item_count() as usize);
    expand_at(node, origin, &mut out);
    out
}

fn expand_at(node: &PlanNode, origin: [u32; 3], out: &mut Vec<PlacedPart>) {
    match node {
        PlanNode::Empty { .. } => {}
        PlanNode::Leaf { id, dims, .. } => out.push(placed(*id, origin, *dims)),
        PlanNode::Grid {
            id,
            dims,
            counts,
            count,
            kerf,
            ..
        } => {
            let [nx, ny, _] = *counts;
            let pitch = Axis::ALL.map(|a| dims.get(a).saturating_add(*kerf));
            for k in 0..*count {
                let cell = [k % nx, (k / nx) % ny, k / (nx * ny)];
                let at = [0, 1, 2].map(|i| origin[i] + cell[i] * pitch[i]);
                out.push(placed(*id, at, *dims));
            }
        }
        PlanNode::Cut {
            axis,
            at,
            kerf,
            before,
            after,
            ..
        } => {
            expand_at(before, origin, out);
            let mut shifted = origin;
            shifted[axis.index()] += at + kerf;
            expand_at(after, shifted, out);
        }
    }
}

fn placed(id: u32, origin: [u32; 3], dims: Dims) -> PlacedPart {
    PlacedPart {
        id,
        x: origin[0],
        y: origin[1],
        z: origin[2],
        dims,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_after_child_offset_by_cut_and_kerf() {
        let part = Dims::new(40, 50, 50);
        let leaf = || Arc::new(PlanNode::leaf(part, 1, part, part.volume()));
        let plan = PlanNode::cut(Dims::new(90, 50, 50), Axis::X, 45, 5, leaf(), leaf());
        let placed = expand(&plan);
        assert_eq!(placed.len(), 2);
        assert_eq!((placed[0].x, placed[0].y, placed[0].z), (0, 0, 0));
        assert_eq!((placed[1].x, placed[1].y, placed[1].z), (50, 0, 0));
    }

    #[test]
    fn test_nested_cuts_accumulate_offsets() {
        let part = Dims::new(10, 10, 10);
        let leaf = || Arc::new(PlanNode::leaf(part, 3, part, 1000));
        let inner = Arc::new(PlanNode::cut(Dims::new(10, 10, 30), Axis::Z, 12, 2, leaf(), leaf()));
        let plan = PlanNode::cut(Dims::new(40, 10, 30), Axis::X, 20, 3, leaf(), inner);
        let placed = expand(&plan);
        assert_eq!(placed.len(), 3);
        assert_eq!((placed[1].x, placed[1].z), (23, 0));
        assert_eq!((placed[2].x, placed[2].z), (23, 14));
    }

    #[test]
    fn test_grid_partial_lattice_order() {
        let plan = PlanNode::grid(
            Dims::new(100, 100, 100),
            2,
            Dims::new(20, 30, 40),
            [4, 3, 2],
            14,
            2,
            24_000,
        );
        let placed = expand(&plan);
        assert_eq!(placed.len(), 14);
        assert_eq!((placed[0].x, placed[0].y, placed[0].z), (0, 0, 0));
        assert_eq!((placed[3].x, placed[3].y), (66, 0));
        assert_eq!((placed[4].x, placed[4].y), (0, 32));
        // 13th copy opens the second layer
        assert_eq!((placed[12].x, placed[12].y, placed[12].z), (0, 0, 42));
        assert_eq!(placed.iter().map(|p| p.volume()).sum::<u64>(), plan.value());
    }

    #[test]
    fn test_expand_is_idempotent() {
        let plan = PlanNode::grid(
            Dims::new(50, 50, 50),
            1,
            Dims::new(10, 10, 10),
            [4, 4, 4],
            20,
            3,
            1000,
        );
        assert_eq!(expand(&plan), expand(&plan));
        assert!(expand(&PlanNode::empty(Dims::new(5, 5, 5))).is_empty());
    }
}
