use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::types::{Axis, Dims};

/// A node of the binary cutting tree.
///
/// Children are shared behind `Arc` so the solver can reuse memoized
/// subtrees without copying them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNode {
    /// Region with nothing placed in it.
    Empty { extent: Dims },
    /// Straight cut across the whole extent. `before` holds the material in
    /// `[0, at)` along `axis`, `after` the material in `[at + kerf, extent)`.
    Cut {
        extent: Dims,
        axis: Axis,
        at: u32,
        kerf: u32,
        value: u64,
        before: Arc<PlanNode>,
        after: Arc<PlanNode>,
    },
    /// One part at the region origin.
    Leaf {
        extent: Dims,
        id: u32,
        dims: Dims,
        value: u64,
    },
    /// `count` copies of one oriented part on a lattice of `counts` cells,
    /// filled X first, then Y, then Z.
    Grid {
        extent: Dims,
        id: u32,
        dims: Dims,
        counts: [u32; 3],
        count: u32,
        kerf: u32,
        value: u64,
    },
}

impl PlanNode {
    pub fn empty(extent: Dims) -> Self {
        PlanNode::Empty { extent }
    }

    pub fn leaf(extent: Dims, id: u32, dims: Dims, unit_value: u64) -> Self {
        PlanNode::Leaf {
            extent,
            id,
            dims,
            value: unit_value,
        }
    }

    /// Grid of `count` copies inside a lattice of at most `counts` cells. The
    /// lattice is shrunk to the smallest one that still holds `count` copies.
    pub fn grid(
        extent: Dims,
        id: u32,
        dims: Dims,
        counts: [u32; 3],
        count: u32,
        kerf: u32,
        unit_value: u64,
    ) -> Self {
        let [nx, ny, nz] = counts;
        let layer = nx as u64 * ny as u64;
        let counts = if count as u64 >= layer * nz as u64 {
            counts
        } else if count as u64 > layer {
            [nx, ny, (count as u64).div_ceil(layer) as u32]
        } else if count > nx {
            [nx, count.div_ceil(nx), 1]
        } else {
            [count, 1, 1]
        };
        PlanNode::Grid {
            extent,
            id,
            dims,
            counts,
            count,
            kerf,
            value: count as u64 * unit_value,
        }
    }

    pub fn cut(
        extent: Dims,
        axis: Axis,
        at: u32,
        kerf: u32,
        before: Arc<PlanNode>,
        after: Arc<PlanNode>,
    ) -> Self {
        PlanNode::Cut {
            extent,
            axis,
            at,
            kerf,
            value: before.value() + after.value(),
            before,
            after,
        }
    }

    pub fn extent(&self) -> Dims {
        match self {
            PlanNode::Empty { extent }
            | PlanNode::Cut { extent, .. }
            | PlanNode::Leaf { extent, .. }
            | PlanNode::Grid { extent, .. } => *extent,
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            PlanNode::Empty { .. } => 0,
            PlanNode::Cut { value, .. }
            | PlanNode::Leaf { value, .. }
            | PlanNode::Grid { value, .. } => *value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    /// Same node describing a larger region. Only the top node changes.
    pub fn with_extent(&self, extent: Dims) -> Self {
        let mut node = self.clone();
        match &mut node {
            PlanNode::Empty { extent: e }
            | PlanNode::Cut { extent: e, .. }
            | PlanNode::Leaf { extent: e, .. }
            | PlanNode::Grid { extent: e, .. } => *e = extent,
        }
        node
    }

    /// Exact before/after regions of a cut node.
    pub fn regions(&self) -> Option<(Dims, Dims)> {
        match self {
            PlanNode::Cut {
                extent,
                axis,
                at,
                kerf,
                ..
            } => {
                let rest = extent.get(*axis).saturating_sub(at + kerf);
                Some((extent.with(*axis, *at), extent.with(*axis, rest)))
            }
            _ => None,
        }
    }

    pub fn item_count(&self) -> u64 {
        match self {
            PlanNode::Empty { .. } => 0,
            PlanNode::Leaf { .. } => 1,
            PlanNode::Grid { count, .. } => *count as u64,
            PlanNode::Cut { before, after, .. } => before.item_count() + after.item_count(),
        }
    }

    pub fn cut_count(&self) -> usize {
        match self {
            PlanNode::Cut { before, after, .. } => 1 + before.cut_count() + after.cut_count(),
            _ => 0,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            PlanNode::Cut { before, after, .. } => 1 + before.depth().max(after.depth()),
            _ => 0,
        }
    }

    pub fn counts_by_part(&self) -> BTreeMap<u32, u32> {
        let mut counts = BTreeMap::new();
        self.collect_counts(&mut counts);
        counts
    }

    fn collect_counts(&self, counts: &mut BTreeMap<u32, u32>) {
        match self {
            PlanNode::Empty { .. } => {}
            PlanNode::Leaf { id, .. } => *counts.entry(*id).or_insert(0) += 1,
            PlanNode::Grid { id, count, .. } => *counts.entry(*id).or_insert(0) += count,
            PlanNode::Cut { before, after, .. } => {
                before.collect_counts(counts);
                after.collect_counts(counts);
            }
        }
    }

    /// Checks the guillotine invariants on every node: each cut splits its
    /// extent into `at + kerf + rest`, each child fits inside its side of
    /// the cut, and leaves stay inside their extent.
    pub fn check_guillotine(&self) -> Result<(), String> {
        match self {
            PlanNode::Empty { .. } => Ok(()),
            PlanNode::Leaf { extent, dims, .. } => {
                if dims.fits_in(extent) {
                    Ok(())
                } else {
                    Err(format!("leaf {} exceeds extent {}", dims, extent))
                }
            }
            PlanNode::Grid {
                extent,
                dims,
                counts,
                count,
                kerf,
                ..
            } => {
                for axis in Axis::ALL {
                    let n = counts[axis.index()] as u64;
                    let pitch = dims.get(axis) as u64 + *kerf as u64;
                    if n == 0 || n * pitch - *kerf as u64 > extent.get(axis) as u64 {
                        return Err(format!(
                            "grid {:?} of {} does not fit extent {} on {}",
                            counts, dims, extent, axis
                        ));
                    }
                }
                let cells = counts.iter().map(|&c| c as u64).product::<u64>();
                if *count == 0 || *count as u64 > cells {
                    return Err(format!("grid count {} outside lattice {:?}", count, counts));
                }
                Ok(())
            }
            PlanNode::Cut {
                extent,
                axis,
                at,
                kerf,
                value,
                before,
                after,
            } => {
                if *at as u64 + *kerf as u64 > extent.get(*axis) as u64 {
                    return Err(format!(
                        "cut {} at {} + kerf {} exceeds extent {}",
                        axis, at, kerf, extent
                    ));
                }
                let (before_region, after_region) = self.regions().unwrap_or_default();
                if before_region.get(*axis) + kerf + after_region.get(*axis) != extent.get(*axis) {
                    return Err(format!("cut {} at {} does not rebuild {}", axis, at, extent));
                }
                if !before.extent().fits_in(&before_region) {
                    return Err(format!(
                        "before child {} exceeds region {}",
                        before.extent(),
                        before_region
                    ));
                }
                if !after.extent().fits_in(&after_region) {
                    return Err(format!(
                        "after child {} exceeds region {}",
                        after.extent(),
                        after_region
                    ));
                }
                if *value != before.value() + after.value() {
                    return Err(format!("cut value {} is not the sum of its children", value));
                }
                before.check_guillotine()?;
                after.check_guillotine()
            }
        }
    }
}
