//! Numbered cutting program for the saw operator.
//!
//! The plan tree only records cuts. The sequence makes every intermediate
//! piece explicit: each cut yields two sub-blocks, and every part becomes an
//! item node hanging off the piece it is taken from. Nodes are numbered in
//! pre-order, which is the order an operator would work through them.

use serde::Serialize;

use crate::expand;
use crate::plan::PlanNode;
use crate::types::{Axis, Dims};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Block,
    Cut,
    SubBlock,
    Item,
}

impl NodeKind {
    fn operation(self) -> &'static str {
        match self {
            NodeKind::Block => "START",
            NodeKind::Cut => "CUT",
            NodeKind::SubBlock => "SUB-BLOCK",
            NodeKind::Item => "ITEM",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Point {
    fn from_array([x, y, z]: [u32; 3]) -> Self {
        Self { x, y, z }
    }

    fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceNode {
    /// 1-based position in the cutting program.
    pub seq: usize,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Cut axis, cut nodes only.
    pub axis: Option<Axis>,
    /// Cut offset from the start of the piece being cut, cut nodes only.
    pub position: Option<u32>,
    pub origin: Point,
    pub dims: Dims,
    pub item_id: Option<u32>,
    pub parent: Option<usize>,
    pub depth: usize,
}

impl SequenceNode {
    fn overlaps(&self, other: &SequenceNode) -> bool {
        Axis::ALL.iter().all(|&a| {
            let (a0, b0) = (self.origin.get(a), other.origin.get(a));
            a0 < b0 + other.dims.get(a) && b0 < a0 + self.dims.get(a)
        })
    }

    fn description(&self) -> String {
        match self.kind {
            NodeKind::Block => format!("Stock block {} mm", self.dims),
            NodeKind::Cut => format!(
                "Cut {} at {} mm across {} piece",
                self.axis.map_or_else(|| "?".to_string(), |a| a.to_string()),
                self.position.unwrap_or_default(),
                self.dims
            ),
            NodeKind::SubBlock => format!(
                "Sub-block {} mm at ({}, {}, {})",
                self.dims, self.origin.x, self.origin.y, self.origin.z
            ),
            NodeKind::Item => format!(
                "Part #{} {} mm at ({}, {}, {})",
                self.item_id.unwrap_or_default(),
                self.dims,
                self.origin.x,
                self.origin.y,
                self.origin.z
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub cut1_seq: usize,
    pub cut2_seq: usize,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Operation<'a> {
    pub seq: usize,
    pub operation: &'static str,
    pub description: String,
    pub node: &'a SequenceNode,
}

/// JSON view of a cutting sequence.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceSummary<'a> {
    pub total_nodes: usize,
    pub total_cuts: usize,
    pub total_items: usize,
    pub total_subblocks: usize,
    pub max_depth: usize,
    pub sequence: Vec<Operation<'a>>,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Default)]
pub struct CuttingSequence {
    nodes: Vec<SequenceNode>,
}

/// Builds the operator program for `plan` cut out of a block of `stock`.
pub fn build_sequence(plan: &PlanNode, stock: Dims) -> CuttingSequence {
    let mut seq = CuttingSequence::default();
    let root = seq.push(NodeKind::Block, [0; 3], stock, None, 0);
    seq.walk(plan, root, [0; 3], stock, 1);
    seq
}

impl CuttingSequence {
    fn push(
        &mut self,
        kind: NodeKind,
        origin: [u32; 3],
        dims: Dims,
        parent: Option<usize>,
        depth: usize,
    ) -> usize {
        let seq = self.nodes.len() + 1;
        self.nodes.push(SequenceNode {
            seq,
            kind,
            axis: None,
            position: None,
            origin: Point::from_array(origin),
            dims,
            item_id: None,
            parent,
            depth,
        });
        seq
    }

    /// `region` is the piece actually on the saw. Plan extents below the
    /// root may be rounded down to what the parts can occupy, so cut and
    /// sub-block sizes come from `region` instead.
    fn walk(
        &mut self,
        node: &PlanNode,
        parent: usize,
        origin: [u32; 3],
        region: Dims,
        depth: usize,
    ) {
        match node {
            PlanNode::Empty { .. } => {}
            PlanNode::Leaf { .. } | PlanNode::Grid { .. } => {
                for part in expand::expand_from(node, origin) {
                    let at = [part.x, part.y, part.z];
                    let seq = self.push(NodeKind::Item, at, part.dims, Some(parent), depth);
                    self.nodes[seq - 1].item_id = Some(part.id);
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
                let cut = self.push(NodeKind::Cut, origin, region, Some(parent), depth);
                self.nodes[cut - 1].axis = Some(*axis);
                self.nodes[cut - 1].position = Some(*at);

                let len = region.get(*axis);
                let before_dims = region.with(*axis, (*at).min(len));
                let after_dims = region.with(*axis, len.saturating_sub(at.saturating_add(*kerf)));
                let mut after_origin = origin;
                after_origin[axis.index()] += at + kerf;

                for (child, dims, corner) in [
                    (before, before_dims, origin),
                    (after, after_dims, after_origin),
                ] {
                    let piece = self.push(NodeKind::SubBlock, corner, dims, Some(cut), depth + 1);
                    self.walk(child, piece, corner, dims, depth + 2);
                }
            }
        }
    }

    pub fn nodes(&self) -> &[SequenceNode] {
        &self.nodes
    }

    fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    pub fn total_cuts(&self) -> usize {
        self.count(NodeKind::Cut)
    }

    pub fn total_items(&self) -> usize {
        self.count(NodeKind::Item)
    }

    pub fn total_subblocks(&self) -> usize {
        self.count(NodeKind::SubBlock)
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn operations(&self) -> Vec<Operation<'_>> {
        self.nodes
            .iter()
            .map(|n| Operation {
                seq: n.seq,
                operation: n.kind.operation(),
                description: n.description(),
                node: n,
            })
            .collect()
    }

    fn is_ancestor(&self, ancestor: usize, mut seq: usize) -> bool {
        while let Some(parent) = self.nodes[seq - 1].parent {
            if parent == ancestor {
                return true;
            }
            seq = parent;
        }
        false
    }

    /// Pairs of cuts that share space without one containing the other.
    /// Always empty for a well-formed guillotine plan.
    pub fn conflicts(&self) -> Vec<Conflict> {
        let cuts: Vec<&SequenceNode> = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Cut)
            .collect();
        let mut out = Vec::new();
        for (i, a) in cuts.iter().enumerate() {
            for b in &cuts[i + 1..] {
                if self.is_ancestor(a.seq, b.seq) || self.is_ancestor(b.seq, a.seq) {
                    continue;
                }
                if a.overlaps(b) {
                    out.push(Conflict {
                        cut1_seq: a.seq,
                        cut2_seq: b.seq,
                        description: format!(
                            "cut #{} ({}) intersects cut #{} ({})",
                            a.seq,
                            a.axis.map_or_else(String::new, |x| x.to_string()),
                            b.seq,
                            b.axis.map_or_else(String::new, |x| x.to_string()),
                        ),
                    });
                }
            }
        }
        out
    }

    pub fn summary(&self) -> SequenceSummary<'_> {
        SequenceSummary {
            total_nodes: self.nodes.len(),
            total_cuts: self.total_cuts(),
            total_items: self.total_items(),
            total_subblocks: self.total_subblocks(),
            max_depth: self.max_depth(),
            sequence: self.operations(),
            conflicts: self.conflicts(),
        }
    }
}
