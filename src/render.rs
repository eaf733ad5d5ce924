use std::fmt::Write;

use crate::plan::PlanNode;
use crate::types::{Dims, PlacedPart};

const MAX_WIDTH: f64 = 80.0;
const MAX_HEIGHT: f64 = 40.0;

/// Indented text outline of a plan, one node per line.
pub fn render_plan(plan: &PlanNode) -> String {
    let mut out = String::new();
    write_node(&mut out, plan, 0, "");
    out
}

fn write_node(out: &mut String, node: &PlanNode, depth: usize, label: &str) {
    let indent = "  ".repeat(depth);
    let _ = match node {
        PlanNode::Empty { extent } => writeln!(out, "{indent}{label}waste {extent}"),
        PlanNode::Leaf { extent, id, dims, .. } => {
            writeln!(out, "{indent}{label}part #{id} {dims} in {extent}")
        }
        PlanNode::Grid {
            extent,
            id,
            dims,
            counts,
            count,
            ..
        } => writeln!(
            out,
            "{indent}{label}grid {count} x part #{id} {dims} ({}x{}x{}) in {extent}",
            counts[0], counts[1], counts[2]
        ),
        PlanNode::Cut {
            extent,
            axis,
            at,
            value,
            before,
            after,
            ..
        } => {
            let _ = writeln!(out, "{indent}{label}cut {axis} at {at} in {extent} (value {value})");
            write_node(out, before, depth + 1, "< ");
            write_node(out, after, depth + 1, "> ");
            Ok(())
        }
    };
}

/// ASCII top view of the parts crossing the horizontal plane at height `z`.
pub fn render_layer(stock: Dims, placements: &[PlacedPart], z: u32) -> String {
    let scale = f64::min(
        MAX_WIDTH / stock.length as f64,
        MAX_HEIGHT / stock.width as f64,
    );
    let grid_w = (stock.length as f64 * scale).round() as usize;
    let grid_h = (stock.width as f64 * scale).round() as usize;

    if grid_w == 0 || grid_h == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; grid_w + 1]; grid_h + 1];

    draw_rect(&mut grid, 0, 0, grid_w, grid_h);

    for p in placements.iter().filter(|p| p.z <= z && z < p.z + p.dims.height) {
        let sx = (p.x as f64 * scale).round() as usize;
        let sy = (p.y as f64 * scale).round() as usize;
        let sw = (p.dims.length as f64 * scale).round() as usize;
        let sh = (p.dims.width as f64 * scale).round() as usize;

        if sw == 0 || sh == 0 {
            continue;
        }

        draw_rect(&mut grid, sx, sy, sw, sh);

        let label: Vec<char> = format!("#{}", p.id).chars().collect();
        if sw > 2 && sh > 0 {
            let cx = sx + sw / 2;
            let cy = sy + sh / 2;
            let start_x = cx.saturating_sub(label.len() / 2);

            for (i, &ch) in label.iter().enumerate() {
                let x = start_x + i;
                if x > sx && x < sx + sw && cy > sy && cy < sy + sh {
                    grid[cy][x] = ch;
                }
            }
        }
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

fn edge(current: char, line: char) -> char {
    if current == '+' || (current != ' ' && current != line) {
        '+'
    } else {
        line
    }
}

fn draw_rect(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    let rows = grid.len();
    let Some(cols) = grid.first().map(|r| r.len()) else {
        return;
    };

    for i in (x..=x + w).filter(|&i| i < cols) {
        for j in [y, y + h].into_iter().filter(|&j| j < rows) {
            grid[j][i] = edge(grid[j][i], '-');
        }
    }
    for j in (y..=y + h).filter(|&j| j < rows) {
        for i in [x, x + w].into_iter().filter(|&i| i < cols) {
            grid[j][i] = edge(grid[j][i], '|');
        }
    }
    for cx in [x, x + w] {
        for cy in [y, y + h] {
            if cy < rows && cx < cols {
                grid[cy][cx] = '+';
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::Axis;

    fn part(id: u32, x: u32, z: u32, dims: Dims) -> PlacedPart {
        PlacedPart { id, x, y: 0, z, dims }
    }

    #[test]
    fn test_layer_shows_crossing_parts_only() {
        let stock = Dims::new(100, 50, 100);
        let placements = vec![
            part(1, 0, 0, Dims::new(40, 50, 30)),
            part(2, 50, 40, Dims::new(40, 50, 30)),
        ];
        let low = render_layer(stock, &placements, 10);
        assert!(low.contains("#1"));
        assert!(!low.contains("#2"));
        let high = render_layer(stock, &placements, 45);
        assert!(high.contains("#2"));
        assert!(!high.contains("#1"));
    }

    #[test]
    fn test_empty_layer_still_draws_border() {
        let output = render_layer(Dims::new(100, 100, 100), &[], 0);
        assert!(output.contains('+'));
        assert!(output.contains('|'));
    }

    #[test]
    fn test_plan_outline() {
        let dims = Dims::new(50, 50, 50);
        let leaf = Arc::new(PlanNode::leaf(dims, 3, dims, dims.volume()));
        let rest = Arc::new(PlanNode::empty(Dims::new(46, 50, 50)));
        let plan = PlanNode::cut(Dims::new(100, 50, 50), Axis::X, 50, 4, leaf, rest);
        let text = render_plan(&plan);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cut X at 50 in 100x50x50"));
        assert_eq!(lines[1], "  < part #3 50x50x50 in 50x50x50");
        assert_eq!(lines[2], "  > waste 46x50x50");
    }
}
