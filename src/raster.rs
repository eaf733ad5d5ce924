//! Candidate cut positions and dimension snapping.
//!
//! A cut can sit at any integer offset, which makes a naive search hopeless
//! for blocks above a few hundred millimetres. Two devices keep it small:
//!
//! - [`raster_points`] reduces the candidate offsets along one axis to GCD
//!   multiples and partial sums of the part sizes, mirrored to the first half
//!   of the axis.
//! - [`SnapAxis`] rounds an extent down to the largest length that a row of
//!   parts plus kerfs can actually occupy. Two extents that snap to the same
//!   value hold exactly the same arrangements, so the solver memoizes on the
//!   snapped value.

use std::collections::BTreeSet;

/// Extents above this length skip the snapping table.
const MAX_SNAP_LEN: u32 = 1 << 20;

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn gcd_all(values: &[u32]) -> u32 {
    let g = values.iter().filter(|&&v| v > 0).fold(0, |g, &v| gcd(g, v));
    g.max(1)
}

/// Reduced raster points along an axis of length `len`.
///
/// `sizes` are the part sizes on this axis, each already incremented by the
/// kerf. Partial sums use at most `max_prefix` distinct sizes.
pub fn raster_points(
    len: u32,
    sizes: &[u32],
    kerf: u32,
    min_slice: u32,
    max_prefix: usize,
) -> Vec<u32> {
    let mut cand = BTreeSet::new();

    let base = gcd_all(sizes).max(kerf) as u64;
    let mut t = base;
    while t < len as u64 {
        cand.insert(t as u32);
        t += base;
    }

    let uniq: Vec<u32> = sizes
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|&u| u as u64 + min_slice as u64 <= len as u64)
        .take(max_prefix)
        .collect();
    let mut sums: BTreeSet<u64> = BTreeSet::from([0]);
    for u in uniq {
        let next: Vec<u64> = sums.iter().map(|p| p + u as u64).collect();
        sums.extend(next);
    }
    let upper = len.saturating_sub(min_slice) as u64;
    for p in sums {
        if p > min_slice as u64 && p < upper {
            cand.insert(p as u32);
        }
    }

    let mut filtered: Vec<u32> = Vec::new();
    for p in cand {
        if p < min_slice || len - p < min_slice {
            continue;
        }
        match filtered.last() {
            Some(&last) if p - last < kerf => {}
            _ => filtered.push(p),
        }
    }

    let half: Vec<u32> = filtered.iter().copied().filter(|&p| p <= len / 2).collect();
    if half.is_empty() { filtered } else { half }
}

/// Drops cut points whose "before" piece snaps to the same length as an
/// earlier point. The earlier point leaves a larger "after" piece, so the
/// later one can never do better.
pub fn drop_dominated(points: Vec<u32>, snap: &SnapAxis) -> Vec<u32> {
    let mut last: Option<u32> = None;
    points
        .into_iter()
        .filter(|&p| {
            let s = snap.snap(p);
            if last == Some(s) {
                false
            } else {
                last = Some(s);
                true
            }
        })
        .collect()
}

/// Per-axis snapping table: `snap(v)` is the largest `Σ nᵢ(sᵢ + kerf) − kerf`
/// not exceeding `v`, or 0 when no part size fits.
#[derive(Debug, Clone)]
pub struct SnapAxis {
    floor: Option<Vec<u32>>,
}

impl SnapAxis {
    /// `sizes` are raw part sizes on this axis (without kerf). The table
    /// has one entry per occupied length in `[0, len]`, whatever the kerf.
    pub fn new(len: u32, sizes: &[u32], kerf: u32) -> Self {
        if len > MAX_SNAP_LEN {
            return Self { floor: None };
        }
        let len = len as usize;
        let kerf = kerf as usize;
        let sizes: BTreeSet<usize> = sizes
            .iter()
            .map(|&s| s as usize)
            .filter(|&s| s > 0 && s <= len)
            .collect();

        // reach[v]: some row of parts plus kerfs occupies exactly v
        let mut reach = vec![false; len + 1];
        for v in 1..=len {
            reach[v] = sizes.iter().any(|&s| {
                v == s || (s + kerf < v && reach[v - s - kerf])
            });
        }

        let mut floor = vec![0u32; len + 1];
        let mut best = 0u32;
        for (v, slot) in floor.iter_mut().enumerate() {
            if reach[v] {
                best = v as u32;
            }
            *slot = best;
        }
        Self { floor: Some(floor) }
    }

    pub fn snap(&self, v: u32) -> u32 {
        match &self.floor {
            Some(floor) => match floor.get(v as usize) {
                Some(&s) => s,
                None => floor.last().copied().unwrap_or(0),
            },
            None => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_size_points() {
        // 200mm parts, kerf 4: points at multiples of 204 up to half the axis
        let pts = raster_points(1000, &[204], 4, 10, 12);
        assert_eq!(pts, vec![204, 408]);
    }

    #[test]
    fn test_points_sorted_spaced_and_in_first_half() {
        let pts = raster_points(1000, &[104, 154, 204], 4, 10, 12);
        assert!(!pts.is_empty());
        for w in pts.windows(2) {
            assert!(w[1] > w[0]);
            assert!(w[1] - w[0] >= 4);
        }
        assert!(pts.iter().all(|&p| p >= 10 && p <= 500));
    }

    #[test]
    fn test_falls_back_to_full_axis_when_half_empty() {
        // Only partial sum in range is 30, which is past the midpoint of 50
        let pts = raster_points(50, &[30], 30, 5, 12);
        assert_eq!(pts, vec![30]);
    }

    #[test]
    fn test_no_points_on_short_axis() {
        assert!(raster_points(15, &[204], 4, 10, 12).is_empty());
    }

    #[test]
    fn test_points_closer_than_kerf_collapse() {
        let pts = raster_points(100, &[10, 12], 4, 1, 12);
        assert!(!pts.contains(&10));
        assert!(!pts.contains(&22));
        assert_eq!(&pts[..4], &[4, 8, 12, 16]);
    }

    #[test]
    fn test_snap_rounds_down_to_reachable() {
        let snap = SnapAxis::new(1000, &[200], 4);
        assert_eq!(snap.snap(1000), 812);
        assert_eq!(snap.snap(812), 812);
        assert_eq!(snap.snap(811), 608);
        assert_eq!(snap.snap(204), 200);
        assert_eq!(snap.snap(199), 0);
    }

    #[test]
    fn test_snap_mixed_sizes() {
        let snap = SnapAxis::new(100, &[30, 20], 0);
        assert_eq!(snap.snap(100), 100);
        assert_eq!(snap.snap(59), 50);
        assert_eq!(snap.snap(19), 0);
    }

    #[test]
    fn test_snap_is_idempotent() {
        let snap = SnapAxis::new(600, &[37, 91, 140], 3);
        for v in 0..=600 {
            let s = snap.snap(v);
            assert!(s <= v);
            assert_eq!(snap.snap(s), s);
        }
    }

    #[test]
    fn test_snap_table_ignores_kerf_size() {
        let snap = SnapAxis::new(100, &[10], u32::MAX - 5);
        assert_eq!(snap.snap(100), 10);
        assert_eq!(snap.snap(9), 0);
        assert!(raster_points(100, &[u32::MAX], u32::MAX - 5, 10, 12).is_empty());
    }

    #[test]
    fn test_dominated_points_removed() {
        let snap = SnapAxis::new(1000, &[200], 4);
        // 204..407 all snap to 200 on the before side
        let pts = drop_dominated(vec![204, 250, 300, 408], &snap);
        assert_eq!(pts, vec![204, 408]);
    }
}
