//! Scale/rotation-invariant triangle features (asterisms).
//!
//! For every point, triangles are formed from its k nearest neighbors and
//! described by the ratios of their sorted side lengths. The ratio pair is
//! unchanged by translation, rotation, uniform scaling and reflection, which
//! makes it a matching key between independently detected point sets.
//!
//! Vertex order is canonical, fixed by side lengths rather than input order:
//! with the sides sorted ascending, the triple is (vertex shared by the
//! shortest and middle sides, vertex shared by the middle and longest sides,
//! vertex shared by the longest and shortest sides). Matching two asterisms
//! therefore pairs geometrically equivalent vertices position by position.

use std::collections::HashSet;

use crate::point::Point;
use crate::spatial::KdTree;
use crate::trace::{trace_event, trace_span};

/// Neighbors considered per point when forming triangles, capped at the
/// point-set size.
pub const NEIGHBOR_COUNT: usize = 5;

/// A canonical triangle over one point set together with its invariant
/// feature. The two always travel together; there are no parallel arrays to
/// keep in sync.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Asterism {
    /// Canonically ordered indices into the owning point set.
    pub vertices: [usize; 3],
    /// `[longest/middle, middle/shortest]` of the sorted side lengths.
    pub feature: [f64; 2],
}

impl Asterism {
    /// Builds the canonical asterism for three point indices.
    ///
    /// Degenerate triangles (collinear or coincident vertices) are not
    /// rejected; their features carry infinite or NaN ratios and simply
    /// never match anything downstream.
    pub fn from_indices(indices: [usize; 3], points: &[Point]) -> Self {
        let [i, j, k] = indices;
        let mut sides = [
            (points[i].distance(points[j]), [i, j]),
            (points[j].distance(points[k]), [j, k]),
            (points[k].distance(points[i]), [k, i]),
        ];
        sides.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (shortest, middle, longest) = (sides[0], sides[1], sides[2]);

        Self {
            vertices: [
                shared_vertex(shortest.1, middle.1),
                shared_vertex(middle.1, longest.1),
                shared_vertex(longest.1, shortest.1),
            ],
            feature: [longest.0 / middle.0, middle.0 / shortest.0],
        }
    }
}

/// Endpoint common to two sides of a triangle. Well-defined for any triple
/// of distinct indices: each vertex belongs to exactly two sides.
fn shared_vertex(a: [usize; 2], b: [usize; 2]) -> usize {
    if a[0] == b[0] || a[0] == b[1] {
        a[0]
    } else {
        a[1]
    }
}

/// Generates the deduplicated asterisms of one point set.
///
/// Each point is queried for its `min(N, 5)` nearest neighbors (itself
/// included) and every 3-combination of those neighbor indices becomes a
/// candidate triangle. An asterism whose feature is bitwise equal to an
/// earlier one is dropped; the first occurrence, in generation order, wins.
pub fn generate_asterisms(points: &[Point]) -> Vec<Asterism> {
    let _span = trace_span!("generate_asterisms", points = points.len()).entered();

    let coords: Vec<[f64; 2]> = points.iter().map(|p| p.coords()).collect();
    let tree = match KdTree::build(&coords) {
        Some(tree) => tree,
        None => return Vec::new(),
    };
    let k = points.len().min(NEIGHBOR_COUNT);

    let per_point = collect_per_point(points, &coords, &tree, k);

    // Deduplication is sequential so generation order decides survivors no
    // matter how the per-point work was scheduled.
    let mut seen: HashSet<[u64; 2]> = HashSet::new();
    let mut out = Vec::new();
    for asterism in per_point.into_iter().flatten() {
        let key = [asterism.feature[0].to_bits(), asterism.feature[1].to_bits()];
        if seen.insert(key) {
            out.push(asterism);
        }
    }

    trace_event!("asterisms", count = out.len());
    out
}

#[cfg(not(feature = "rayon"))]
fn collect_per_point(
    points: &[Point],
    coords: &[[f64; 2]],
    tree: &KdTree,
    k: usize,
) -> Vec<Vec<Asterism>> {
    (0..points.len())
        .map(|i| asterisms_around(points, coords[i], tree, k))
        .collect()
}

#[cfg(feature = "rayon")]
fn collect_per_point(
    points: &[Point],
    coords: &[[f64; 2]],
    tree: &KdTree,
    k: usize,
) -> Vec<Vec<Asterism>> {
    use rayon::prelude::*;

    (0..points.len())
        .into_par_iter()
        .map(|i| asterisms_around(points, coords[i], tree, k))
        .collect()
}

fn asterisms_around(points: &[Point], center: [f64; 2], tree: &KdTree, k: usize) -> Vec<Asterism> {
    let neighbors = tree.k_nearest(center, k);
    let mut out = Vec::new();
    for a in 0..neighbors.len() {
        for b in (a + 1)..neighbors.len() {
            for c in (b + 1)..neighbors.len() {
                let triple = [neighbors[a].index, neighbors[b].index, neighbors[c].index];
                out.push(Asterism::from_indices(triple, points));
            }
        }
    }
    out
}
