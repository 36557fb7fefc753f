//! 2D k-d tree used for neighbor queries in pixel space and invariant space.
//!
//! The tree is built once over a coordinate list and queried many times,
//! either for the k nearest neighbors of a point (triangle formation) or for
//! all entries within a radius (invariant matching). Coordinates are stored
//! by index so query results refer back to the caller's arrays.
//!
//! Comparisons use `f64::total_cmp`, so non-finite coordinates (which
//! degenerate triangles can produce in invariant space) never panic; their
//! distances are NaN and they simply fail every radius test.

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

/// A neighbor returned by [`KdTree::k_nearest`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Index into the coordinate list the tree was built from.
    pub index: usize,
    /// Squared Euclidean distance from the query.
    pub dist_sq: f64,
}

#[derive(Debug, Clone)]
struct Node {
    coord_idx: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Balanced 2D k-d tree over `[x, y]` coordinates.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<Node>,
    coords: Vec<[f64; 2]>,
}

impl KdTree {
    /// Builds a tree by recursive median partition.
    ///
    /// Returns `None` for an empty coordinate list.
    pub fn build(coords: &[[f64; 2]]) -> Option<Self> {
        if coords.is_empty() {
            return None;
        }
        let coords = coords.to_vec();
        let mut order: Vec<usize> = (0..coords.len()).collect();
        let mut nodes = Vec::with_capacity(coords.len());
        build_subtree(&coords, &mut order, 0, &mut nodes);
        Some(Self { nodes, coords })
    }

    /// Number of coordinates in the tree.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Whether the tree holds no coordinates.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// The `k` nearest neighbors of `query`, sorted by ascending distance.
    ///
    /// A query at a stored coordinate returns that entry with distance zero,
    /// so self-matches are included when querying with a tree point.
    pub fn k_nearest(&self, query: [f64; 2], k: usize) -> Vec<Neighbor> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }
        // Max-heap of the k best candidates; the root is the current worst.
        let mut heap: BinaryHeap<(OrderedFloat<f64>, usize)> = BinaryHeap::with_capacity(k + 1);
        self.nearest_descend(0, 0, query, k, &mut heap);
        let mut out: Vec<Neighbor> = heap
            .into_iter()
            .map(|(d, index)| Neighbor {
                index,
                dist_sq: d.into_inner(),
            })
            .collect();
        out.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.index.cmp(&b.index)));
        out
    }

    fn nearest_descend(
        &self,
        node_idx: usize,
        depth: usize,
        query: [f64; 2],
        k: usize,
        heap: &mut BinaryHeap<(OrderedFloat<f64>, usize)>,
    ) {
        let node = &self.nodes[node_idx];
        let coord = self.coords[node.coord_idx];
        let dist_sq = dist_sq(query, coord);
        heap.push((OrderedFloat(dist_sq), node.coord_idx));
        if heap.len() > k {
            heap.pop();
        }

        let axis = depth % 2;
        let diff = query[axis] - coord[axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(idx) = near {
            self.nearest_descend(idx, depth + 1, query, k, heap);
        }
        // The far side can only matter if the splitting plane is closer than
        // the current worst candidate (or the heap is not yet full).
        let worst = heap.peek().map_or(f64::INFINITY, |w| w.0.into_inner());
        if let Some(idx) = far {
            if heap.len() < k || diff * diff < worst {
                self.nearest_descend(idx, depth + 1, query, k, heap);
            }
        }
    }

    /// Indices of all entries within `radius` of `query`, sorted by ascending
    /// distance.
    pub fn within_radius(&self, query: [f64; 2], radius: f64) -> Vec<usize> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<(f64, usize)> = Vec::new();
        self.radius_descend(0, 0, query, radius * radius, &mut hits);
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, idx)| idx).collect()
    }

    fn radius_descend(
        &self,
        node_idx: usize,
        depth: usize,
        query: [f64; 2],
        radius_sq: f64,
        hits: &mut Vec<(f64, usize)>,
    ) {
        let node = &self.nodes[node_idx];
        let coord = self.coords[node.coord_idx];
        let dist_sq = dist_sq(query, coord);
        if dist_sq <= radius_sq {
            hits.push((dist_sq, node.coord_idx));
        }

        let axis = depth % 2;
        let diff = query[axis] - coord[axis];
        // A NaN split difference prunes neither side; non-finite invariants
        // must not hide finite entries stored beneath them.
        if let Some(idx) = node.left {
            if !(diff > 0.0) || diff * diff <= radius_sq {
                self.radius_descend(idx, depth + 1, query, radius_sq, hits);
            }
        }
        if let Some(idx) = node.right {
            if !(diff < 0.0) || diff * diff <= radius_sq {
                self.radius_descend(idx, depth + 1, query, radius_sq, hits);
            }
        }
    }
}

fn build_subtree(
    coords: &[[f64; 2]],
    order: &mut [usize],
    depth: usize,
    nodes: &mut Vec<Node>,
) -> Option<usize> {
    if order.is_empty() {
        return None;
    }

    let axis = depth % 2;
    let median = order.len() / 2;
    order.select_nth_unstable_by(median, |&a, &b| coords[a][axis].total_cmp(&coords[b][axis]));
    let coord_idx = order[median];

    let node_idx = nodes.len();
    nodes.push(Node {
        coord_idx,
        left: None,
        right: None,
    });

    let (below, rest) = order.split_at_mut(median);
    let above = &mut rest[1..];
    let left = build_subtree(coords, below, depth + 1, nodes);
    let right = build_subtree(coords, above, depth + 1, nodes);
    nodes[node_idx].left = left;
    nodes[node_idx].right = right;
    Some(node_idx)
}

#[inline]
fn dist_sq(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::{KdTree, Neighbor};

    fn grid(n: usize) -> Vec<[f64; 2]> {
        let mut coords = Vec::new();
        for y in 0..n {
            for x in 0..n {
                coords.push([x as f64, y as f64]);
            }
        }
        coords
    }

    fn brute_k_nearest(coords: &[[f64; 2]], query: [f64; 2], k: usize) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = coords
            .iter()
            .enumerate()
            .map(|(index, c)| Neighbor {
                index,
                dist_sq: (c[0] - query[0]).powi(2) + (c[1] - query[1]).powi(2),
            })
            .collect();
        all.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.index.cmp(&b.index)));
        all.truncate(k);
        all
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(KdTree::build(&[]).is_none());
    }

    #[test]
    fn k_nearest_matches_brute_force() {
        let coords = grid(7);
        let tree = KdTree::build(&coords).unwrap();
        for query in [[0.0, 0.0], [3.2, 2.9], [6.0, 6.0], [-1.0, 3.5]] {
            let got = tree.k_nearest(query, 5);
            let want = brute_k_nearest(&coords, query, 5);
            assert_eq!(got.len(), 5);
            for (g, w) in got.iter().zip(want.iter()) {
                assert!((g.dist_sq - w.dist_sq).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn query_at_a_stored_point_returns_it_first() {
        let coords = grid(4);
        let tree = KdTree::build(&coords).unwrap();
        let near = tree.k_nearest([2.0, 3.0], 3);
        assert_eq!(near[0].index, 14);
        assert_eq!(near[0].dist_sq, 0.0);
    }

    #[test]
    fn k_larger_than_tree_returns_everything() {
        let coords = grid(2);
        let tree = KdTree::build(&coords).unwrap();
        assert_eq!(tree.k_nearest([0.5, 0.5], 10).len(), 4);
    }

    #[test]
    fn within_radius_finds_exactly_the_close_entries() {
        let coords = grid(5);
        let tree = KdTree::build(&coords).unwrap();
        let hits = tree.within_radius([2.0, 2.0], 1.0);
        // Center plus its four orthogonal neighbors.
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0], 12);
    }

    #[test]
    fn nan_coordinates_never_match_a_radius_query() {
        let coords = vec![[0.0, 0.0], [f64::NAN, 1.0], [2.0, 2.0]];
        let tree = KdTree::build(&coords).unwrap();
        let hits = tree.within_radius([0.0, 0.0], 10.0);
        assert!(!hits.contains(&1));
        assert!(hits.contains(&0) && hits.contains(&2));
    }
}
