//! Approximate invariant matching and candidate correspondences.
//!
//! Source and target asterisms are compared in invariant-feature space; any
//! pair closer than a fixed radius is a candidate for representing the same
//! physical triangle. Because the features are already scale- and
//! rotation-normalized, the radius is an absolute constant rather than a
//! data-dependent threshold. Most candidates are false positives; the robust
//! estimator sorts them out.

use crate::invariant::Asterism;
use crate::point::Point;
use crate::spatial::KdTree;
use crate::trace::{trace_event, trace_span};
use crate::transform::SimilarityTransform;

/// Euclidean matching radius in invariant-feature space.
pub const FEATURE_MATCH_RADIUS: f64 = 0.1;

/// A matched triangle pair: three point-pairs via the shared canonical
/// vertex order. A similarity transform needs at least two non-collinear
/// pairs, so a whole matched triangle is the atomic sample unit consumed by
/// the robust estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    /// Canonical vertex indices into the source point set.
    pub source: [usize; 3],
    /// Canonical vertex indices into the target point set.
    pub target: [usize; 3],
}

impl Correspondence {
    /// The three (source index, target index) vertex pairs.
    pub fn pairs(&self) -> [(usize, usize); 3] {
        [
            (self.source[0], self.target[0]),
            (self.source[1], self.target[1]),
            (self.source[2], self.target[2]),
        ]
    }

    /// Maximum of the three per-vertex residual distances under `model`.
    ///
    /// The maximum, not the mean: a correspondence only counts as an inlier
    /// when all three vertices agree within tolerance.
    pub fn max_residual(
        &self,
        model: &SimilarityTransform,
        source_points: &[Point],
        target_points: &[Point],
    ) -> f64 {
        self.pairs()
            .into_iter()
            .map(|(s, t)| model.apply(source_points[s]).distance(target_points[t]))
            .fold(0.0, f64::max)
    }
}

/// Expands all approximate invariant matches into a flat candidate list.
///
/// A k-d tree over the target features answers a radius query per source
/// asterism; every hit becomes one [`Correspondence`]. Sources with no
/// target within [`FEATURE_MATCH_RADIUS`] contribute nothing.
pub fn match_asterisms(source: &[Asterism], target: &[Asterism]) -> Vec<Correspondence> {
    let _span = trace_span!(
        "match_asterisms",
        source = source.len(),
        target = target.len()
    )
    .entered();

    let features: Vec<[f64; 2]> = target.iter().map(|a| a.feature).collect();
    let tree = match KdTree::build(&features) {
        Some(tree) => tree,
        None => return Vec::new(),
    };

    let mut out = Vec::new();
    for s in source {
        for t_idx in tree.within_radius(s.feature, FEATURE_MATCH_RADIUS) {
            out.push(Correspondence {
                source: s.vertices,
                target: target[t_idx].vertices,
            });
        }
    }

    trace_event!("correspondences", count = out.len());
    out
}
