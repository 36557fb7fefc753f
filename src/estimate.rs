//! Robust model selection over candidate correspondences.
//!
//! The candidate list from invariant matching is dominated by false
//! positives. The estimator walks a random permutation of the candidates,
//! fits a trial model to one correspondence at a time and accepts the first
//! trial whose consensus reaches the adaptive `min_matches` threshold. A
//! fixed three-pass refinement then refits against the inliers of the whole
//! candidate list. Sampling order comes from an injectable, seedable RNG so
//! tests can reproduce the exact inlier selection.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::correspond::Correspondence;
use crate::point::Point;
use crate::register::RegisterConfig;
use crate::trace::{trace_event, trace_span};
use crate::transform::SimilarityTransform;
use crate::util::{AsterMatchError, AsterMatchResult};

/// Number of deterministic refinement passes after consensus is reached.
const REFINEMENT_PASSES: usize = 3;

/// Accepted model plus the correspondences that support it.
#[derive(Clone, Debug)]
pub struct RobustFit {
    /// The selected similarity transform.
    pub model: SimilarityTransform,
    /// Indices into the candidate correspondence list that agree with the
    /// model within tolerance.
    pub inliers: Vec<usize>,
}

/// A final one-to-one point match with its fitting error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConsolidatedMatch {
    /// Index into the source point set.
    pub source: usize,
    /// Index into the target point set.
    pub target: usize,
    /// Euclidean distance between the model-projected source point and the
    /// target point.
    pub error: f64,
}

/// Selects the best-consensus similarity transform for the candidate list.
///
/// `min_matches = max(1, min(10, floor(n * 0.8)))`. When either point set
/// has exactly three points and exactly one candidate exists, sampling is
/// skipped and that candidate is fitted directly as the sole inlier.
/// Exhausting the permutation without consensus fails with
/// [`AsterMatchError::MaxIter`].
pub fn estimate_transform(
    correspondences: &[Correspondence],
    source_points: &[Point],
    target_points: &[Point],
    config: &RegisterConfig,
) -> AsterMatchResult<RobustFit> {
    let n = correspondences.len();
    let _span = trace_span!("estimate_transform", candidates = n).entered();
    if n == 0 {
        return Err(AsterMatchError::MaxIter { tested: 0 });
    }

    let tolerance = config.pixel_tolerance;
    let min_matches = ((n as f64 * 0.8).floor() as usize).clamp(1, 10);

    let fit_subset = |indices: &[usize]| -> AsterMatchResult<SimilarityTransform> {
        let mut src = Vec::with_capacity(indices.len() * 3);
        let mut tgt = Vec::with_capacity(indices.len() * 3);
        for &idx in indices {
            for (s, t) in correspondences[idx].pairs() {
                src.push(source_points[s]);
                tgt.push(target_points[t]);
            }
        }
        SimilarityTransform::fit(&src, &tgt, config.allow_reflection)
    };

    // Tiny-input shortcut: a single candidate between minimal point sets
    // leaves nothing to sample against.
    if (source_points.len() == 3 || target_points.len() == 3) && n == 1 {
        let model = fit_subset(&[0])?;
        return Ok(RobustFit {
            model,
            inliers: vec![0],
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    };
    order.shuffle(&mut rng);

    let mut accepted: Option<RobustFit> = None;
    for &trial in &order {
        let model = match fit_subset(&[trial]) {
            Ok(model) => model,
            // A degenerate trial sample (e.g. coincident vertices) is just
            // an unusable candidate, not a fatal condition.
            Err(_) => continue,
        };

        let mut inliers = vec![trial];
        for other in 0..n {
            if other == trial {
                continue;
            }
            let err = correspondences[other].max_residual(&model, source_points, target_points);
            if err < tolerance {
                inliers.push(other);
            }
        }

        if inliers.len() >= min_matches {
            inliers.sort_unstable();
            let model = fit_subset(&inliers)?;
            trace_event!("consensus", inliers = inliers.len());
            accepted = Some(RobustFit { model, inliers });
            break;
        }
    }

    let mut fit = accepted.ok_or(AsterMatchError::MaxIter { tested: n })?;

    // Deterministic refinement: re-evaluate every candidate against the
    // current model and refit on the full inlier set.
    for _ in 0..REFINEMENT_PASSES {
        let survivors: Vec<usize> = (0..n)
            .filter(|&idx| {
                correspondences[idx].max_residual(&fit.model, source_points, target_points)
                    < tolerance
            })
            .collect();
        if survivors.is_empty() {
            break;
        }
        match fit_subset(&survivors) {
            Ok(model) => {
                fit.model = model;
                fit.inliers = survivors;
            }
            Err(_) => break,
        }
    }

    trace_event!("refined", inliers = fit.inliers.len());
    Ok(fit)
}

/// Collapses inlier correspondences to a strict 1:1 point mapping.
///
/// Vertex pairs are flattened and deduplicated; a source index claimed by
/// several targets keeps only its lowest-error pairing, and vice versa.
/// The result is sorted by source index.
pub fn consolidate_matches(
    fit: &RobustFit,
    correspondences: &[Correspondence],
    source_points: &[Point],
    target_points: &[Point],
) -> Vec<ConsolidatedMatch> {
    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for &idx in &fit.inliers {
        for pair in correspondences[idx].pairs() {
            pairs.insert(pair);
        }
    }

    let mut scored: Vec<ConsolidatedMatch> = pairs
        .into_iter()
        .map(|(source, target)| ConsolidatedMatch {
            source,
            target,
            error: fit
                .model
                .apply(source_points[source])
                .distance(target_points[target]),
        })
        .collect();

    // Lowest error first; ties resolve by index for determinism.
    scored.sort_by(|a, b| {
        a.error
            .total_cmp(&b.error)
            .then(a.source.cmp(&b.source))
            .then(a.target.cmp(&b.target))
    });

    let mut source_taken = BTreeSet::new();
    let mut target_taken = BTreeSet::new();
    let mut out: Vec<ConsolidatedMatch> = scored
        .into_iter()
        .filter(|m| source_taken.insert(m.source) && target_taken.insert(m.target))
        .collect();
    out.sort_by_key(|m| m.source);
    out
}
