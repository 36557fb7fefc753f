//! Astermatch registers images of the same field of point sources.
//!
//! Given two independently detected point sets (or two images to detect
//! them from), the crate finds the similarity transform — rotation, uniform
//! scale, translation, optionally reflection — that maps one onto the
//! other. Matching works on shape-invariant triangle features, model
//! selection is a RANSAC-style consensus search with a deterministic
//! refinement, and the fitted transform can warp the source image into the
//! target's pixel frame together with a validity footprint.
//!
//! The common path is [`Registrar::register`]; [`find_transform_points`]
//! exposes the pure point-set core. Parallelism is available behind the
//! `rayon` feature, diagnostics behind `tracing`.

#![warn(missing_docs)]

pub mod correspond;
pub mod detect;
pub mod estimate;
pub mod image;
pub mod invariant;
pub mod point;
pub mod register;
pub mod spatial;
mod trace;
pub mod transform;
pub mod util;
pub mod warp;

pub use correspond::{match_asterisms, Correspondence, FEATURE_MATCH_RADIUS};
pub use detect::{Detection, PointDetector, SigmaThresholdDetector};
pub use estimate::{consolidate_matches, estimate_transform, ConsolidatedMatch, RobustFit};
pub use image::{mean_of_planes, ImageBuffer, ImageView, Mask};
pub use invariant::{generate_asterisms, Asterism, NEIGHBOR_COUNT};
pub use point::Point;
pub use register::{
    find_transform_points, MatchedPairs, RegisterConfig, Registrar, RegistrationInput,
};
pub use spatial::{KdTree, Neighbor};
pub use transform::SimilarityTransform;
pub use util::{AsterMatchError, AsterMatchResult, Side};
pub use warp::{apply_transform, BicubicResampler, InterpolationOrder, Resampler};
