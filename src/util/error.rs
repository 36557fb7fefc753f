//! Error types for astermatch.

use thiserror::Error;

/// Result alias for astermatch operations.
pub type AsterMatchResult<T> = std::result::Result<T, AsterMatchError>;

/// Which of the two point sets an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The set being mapped onto the target.
    Source,
    /// The set the source is mapped onto.
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Errors that can occur while registering point sets or images.
#[derive(Debug, Error)]
pub enum AsterMatchError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A buffer is shorter than its declared dimensions require.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall {
        /// Minimum length required by width/height/stride.
        needed: usize,
        /// Actual buffer length.
        got: usize,
    },
    /// Width or height is zero, or a stride is narrower than the width.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },
    /// One of the point sets has too few usable points to form triangles.
    #[error("{side} set has {found} usable points, at least 3 are required")]
    TooFewPoints {
        /// Which point set is deficient.
        side: Side,
        /// Number of usable points found.
        found: usize,
    },
    /// A sample of point pairs carries no usable geometry (e.g. coincident
    /// points or a non-invertible model).
    #[error("degenerate sample: {0}")]
    DegenerateSample(&'static str),
    /// The robust estimator exhausted every candidate correspondence without
    /// reaching the consensus threshold. The two point sets share no
    /// consistent geometric relationship, or too few genuine matches exist.
    #[error("no consensus transform after testing all {tested} candidate correspondences")]
    MaxIter {
        /// Number of candidate correspondences that were tried.
        tested: usize,
    },
    /// The point detector could not produce control points.
    #[error("point detection failed: {0}")]
    Detection(String),
}
