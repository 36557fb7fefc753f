//! The registration front door.
//!
//! [`Registrar`] wires the pipeline together: control-point acquisition
//! (given points, or a detector run over an image), invariant generation on
//! both sides, approximate matching, robust estimation, consolidation, and
//! optionally warping. [`find_transform_points`] exposes the pure
//! point-set core without any image plumbing.

use crate::correspond::match_asterisms;
use crate::detect::{PointDetector, SigmaThresholdDetector};
use crate::estimate::{consolidate_matches, estimate_transform, ConsolidatedMatch};
use crate::image::{ImageBuffer, ImageView, Mask};
use crate::invariant::generate_asterisms;
use crate::point::Point;
use crate::trace::{trace_event, trace_span};
use crate::transform::SimilarityTransform;
use crate::util::{AsterMatchError, AsterMatchResult, Side};
use crate::warp::{apply_transform, BicubicResampler, Resampler};

/// Tuning knobs for registration. Defaults reproduce the reference
/// pipeline's behavior.
#[derive(Clone, Debug)]
pub struct RegisterConfig {
    /// Maximum control points taken per side, brightest first.
    pub max_control_points: usize,
    /// Detection significance threshold passed to the point detector.
    pub detection_sigma: f64,
    /// Minimum blob area passed to the point detector.
    pub min_area: usize,
    /// Inlier tolerance of the robust estimator, in target pixels.
    pub pixel_tolerance: f64,
    /// Seed for the robust estimator's sampling order. `None` draws from OS
    /// entropy; pinning a seed reproduces the exact inlier selection.
    pub seed: Option<u64>,
    /// Whether a mirrored similarity fit may be selected. The invariant
    /// features cannot tell the two chiralities apart, so with this off a
    /// mirrored-only relationship fails instead of silently flipping.
    pub allow_reflection: bool,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            max_control_points: 50,
            detection_sigma: 5.0,
            min_area: 5,
            pixel_tolerance: 2.0,
            seed: None,
            allow_reflection: true,
        }
    }
}

/// One side of a registration call, resolved once at this boundary; the
/// rest of the pipeline only ever sees point slices.
#[derive(Clone, Copy, Debug)]
pub enum RegistrationInput<'a> {
    /// Already-detected control points.
    Points(&'a [Point]),
    /// A grayscale image, optionally carrying an invalid-pixel mask.
    Image {
        /// Pixel data.
        pixels: ImageView<'a>,
        /// Invalid-pixel mask (`true` = excluded from detection and, with
        /// `propagate_mask`, carried through warping).
        mask: Option<&'a Mask>,
    },
}

/// The consolidated point matches supporting a fitted transform.
#[derive(Clone, Debug)]
pub struct MatchedPairs {
    /// One entry per matched point pair, sorted by source index.
    pub matches: Vec<ConsolidatedMatch>,
    /// Coordinates of the matched source points, parallel to `matches`.
    pub source: Vec<Point>,
    /// Coordinates of the matched target points, parallel to `matches`.
    pub target: Vec<Point>,
}

/// Registration pipeline with its collaborators.
///
/// The point detector and pixel resampler are external seams; the defaults
/// ([`SigmaThresholdDetector`], [`BicubicResampler`]) make the registrar
/// usable out of the box.
pub struct Registrar {
    config: RegisterConfig,
    detector: Box<dyn PointDetector>,
    resampler: Box<dyn Resampler>,
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new(RegisterConfig::default())
    }
}

impl Registrar {
    /// Creates a registrar with the built-in detector and resampler.
    pub fn new(config: RegisterConfig) -> Self {
        Self {
            config,
            detector: Box::new(SigmaThresholdDetector),
            resampler: Box::new(BicubicResampler),
        }
    }

    /// Replaces the point detector.
    pub fn with_detector(mut self, detector: Box<dyn PointDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Replaces the pixel resampler.
    pub fn with_resampler(mut self, resampler: Box<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RegisterConfig {
        &self.config
    }

    /// Estimates the similarity transform mapping `source` onto `target`.
    ///
    /// Image inputs run the point detector and keep the brightest
    /// `max_control_points` sources; point inputs are truncated the same
    /// way. Fails with [`AsterMatchError::TooFewPoints`] when either side
    /// yields fewer than three usable points and with
    /// [`AsterMatchError::MaxIter`] when no consistent geometry exists.
    pub fn find_transform(
        &self,
        source: &RegistrationInput<'_>,
        target: &RegistrationInput<'_>,
    ) -> AsterMatchResult<(SimilarityTransform, MatchedPairs)> {
        let source_points = self.control_points(source, Side::Source)?;
        let target_points = self.control_points(target, Side::Target)?;
        find_transform_points(&source_points, &target_points, &self.config)
    }

    /// Warps `source` into the pixel frame implied by `model` and
    /// `(out_width, out_height)`, returning the aligned image and its
    /// validity footprint. See [`apply_transform`].
    #[allow(clippy::too_many_arguments)]
    pub fn apply_transform(
        &self,
        model: &SimilarityTransform,
        source: &RegistrationInput<'_>,
        out_width: usize,
        out_height: usize,
        fill_value: Option<f32>,
        propagate_mask: bool,
    ) -> AsterMatchResult<(ImageBuffer, Mask)> {
        let (pixels, mask) = match source {
            RegistrationInput::Image { pixels, mask } => (*pixels, *mask),
            RegistrationInput::Points(_) => {
                return Err(AsterMatchError::InvalidInput(
                    "apply_transform requires an image source",
                ))
            }
        };
        apply_transform(
            self.resampler.as_ref(),
            model,
            pixels,
            mask,
            out_width,
            out_height,
            fill_value,
            propagate_mask,
        )
    }

    /// Single-call entry point: find the transform, then warp the source
    /// into the target's pixel frame. Both inputs must be images.
    pub fn register(
        &self,
        source: &RegistrationInput<'_>,
        target: &RegistrationInput<'_>,
        fill_value: Option<f32>,
        propagate_mask: bool,
    ) -> AsterMatchResult<(ImageBuffer, Mask)> {
        let (out_width, out_height) = match target {
            RegistrationInput::Image { pixels, .. } => (pixels.width(), pixels.height()),
            RegistrationInput::Points(_) => {
                return Err(AsterMatchError::InvalidInput(
                    "register requires image inputs",
                ))
            }
        };
        let (model, _pairs) = self.find_transform(source, target)?;
        self.apply_transform(
            &model,
            source,
            out_width,
            out_height,
            fill_value,
            propagate_mask,
        )
    }

    fn control_points(
        &self,
        input: &RegistrationInput<'_>,
        side: Side,
    ) -> AsterMatchResult<Vec<Point>> {
        let mut points = match input {
            RegistrationInput::Points(points) => points.to_vec(),
            RegistrationInput::Image { pixels, mask } => {
                let _span = trace_span!("detect_control_points").entered();
                let detections = self.detector.detect(
                    *pixels,
                    *mask,
                    self.config.detection_sigma,
                    self.config.min_area,
                )?;
                detections.into_iter().map(|d| d.position).collect()
            }
        };
        points.truncate(self.config.max_control_points);
        if points.len() < 3 {
            return Err(AsterMatchError::TooFewPoints {
                side,
                found: points.len(),
            });
        }
        Ok(points)
    }
}

/// Core point-set registration: invariants, matching, robust estimation and
/// consolidation, with no image handling.
pub fn find_transform_points(
    source: &[Point],
    target: &[Point],
    config: &RegisterConfig,
) -> AsterMatchResult<(SimilarityTransform, MatchedPairs)> {
    let _span = trace_span!(
        "find_transform",
        source = source.len(),
        target = target.len()
    )
    .entered();

    if source.len() < 3 {
        return Err(AsterMatchError::TooFewPoints {
            side: Side::Source,
            found: source.len(),
        });
    }
    if target.len() < 3 {
        return Err(AsterMatchError::TooFewPoints {
            side: Side::Target,
            found: target.len(),
        });
    }

    let source_asterisms = generate_asterisms(source);
    let target_asterisms = generate_asterisms(target);
    let correspondences = match_asterisms(&source_asterisms, &target_asterisms);

    let fit = estimate_transform(&correspondences, source, target, config)?;
    let matches = consolidate_matches(&fit, &correspondences, source, target);
    trace_event!("matched_pairs", count = matches.len());

    let pairs = MatchedPairs {
        source: matches.iter().map(|m| source[m.source]).collect(),
        target: matches.iter().map(|m| target[m.target]).collect(),
        matches,
    };
    Ok((fit.model, pairs))
}
