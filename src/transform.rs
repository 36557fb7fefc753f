//! 2D similarity transforms and their least-squares estimation.
//!
//! A similarity transform is rotation, uniform scale and translation, with
//! reflection optionally permitted. The linear part is stored as a full
//! row-major 2x2 block so both chiralities share one representation:
//! `[[a, -b], [b, a]]` for a direct fit, `[[a, b], [b, -a]]` for a mirrored
//! one. `det < 0` identifies the mirrored case.

use crate::point::Point;
use crate::util::{AsterMatchError, AsterMatchResult};

/// Rotation + uniform scale + translation (+ optional reflection).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityTransform {
    linear: [[f64; 2]; 2],
    translation: [f64; 2],
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for SimilarityTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Similarity(rot={:.3}°, scale={:.4}, t=({:.2}, {:.2}){})",
            self.rotation().to_degrees(),
            self.scale(),
            self.translation[0],
            self.translation[1],
            if self.is_reflective() {
                ", reflected"
            } else {
                ""
            }
        )
    }
}

impl SimilarityTransform {
    /// The identity mapping.
    pub fn identity() -> Self {
        Self {
            linear: [[1.0, 0.0], [0.0, 1.0]],
            translation: [0.0, 0.0],
        }
    }

    /// Builds a transform from explicit parameters. `rotation` is in
    /// radians, counter-clockwise; a reflective transform mirrors across the
    /// x axis before rotating.
    pub fn from_parts(rotation: f64, scale: f64, translation: (f64, f64), reflective: bool) -> Self {
        let (sin, cos) = rotation.sin_cos();
        let (a, b) = (scale * cos, scale * sin);
        let linear = if reflective {
            [[a, b], [b, -a]]
        } else {
            [[a, -b], [b, a]]
        };
        Self {
            linear,
            translation: [translation.0, translation.1],
        }
    }

    /// Maps a point through the transform.
    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.linear[0][0] * p.x + self.linear[0][1] * p.y + self.translation[0],
            self.linear[1][0] * p.x + self.linear[1][1] * p.y + self.translation[1],
        )
    }

    /// Rotation angle in radians, in `(-pi, pi]`.
    pub fn rotation(&self) -> f64 {
        self.linear[1][0].atan2(self.linear[0][0])
    }

    /// Uniform scale factor (always positive).
    pub fn scale(&self) -> f64 {
        let det = self.det();
        det.abs().sqrt()
    }

    /// Translation components `(tx, ty)`.
    pub fn translation(&self) -> (f64, f64) {
        (self.translation[0], self.translation[1])
    }

    /// Whether the transform mirrors the plane.
    pub fn is_reflective(&self) -> bool {
        self.det() < 0.0
    }

    fn det(&self) -> f64 {
        self.linear[0][0] * self.linear[1][1] - self.linear[0][1] * self.linear[1][0]
    }

    /// The inverse mapping, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.det();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = [
            [self.linear[1][1] / det, -self.linear[0][1] / det],
            [-self.linear[1][0] / det, self.linear[0][0] / det],
        ];
        let tx = -(inv[0][0] * self.translation[0] + inv[0][1] * self.translation[1]);
        let ty = -(inv[1][0] * self.translation[0] + inv[1][1] * self.translation[1]);
        Some(Self {
            linear: inv,
            translation: [tx, ty],
        })
    }

    /// Least-squares similarity estimate mapping `source[i]` to `target[i]`.
    ///
    /// Closed-form fit on centered coordinates: the cross-covariance sums
    /// determine the constrained linear block directly, one parameterization
    /// per chirality. With `allow_reflection` the mirrored fit competes on
    /// the sum of squared residuals; otherwise only the direct form is used.
    pub fn fit(
        source: &[Point],
        target: &[Point],
        allow_reflection: bool,
    ) -> AsterMatchResult<Self> {
        if source.len() != target.len() {
            return Err(AsterMatchError::InvalidInput(
                "source and target pair counts differ",
            ));
        }
        if source.len() < 2 {
            return Err(AsterMatchError::DegenerateSample(
                "at least two point pairs are required",
            ));
        }

        let src_c = centroid(source);
        let tgt_c = centroid(target);

        // Cross-covariance and source spread around the centroids.
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syx = 0.0;
        let mut syy = 0.0;
        let mut spread = 0.0;
        for (s, t) in source.iter().zip(target.iter()) {
            let sx = s.x - src_c.x;
            let sy = s.y - src_c.y;
            let tx = t.x - tgt_c.x;
            let ty = t.y - tgt_c.y;
            sxx += sx * tx;
            sxy += sx * ty;
            syx += sy * tx;
            syy += sy * ty;
            spread += sx * sx + sy * sy;
        }

        if spread < 1e-12 || !spread.is_finite() {
            return Err(AsterMatchError::DegenerateSample(
                "sample points are coincident",
            ));
        }

        let direct = {
            let a = (sxx + syy) / spread;
            let b = (sxy - syx) / spread;
            candidate([[a, -b], [b, a]], src_c, tgt_c)
        };
        if !allow_reflection {
            return Ok(direct);
        }

        let mirrored = {
            let a = (sxx - syy) / spread;
            let b = (sxy + syx) / spread;
            candidate([[a, b], [b, -a]], src_c, tgt_c)
        };

        if sse(&mirrored, source, target) < sse(&direct, source, target) {
            Ok(mirrored)
        } else {
            Ok(direct)
        }
    }
}

fn centroid(points: &[Point]) -> Point {
    let mut x = 0.0;
    let mut y = 0.0;
    for p in points {
        x += p.x;
        y += p.y;
    }
    let n = points.len() as f64;
    Point::new(x / n, y / n)
}

fn candidate(linear: [[f64; 2]; 2], src_c: Point, tgt_c: Point) -> SimilarityTransform {
    let tx = tgt_c.x - (linear[0][0] * src_c.x + linear[0][1] * src_c.y);
    let ty = tgt_c.y - (linear[1][0] * src_c.x + linear[1][1] * src_c.y);
    SimilarityTransform {
        linear,
        translation: [tx, ty],
    }
}

fn sse(model: &SimilarityTransform, source: &[Point], target: &[Point]) -> f64 {
    source
        .iter()
        .zip(target.iter())
        .map(|(s, t)| model.apply(*s).distance_sq(*t))
        .sum()
}
