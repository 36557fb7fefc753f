//! Control-point detection seam.
//!
//! The registration core only needs ranked `(x, y)` coordinates; where they
//! come from is the caller's business. [`PointDetector`] is that seam, and
//! [`SigmaThresholdDetector`] is a serviceable built-in: background and
//! noise from median/MAD statistics, connected components above a sigma
//! threshold, flux-weighted centroids, brightest first.

use crate::image::{ImageView, Mask};
use crate::point::Point;
use crate::util::{AsterMatchError, AsterMatchResult};

/// A detected control point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Sub-pixel position (pixel-center convention, `x` = column).
    pub position: Point,
    /// Background-subtracted integrated brightness.
    pub flux: f64,
}

/// Produces candidate control points from a grayscale image, sorted by
/// descending brightness. Implementations must use the same pixel-center
/// coordinate convention as the resampler.
pub trait PointDetector {
    /// Detects point sources in `image`.
    ///
    /// `sigma` is the detection significance above the background noise;
    /// `min_area` the minimum connected pixel count per source. Pixels
    /// flagged invalid in `mask` take no part in detection.
    fn detect(
        &self,
        image: ImageView<'_>,
        mask: Option<&Mask>,
        sigma: f64,
        min_area: usize,
    ) -> AsterMatchResult<Vec<Detection>>;
}

/// Median/MAD background estimation with 8-connected component extraction.
#[derive(Clone, Copy, Debug, Default)]
pub struct SigmaThresholdDetector;

impl PointDetector for SigmaThresholdDetector {
    fn detect(
        &self,
        image: ImageView<'_>,
        mask: Option<&Mask>,
        sigma: f64,
        min_area: usize,
    ) -> AsterMatchResult<Vec<Detection>> {
        let width = image.width();
        let height = image.height();
        if let Some(mask) = mask {
            if mask.width() != width || mask.height() != height {
                return Err(AsterMatchError::InvalidInput(
                    "detection mask dimensions do not match the image",
                ));
            }
        }

        let background = image.median() as f64;
        let noise = mad_noise(image, background as f32) as f64;
        if !noise.is_finite() {
            return Err(AsterMatchError::Detection(
                "image statistics are not finite".into(),
            ));
        }
        let threshold = background + sigma * noise;

        let usable = |x: usize, y: usize| -> Option<f64> {
            if mask.is_some_and(|m| m.is_invalid(x, y)) {
                return None;
            }
            let v = image.get(x, y)? as f64;
            (v.is_finite() && v > threshold).then_some(v)
        };

        // Flood-fill labeling of above-threshold pixels, 8-connected.
        let mut visited = vec![false; width * height];
        let mut detections = Vec::new();
        let mut stack = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if visited[y * width + x] || usable(x, y).is_none() {
                    continue;
                }
                stack.push((x, y));
                visited[y * width + x] = true;
                let mut area = 0usize;
                let mut flux = 0.0;
                let mut cx = 0.0;
                let mut cy = 0.0;
                while let Some((px, py)) = stack.pop() {
                    let value = match usable(px, py) {
                        Some(v) => v,
                        None => continue,
                    };
                    let weight = value - background;
                    area += 1;
                    flux += weight;
                    cx += weight * px as f64;
                    cy += weight * py as f64;
                    for (nx, ny) in neighbors8(px, py, width, height) {
                        if !visited[ny * width + nx] && usable(nx, ny).is_some() {
                            visited[ny * width + nx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
                if area >= min_area && flux > 0.0 {
                    detections.push(Detection {
                        position: Point::new(cx / flux, cy / flux),
                        flux,
                    });
                }
            }
        }

        detections.sort_by(|a, b| b.flux.total_cmp(&a.flux));
        Ok(detections)
    }
}

/// Noise estimate from the median absolute deviation, scaled to match a
/// Gaussian standard deviation.
fn mad_noise(image: ImageView<'_>, background: f32) -> f32 {
    let mut deviations: Vec<f32> = image
        .pixels()
        .filter(|v| !v.is_nan())
        .map(|v| (v - background).abs())
        .collect();
    if deviations.is_empty() {
        return 0.0;
    }
    let mid = deviations.len() / 2;
    let (_, m, _) = deviations.select_nth_unstable_by(mid, f32::total_cmp);
    *m * 1.4826
}

fn neighbors8(
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let x = x as i64;
    let y = y as i64;
    [
        (x - 1, y - 1),
        (x, y - 1),
        (x + 1, y - 1),
        (x - 1, y),
        (x + 1, y),
        (x - 1, y + 1),
        (x, y + 1),
        (x + 1, y + 1),
    ]
    .into_iter()
    .filter_map(move |(nx, ny)| {
        (nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height)
            .then_some((nx as usize, ny as usize))
    })
}

#[cfg(test)]
mod tests {
    use super::{PointDetector, SigmaThresholdDetector};
    use crate::image::{ImageView, Mask};

    fn field_with_spots(spots: &[(usize, usize, f32)], width: usize, height: usize) -> Vec<f32> {
        let mut data = vec![0.0f32; width * height];
        // Mild background texture so the noise estimate is nonzero.
        for (i, v) in data.iter_mut().enumerate() {
            *v = (i % 7) as f32 * 0.01;
        }
        for &(x, y, amp) in spots {
            for dy in 0..2 {
                for dx in 0..2 {
                    data[(y + dy) * width + (x + dx)] = amp;
                }
            }
        }
        data
    }

    #[test]
    fn brighter_sources_come_first() {
        let data = field_with_spots(&[(2, 2, 10.0), (12, 12, 50.0), (2, 12, 30.0)], 20, 20);
        let view = ImageView::from_slice(&data, 20, 20).unwrap();
        let detections = SigmaThresholdDetector
            .detect(view, None, 5.0, 2)
            .unwrap();
        assert_eq!(detections.len(), 3);
        assert!(detections[0].flux > detections[1].flux);
        assert!(detections[1].flux > detections[2].flux);
        assert!((detections[0].position.x - 12.5).abs() < 0.1);
        assert!((detections[0].position.y - 12.5).abs() < 0.1);
    }

    #[test]
    fn min_area_rejects_single_pixel_hits() {
        let mut data = vec![0.0f32; 100];
        for (i, v) in data.iter_mut().enumerate() {
            *v = (i % 5) as f32 * 0.01;
        }
        data[5 * 10 + 5] = 40.0;
        let view = ImageView::from_slice(&data, 10, 10).unwrap();
        let detections = SigmaThresholdDetector
            .detect(view, None, 5.0, 4)
            .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn masked_pixels_are_excluded() {
        let data = field_with_spots(&[(2, 2, 10.0), (12, 12, 10.0)], 20, 20);
        let view = ImageView::from_slice(&data, 20, 20).unwrap();
        let mut mask = Mask::all_valid(20, 20).unwrap();
        for dy in 0..2 {
            for dx in 0..2 {
                mask.set(2 + dx, 2 + dy, true);
            }
        }
        let detections = SigmaThresholdDetector
            .detect(view, Some(&mask), 5.0, 2)
            .unwrap();
        assert_eq!(detections.len(), 1);
        assert!((detections[0].position.x - 12.5).abs() < 0.1);
    }
}
