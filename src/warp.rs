//! Warping a fitted transform over image data.
//!
//! The resampling primitive itself lives behind the [`Resampler`] trait so
//! an external implementation can be swapped in; [`BicubicResampler`] is the
//! built-in Catmull-Rom implementation. [`apply_transform`] drives the
//! resampler with the model's inverse mapping and derives a validity
//! footprint: a zero canvas warped with boundary constant 1.0 reveals which
//! output pixels took any contribution from outside the source frame.

use crate::image::{ImageBuffer, ImageView, Mask};
use crate::point::Point;
use crate::trace::{trace_event, trace_span};
use crate::transform::SimilarityTransform;
use crate::util::{AsterMatchError, AsterMatchResult};

/// Fraction of out-of-frame contribution above which an output pixel is
/// considered extrapolated and marked invalid in the footprint.
const FOOTPRINT_THRESHOLD: f32 = 0.4;

/// Interpolation order used when sampling the source image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InterpolationOrder {
    /// Order 0: nearest neighbor.
    Nearest,
    /// Order 1: bilinear.
    Bilinear,
    /// Order 3: bicubic (Catmull-Rom).
    #[default]
    Bicubic,
}

/// Pixel resampling primitive, the external collaborator seam of the
/// transform applier.
///
/// `mapping` converts OUTPUT pixel-center coordinates to source coordinates
/// (i.e. it is already the inverse of the registration model). Samples that
/// reach outside the source frame blend toward `boundary`.
pub trait Resampler {
    /// Resamples `source` onto an `out_width` x `out_height` grid.
    fn resample(
        &self,
        source: ImageView<'_>,
        mapping: &SimilarityTransform,
        out_width: usize,
        out_height: usize,
        order: InterpolationOrder,
        boundary: f32,
    ) -> AsterMatchResult<ImageBuffer>;
}

/// Built-in CPU resampler with constant boundary handling.
#[derive(Clone, Copy, Debug, Default)]
pub struct BicubicResampler;

impl Resampler for BicubicResampler {
    fn resample(
        &self,
        source: ImageView<'_>,
        mapping: &SimilarityTransform,
        out_width: usize,
        out_height: usize,
        order: InterpolationOrder,
        boundary: f32,
    ) -> AsterMatchResult<ImageBuffer> {
        let mut out = ImageBuffer::filled(out_width, out_height, boundary)?;
        let rows = out.as_mut_slice();
        fill_rows(rows, source, mapping, out_width, order, boundary);
        Ok(out)
    }
}

#[cfg(not(feature = "rayon"))]
fn fill_rows(
    rows: &mut [f32],
    source: ImageView<'_>,
    mapping: &SimilarityTransform,
    out_width: usize,
    order: InterpolationOrder,
    boundary: f32,
) {
    for (y, row) in rows.chunks_mut(out_width).enumerate() {
        fill_row(row, y, source, mapping, order, boundary);
    }
}

#[cfg(feature = "rayon")]
fn fill_rows(
    rows: &mut [f32],
    source: ImageView<'_>,
    mapping: &SimilarityTransform,
    out_width: usize,
    order: InterpolationOrder,
    boundary: f32,
) {
    use rayon::prelude::*;

    rows.par_chunks_mut(out_width)
        .enumerate()
        .for_each(|(y, row)| fill_row(row, y, source, mapping, order, boundary));
}

fn fill_row(
    row: &mut [f32],
    y: usize,
    source: ImageView<'_>,
    mapping: &SimilarityTransform,
    order: InterpolationOrder,
    boundary: f32,
) {
    for (x, out) in row.iter_mut().enumerate() {
        let src = mapping.apply(Point::new(x as f64, y as f64));
        *out = sample(source, src.x as f32, src.y as f32, order, boundary);
    }
}

fn sample(
    source: ImageView<'_>,
    x: f32,
    y: f32,
    order: InterpolationOrder,
    boundary: f32,
) -> f32 {
    match order {
        InterpolationOrder::Nearest => {
            let xi = x.round() as i64;
            let yi = y.round() as i64;
            pixel_or(source, xi, yi, boundary)
        }
        InterpolationOrder::Bilinear => {
            let x0 = x.floor();
            let y0 = y.floor();
            let fx = x - x0;
            let fy = y - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);
            let p00 = pixel_or(source, x0, y0, boundary);
            let p10 = pixel_or(source, x0 + 1, y0, boundary);
            let p01 = pixel_or(source, x0, y0 + 1, boundary);
            let p11 = pixel_or(source, x0 + 1, y0 + 1, boundary);
            let top = p00 + fx * (p10 - p00);
            let bottom = p01 + fx * (p11 - p01);
            top + fy * (bottom - top)
        }
        InterpolationOrder::Bicubic => {
            let x0 = x.floor();
            let y0 = y.floor();
            let fx = x - x0;
            let fy = y - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);
            let wx = [
                cubic_kernel(fx + 1.0),
                cubic_kernel(fx),
                cubic_kernel(fx - 1.0),
                cubic_kernel(fx - 2.0),
            ];
            let wy = [
                cubic_kernel(fy + 1.0),
                cubic_kernel(fy),
                cubic_kernel(fy - 1.0),
                cubic_kernel(fy - 2.0),
            ];
            let mut acc = 0.0;
            for (j, &wyj) in wy.iter().enumerate() {
                let py = y0 - 1 + j as i64;
                for (i, &wxi) in wx.iter().enumerate() {
                    let px = x0 - 1 + i as i64;
                    acc += pixel_or(source, px, py, boundary) * wxi * wyj;
                }
            }
            acc
        }
    }
}

/// Catmull-Rom cubic kernel (a = -0.5), support `|x| < 2`.
#[inline]
fn cubic_kernel(x: f32) -> f32 {
    const A: f32 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

#[inline]
fn pixel_or(source: ImageView<'_>, x: i64, y: i64, boundary: f32) -> f32 {
    if x < 0 || y < 0 {
        return boundary;
    }
    source.get(x as usize, y as usize).unwrap_or(boundary)
}

/// Warps `source` into the target pixel frame of `model` and computes the
/// validity footprint.
///
/// - The source is resampled through the model inverse at cubic order with
///   the source median as boundary constant; output values are clamped to
///   the source value range.
/// - The footprint warps an all-zero canvas of the source shape with
///   boundary constant 1.0 through the same mapping; a resampled value of
///   0.4 or more marks the pixel extrapolated (invalid).
/// - With `propagate_mask`, an invalid-pixel mask carried by the source is
///   warped the same way and ORed into the footprint.
/// - `fill_value`, when given, overwrites every invalid output pixel.
#[allow(clippy::too_many_arguments)]
pub fn apply_transform(
    resampler: &dyn Resampler,
    model: &SimilarityTransform,
    source: ImageView<'_>,
    source_mask: Option<&Mask>,
    out_width: usize,
    out_height: usize,
    fill_value: Option<f32>,
    propagate_mask: bool,
) -> AsterMatchResult<(ImageBuffer, Mask)> {
    let _span = trace_span!("apply_transform", out_w = out_width, out_h = out_height).entered();

    if let Some(mask) = source_mask {
        if mask.width() != source.width() || mask.height() != source.height() {
            return Err(AsterMatchError::InvalidInput(
                "source mask dimensions do not match the source image",
            ));
        }
    }

    let inverse = model
        .inverse()
        .ok_or(AsterMatchError::DegenerateSample("non-invertible transform"))?;

    let boundary = source.median();
    let (lo, hi) = source.value_range();
    let mut aligned = resampler.resample(
        source,
        &inverse,
        out_width,
        out_height,
        InterpolationOrder::Bicubic,
        boundary,
    )?;
    for v in aligned.as_mut_slice() {
        *v = v.clamp(lo, hi);
    }

    let zeros = vec![0.0f32; source.width() * source.height()];
    let mut footprint = coverage_mask(
        resampler,
        &inverse,
        source.width(),
        source.height(),
        out_width,
        out_height,
        &zeros,
    )?;

    if propagate_mask {
        if let Some(mask) = source_mask {
            let canvas: Vec<f32> = mask
                .as_slice()
                .iter()
                .map(|&invalid| if invalid { 1.0 } else { 0.0 })
                .collect();
            let warped_mask = coverage_mask(
                resampler,
                &inverse,
                source.width(),
                source.height(),
                out_width,
                out_height,
                &canvas,
            )?;
            for y in 0..out_height {
                for x in 0..out_width {
                    if warped_mask.is_invalid(x, y) {
                        footprint.set(x, y, true);
                    }
                }
            }
        }
    }

    if let Some(fill) = fill_value {
        let data = aligned.as_mut_slice();
        for y in 0..out_height {
            for x in 0..out_width {
                if footprint.is_invalid(x, y) {
                    data[y * out_width + x] = fill;
                }
            }
        }
    }

    trace_event!("footprint", invalid = footprint.invalid_count());
    Ok((aligned, footprint))
}

/// Warps `canvas` (source-shaped, invalid pixels at 1.0) with boundary 1.0
/// and thresholds the result into a mask.
fn coverage_mask(
    resampler: &dyn Resampler,
    inverse: &SimilarityTransform,
    src_width: usize,
    src_height: usize,
    out_width: usize,
    out_height: usize,
    canvas: &[f32],
) -> AsterMatchResult<Mask> {
    let view = ImageView::from_slice(canvas, src_width, src_height)?;
    let warped = resampler.resample(
        view,
        inverse,
        out_width,
        out_height,
        InterpolationOrder::Bicubic,
        1.0,
    )?;
    let flags: Vec<bool> = warped
        .as_slice()
        .iter()
        .map(|&v| v >= FOOTPRINT_THRESHOLD)
        .collect();
    Mask::from_vec(flags, out_width, out_height)
}

#[cfg(test)]
mod tests {
    use super::{cubic_kernel, BicubicResampler, InterpolationOrder, Resampler};
    use crate::image::ImageView;
    use crate::transform::SimilarityTransform;

    #[test]
    fn cubic_kernel_interpolates_exactly_at_integers() {
        assert!((cubic_kernel(0.0) - 1.0).abs() < 1e-6);
        assert_eq!(cubic_kernel(1.0), 0.0);
        assert_eq!(cubic_kernel(2.0), 0.0);
        assert_eq!(cubic_kernel(-1.5), cubic_kernel(1.5));
    }

    #[test]
    fn identity_resampling_reproduces_the_image() {
        let data: Vec<f32> = (0..36).map(|v| v as f32).collect();
        let view = ImageView::from_slice(&data, 6, 6).unwrap();
        let out = BicubicResampler
            .resample(
                view,
                &SimilarityTransform::identity(),
                6,
                6,
                InterpolationOrder::Bicubic,
                0.0,
            )
            .unwrap();
        for (got, want) in out.as_slice().iter().zip(data.iter()) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn integer_translation_shifts_pixels() {
        let mut data = vec![0.0f32; 25];
        data[2 * 5 + 2] = 8.0;
        let view = ImageView::from_slice(&data, 5, 5).unwrap();
        // Output->source mapping that reads one pixel to the left/up.
        let mapping = SimilarityTransform::from_parts(0.0, 1.0, (-1.0, -1.0), false);
        let out = BicubicResampler
            .resample(view, &mapping, 5, 5, InterpolationOrder::Nearest, 0.0)
            .unwrap();
        assert_eq!(out.get(3, 3), Some(8.0));
        assert_eq!(out.get(2, 2), Some(0.0));
    }
}
