//! Image views, owned buffers and masks.
//!
//! `ImageView` is a borrowed 2D view over an `f32` slice with an explicit
//! stride (elements between row starts; a stride wider than the width
//! represents padded rows). `ImageBuffer` owns contiguous pixel data and is
//! what the warping stage produces. `Mask` is a boolean plane with the
//! footprint convention: `true` marks an invalid pixel.

use crate::util::{AsterMatchError, AsterMatchResult};

/// Borrowed 2D grayscale view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> ImageView<'a> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [f32], width: usize, height: usize) -> AsterMatchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(
        data: &'a [f32],
        width: usize,
        height: usize,
        stride: usize,
    ) -> AsterMatchResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(AsterMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The pixel at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x).copied()
    }

    /// Contiguous slice for row `y`, `width` elements long.
    pub fn row(&self, y: usize) -> Option<&'a [f32]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Iterates the pixels in row-major order, skipping row padding.
    pub fn pixels(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.height).flat_map(move |y| self.row(y).unwrap_or(&[]).iter().copied())
    }

    /// Median pixel value, or 0.0 for a view with no pixels.
    ///
    /// Used as the resampling boundary constant so extrapolated regions
    /// blend with the background level.
    pub fn median(&self) -> f32 {
        let mut values: Vec<f32> = self.pixels().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return 0.0;
        }
        let mid = values.len() / 2;
        let (_, m, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
        *m
    }

    /// Minimum and maximum finite pixel values.
    pub fn value_range(&self) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for v in self.pixels() {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if lo > hi {
            (0.0, 0.0)
        } else {
            (lo, hi)
        }
    }
}

/// Owned contiguous grayscale image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuffer {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl ImageBuffer {
    /// Allocates a buffer filled with `value`.
    pub fn filled(width: usize, height: usize, value: f32) -> AsterMatchResult<Self> {
        required_len(width, height, width)?;
        Ok(Self {
            data: vec![value; width * height],
            width,
            height,
        })
    }

    /// Wraps existing row-major pixel data.
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize) -> AsterMatchResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() != needed {
            return Err(AsterMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Borrowed view over the whole buffer.
    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Row-major pixel data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major pixel data.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// The pixel at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.width + x])
    }
}

/// Boolean pixel plane; `true` marks an invalid (masked) pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    data: Vec<bool>,
    width: usize,
    height: usize,
}

impl Mask {
    /// Allocates an all-valid mask.
    pub fn all_valid(width: usize, height: usize) -> AsterMatchResult<Self> {
        required_len(width, height, width)?;
        Ok(Self {
            data: vec![false; width * height],
            width,
            height,
        })
    }

    /// Wraps existing row-major mask data.
    pub fn from_vec(data: Vec<bool>, width: usize, height: usize) -> AsterMatchResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() != needed {
            return Err(AsterMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Mask width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Mask height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Whether the pixel at `(x, y)` is invalid; out-of-bounds reads as
    /// invalid.
    pub fn is_invalid(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return true;
        }
        self.data[y * self.width + x]
    }

    /// Marks the pixel at `(x, y)`.
    pub fn set(&mut self, x: usize, y: usize, invalid: bool) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = invalid;
        }
    }

    /// Row-major mask data.
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Number of invalid pixels.
    pub fn invalid_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// Averages equally sized grayscale planes pixel by pixel, the reduction
/// used to fold a multi-channel exposure into one registration plane.
pub fn mean_of_planes(planes: &[ImageView<'_>]) -> AsterMatchResult<ImageBuffer> {
    let first = planes
        .first()
        .ok_or(AsterMatchError::InvalidInput("no planes to average"))?;
    let (width, height) = (first.width(), first.height());
    if planes
        .iter()
        .any(|p| p.width() != width || p.height() != height)
    {
        return Err(AsterMatchError::InvalidInput(
            "planes to average have mismatched dimensions",
        ));
    }

    let mut out = ImageBuffer::filled(width, height, 0.0)?;
    let scale = 1.0 / planes.len() as f32;
    for plane in planes {
        let data = out.as_mut_slice();
        for y in 0..height {
            let row = plane.row(y).unwrap_or(&[]);
            for (x, v) in row.iter().enumerate() {
                data[y * width + x] += v * scale;
            }
        }
    }
    Ok(out)
}

fn required_len(width: usize, height: usize, stride: usize) -> AsterMatchResult<usize> {
    if width == 0 || height == 0 || stride < width {
        return Err(AsterMatchError::InvalidDimensions { width, height });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(AsterMatchError::InvalidDimensions { width, height })
}

#[cfg(test)]
mod tests {
    use super::{mean_of_planes, ImageBuffer, ImageView, Mask};

    #[test]
    fn strided_views_skip_row_padding() {
        // 3x2 image inside rows of stride 4.
        let data = [1.0, 2.0, 3.0, 99.0, 4.0, 5.0, 6.0];
        let view = ImageView::new(&data, 3, 2, 4).unwrap();
        assert_eq!(view.get(2, 0), Some(3.0));
        assert_eq!(view.get(0, 1), Some(4.0));
        assert_eq!(view.get(3, 0), None);
        let all: Vec<f32> = view.pixels().collect();
        assert_eq!(all, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let data = [0.0; 5];
        assert!(ImageView::from_slice(&data, 3, 2).is_err());
        assert!(ImageBuffer::from_vec(vec![0.0; 5], 3, 2).is_err());
        assert!(Mask::from_vec(vec![false; 5], 3, 2).is_err());
    }

    #[test]
    fn median_is_order_insensitive() {
        let data = [5.0, 1.0, 3.0, 2.0, 4.0, 0.0];
        let view = ImageView::from_slice(&data, 3, 2).unwrap();
        // Even count: the upper of the two middle values.
        assert_eq!(view.median(), 3.0);
    }

    #[test]
    fn value_range_ignores_non_finite_pixels() {
        let data = [1.0, f32::NAN, -2.0, f32::INFINITY, 0.5, 3.0];
        let view = ImageView::from_slice(&data, 3, 2).unwrap();
        assert_eq!(view.value_range(), (-2.0, 3.0));
    }

    #[test]
    fn plane_averaging_is_pixelwise() {
        let a = [0.0, 2.0, 4.0, 6.0];
        let b = [2.0, 2.0, 2.0, 2.0];
        let va = ImageView::from_slice(&a, 2, 2).unwrap();
        let vb = ImageView::from_slice(&b, 2, 2).unwrap();
        let mean = mean_of_planes(&[va, vb]).unwrap();
        assert_eq!(mean.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn mask_reads_out_of_bounds_as_invalid() {
        let mask = Mask::all_valid(2, 2).unwrap();
        assert!(!mask.is_invalid(1, 1));
        assert!(mask.is_invalid(2, 0));
    }
}
