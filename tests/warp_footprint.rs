//! Footprint and fill semantics of the transform applier.

use astermatch::{
    apply_transform, BicubicResampler, ImageView, Mask, Point, SimilarityTransform,
};

fn gradient_image(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            data.push((x + 2 * y) as f32 * 0.5 + 10.0);
        }
    }
    data
}

#[test]
fn identity_transform_keeps_every_pixel_valid() {
    let data = gradient_image(16, 16);
    let view = ImageView::from_slice(&data, 16, 16).unwrap();
    let (aligned, footprint) = apply_transform(
        &BicubicResampler,
        &SimilarityTransform::identity(),
        view,
        None,
        16,
        16,
        None,
        false,
    )
    .unwrap();

    assert_eq!(footprint.invalid_count(), 0);
    for (got, want) in aligned.as_slice().iter().zip(data.iter()) {
        assert!((got - want).abs() < 1e-3);
    }
}

#[test]
fn pixels_outside_the_warped_silhouette_are_invalid() {
    let data = gradient_image(20, 20);
    let view = ImageView::from_slice(&data, 20, 20).unwrap();
    // Model maps source -> target, shifted by (+5, +3); output pixels with
    // x < 5 or y < 3 have no source data behind them.
    let model = SimilarityTransform::from_parts(0.0, 1.0, (5.0, 3.0), false);

    for fill in [None, Some(-1.0)] {
        let (aligned, footprint) = apply_transform(
            &BicubicResampler,
            &model,
            view,
            None,
            20,
            20,
            fill,
            false,
        )
        .unwrap();

        for y in 0..20 {
            for x in 0..20 {
                let outside = x < 5 || y < 3;
                assert_eq!(
                    footprint.is_invalid(x, y),
                    outside,
                    "footprint mismatch at ({x}, {y}) with fill {fill:?}"
                );
                if outside {
                    if let Some(fill) = fill {
                        assert_eq!(aligned.get(x, y), Some(fill));
                    }
                }
            }
        }
    }
}

#[test]
fn interior_pixels_carry_resampled_source_data() {
    let data = gradient_image(20, 20);
    let view = ImageView::from_slice(&data, 20, 20).unwrap();
    let model = SimilarityTransform::from_parts(0.0, 1.0, (5.0, 3.0), false);
    let (aligned, _) = apply_transform(
        &BicubicResampler,
        &model,
        view,
        None,
        20,
        20,
        None,
        false,
    )
    .unwrap();

    // out(x, y) should hold src(x - 5, y - 3).
    for y in 3..20 {
        for x in 5..20 {
            let want = data[(y - 3) * 20 + (x - 5)];
            let got = aligned.get(x, y).unwrap();
            assert!((got - want).abs() < 1e-3, "mismatch at ({x}, {y})");
        }
    }
}

#[test]
fn output_stays_within_the_source_value_range() {
    let data = gradient_image(24, 24);
    let (lo, hi) = (
        data.iter().cloned().fold(f32::INFINITY, f32::min),
        data.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
    );
    let view = ImageView::from_slice(&data, 24, 24).unwrap();
    let model = SimilarityTransform::from_parts(0.3, 1.1, (2.5, -1.5), false);
    let (aligned, _) = apply_transform(
        &BicubicResampler,
        &model,
        view,
        None,
        24,
        24,
        None,
        false,
    )
    .unwrap();
    for &v in aligned.as_slice() {
        assert!(v >= lo && v <= hi);
    }
}

#[test]
fn source_mask_propagates_into_the_footprint() {
    let data = gradient_image(20, 20);
    let view = ImageView::from_slice(&data, 20, 20).unwrap();
    let mut mask = Mask::all_valid(20, 20).unwrap();
    for y in 8..12 {
        for x in 8..12 {
            mask.set(x, y, true);
        }
    }
    let model = SimilarityTransform::from_parts(0.0, 1.0, (2.0, 0.0), false);

    let (_, without) = apply_transform(
        &BicubicResampler,
        &model,
        view,
        Some(&mask),
        20,
        20,
        None,
        false,
    )
    .unwrap();
    assert!(!without.is_invalid(12, 10));

    let (_, with) = apply_transform(
        &BicubicResampler,
        &model,
        view,
        Some(&mask),
        20,
        20,
        None,
        true,
    )
    .unwrap();
    // The masked block lands shifted by +2 in x.
    assert!(with.is_invalid(11, 10));
    assert!(with.is_invalid(13, 9));
    assert!(!with.is_invalid(16, 16));
    assert!(with.invalid_count() > without.invalid_count());
}

#[test]
fn degenerate_models_are_rejected() {
    let data = gradient_image(8, 8);
    let view = ImageView::from_slice(&data, 8, 8).unwrap();
    let model = SimilarityTransform::from_parts(0.0, 0.0, (0.0, 0.0), false);
    assert!(apply_transform(
        &BicubicResampler,
        &model,
        view,
        None,
        8,
        8,
        None,
        false,
    )
    .is_err());

    // A model is also unusable when its mapping collapses points.
    let p = Point::new(1.0, 2.0);
    assert_eq!(model.apply(p), Point::new(0.0, 0.0));
}
