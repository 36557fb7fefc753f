use astermatch::{
    apply_transform, find_transform_points, generate_asterisms, match_asterisms,
    BicubicResampler, ImageView, Point, RegisterConfig, SimilarityTransform,
};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn make_field(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Point::new(
                rng.random_range(0.0..1000.0),
                rng.random_range(0.0..1000.0),
            )
        })
        .collect()
}

fn make_image(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = ((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF;
            data.push(value as f32);
        }
    }
    data
}

fn bench_registration(c: &mut Criterion) {
    let model = SimilarityTransform::from_parts(0.35, 1.2, (40.0, -25.0), false);
    let inverse = model.inverse().unwrap();

    for n in [30usize, 50] {
        let target = make_field(n, 17);
        let source: Vec<Point> = target.iter().map(|&p| inverse.apply(p)).collect();
        let config = RegisterConfig {
            seed: Some(1),
            ..RegisterConfig::default()
        };

        c.bench_function(&format!("generate_asterisms_{n}"), |b| {
            b.iter(|| black_box(generate_asterisms(black_box(&source))));
        });

        let source_asterisms = generate_asterisms(&source);
        let target_asterisms = generate_asterisms(&target);
        c.bench_function(&format!("match_asterisms_{n}"), |b| {
            b.iter(|| {
                black_box(match_asterisms(
                    black_box(&source_asterisms),
                    black_box(&target_asterisms),
                ))
            });
        });

        c.bench_function(&format!("find_transform_points_{n}"), |b| {
            b.iter(|| {
                black_box(find_transform_points(&source, &target, &config).unwrap())
            });
        });
    }
}

fn bench_warp(c: &mut Criterion) {
    let width = 512;
    let height = 512;
    let image = make_image(width, height);
    let view = ImageView::from_slice(&image, width, height).unwrap();
    let model = SimilarityTransform::from_parts(0.2, 1.05, (12.0, -8.0), false);

    c.bench_function("apply_transform_512", |b| {
        b.iter(|| {
            black_box(
                apply_transform(
                    &BicubicResampler,
                    &model,
                    view,
                    None,
                    width,
                    height,
                    None,
                    false,
                )
                .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_registration, bench_warp);
criterion_main!(benches);
