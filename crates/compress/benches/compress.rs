//! Benchmarks for the compression pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use upload_compress::search::{run, SearchParams};
use upload_compress::{fit_within, Codec, DimensionCap, Dimensions};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn bench_fit_within(c: &mut Criterion) {
    c.bench_function("fit_within", |b| {
        b.iter(|| {
            fit_within(
                black_box(Dimensions::new(4000, 3000)),
                black_box(DimensionCap::new(1920, 1080)),
            )
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let params = SearchParams {
        target_kb: 600.0,
        start_quality: 85,
        floor: 60,
        step: 10,
        max_retries: 3,
    };

    c.bench_function("search_to_floor", |b| {
        b.iter(|| run(black_box(&params), |quality| Ok(700.0 + quality as f64)))
    });
}

fn bench_encode(c: &mut Criterion) {
    let img = gradient(512, 512);
    let mut group = c.benchmark_group("encode_512");

    for codec in Codec::ALL {
        group.bench_function(codec.to_string(), |b| {
            b.iter(|| {
                let mut buffer = Vec::with_capacity(256 * 1024);
                codec.encode(black_box(&img), 80, &mut buffer).unwrap();
                buffer
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit_within, bench_search, bench_encode);
criterion_main!(benches);
