//! Benchmark suite for parole-algo
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parole_algo::{classify, compute_mastery_level, next_review_date, ReviewIntervals};

fn bench_compute_mastery_level(c: &mut Criterion) {
    c.bench_function("compute_mastery_level", |b| {
        b.iter(|| {
            for correct in 0..30 {
                black_box(compute_mastery_level(black_box(correct), black_box(5)));
            }
        })
    });
}

fn bench_schedule_and_classify(c: &mut Criterion) {
    let intervals = ReviewIntervals::default();
    let practiced = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap();

    c.bench_function("next_review_date+classify", |b| {
        b.iter(|| {
            for level in 0..=6 {
                let next = next_review_date(&intervals, black_box(level), practiced);
                black_box(classify(Some(next), now, 3));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_compute_mastery_level,
    bench_schedule_and_classify
);
criterion_main!(benches);
