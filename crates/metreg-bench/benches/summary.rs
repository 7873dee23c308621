//! Quantile summary benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use metreg_core::prometheus::core::Collector;
use metreg_core::{Objectives, SummaryOpts, SummaryVec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn summary_vec(objectives: Objectives) -> SummaryVec {
    SummaryVec::new(
        SummaryOpts::new("bench_summary", "bench").objectives(objectives),
        &["peer"],
    )
    .unwrap()
}

fn bench_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary/observe");
    let mut rng = StdRng::seed_from_u64(3);

    let cases = [
        ("none", Objectives::none()),
        ("p50", Objectives::new([(0.5, 0.05)]).unwrap()),
        ("default", Objectives::default()),
    ];
    for (name, objectives) in cases {
        let child = summary_vec(objectives).with_label_values(&["a"]);
        group.bench_function(name, |b| {
            b.iter(|| child.observe(black_box(rng.gen_range(0.0..100.0))));
        });
    }

    group.finish();
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary/collect");
    let mut rng = StdRng::seed_from_u64(5);

    for samples in [100usize, 10_000] {
        let vec = summary_vec(Objectives::default());
        let child = vec.with_label_values(&["a"]);
        for _ in 0..samples {
            child.observe(rng.gen_range(0.0..100.0));
        }
        group.bench_with_input(BenchmarkId::from_parameter(samples), &vec, |b, vec| {
            b.iter(|| black_box(vec.collect()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_observe, bench_collect);
criterion_main!(benches);
