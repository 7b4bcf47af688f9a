//! Classification benchmark
//!
//! Compares a full current matrix against a baseline of the same shape.
//! A 60-machine fleet gives 3540 probed pairs, well above any real
//! deployment.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench classify_matrix
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use linkrtt::baseline::{self, BaselineStore, BaselineStrictness};
use linkrtt::deviation::{compare, DeviationThresholds};
use linkrtt::machine::MachineId;
use linkrtt::matrix::ProbeMatrix;
use linkrtt::sample::{LatencySample, ProbeCell};
use std::path::Path;

fn fleet(n: usize) -> Vec<MachineId> {
    (0..n)
        .map(|i| MachineId::new(format!("db{}", i), format!("dc{}", i % 12)))
        .collect()
}

/// Deterministic matrix; `drift` scales every third link
fn matrix(machines: &[MachineId], drift: f64) -> ProbeMatrix {
    let mut entries = Vec::with_capacity(machines.len() * machines.len());
    for (i, source) in machines.iter().enumerate() {
        for (j, target) in machines.iter().enumerate() {
            let cell = if i == j {
                ProbeCell::NotProbed
            } else {
                let base = 500.0 + ((i * 31 + j * 17) % 200) as f64 * 400.0;
                let avg = if (i + j) % 3 == 0 { base * drift } else { base };
                ProbeCell::Measured(LatencySample::from_micros(
                    avg * 0.95,
                    avg,
                    avg * 1.05,
                    avg * 0.01,
                ))
            };
            entries.push((source.clone(), target.clone(), cell));
        }
    }
    entries.into_iter().collect()
}

fn bench_compare(c: &mut Criterion) {
    let thresholds = DeviationThresholds::new(20.0, 2_000.0);
    let mut group = c.benchmark_group("compare");

    for n in [10usize, 30, 60] {
        let machines = fleet(n);
        let baseline = BaselineStore::from_matrix(matrix(&machines, 1.0));
        let current = matrix(&machines, 1.4);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| compare(black_box(&current), black_box(&baseline), &thresholds))
        });
    }

    group.finish();
}

fn bench_baseline_parse(c: &mut Criterion) {
    let text = baseline::serialize(&matrix(&fleet(60), 1.0));

    c.bench_function("baseline_parse_60", |b| {
        b.iter(|| {
            BaselineStore::parse(
                black_box(&text),
                Path::new("bench.ref"),
                BaselineStrictness::Lenient,
            )
        })
    });
}

criterion_group!(benches, bench_compare, bench_baseline_parse);
criterion_main!(benches);
