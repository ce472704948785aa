use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use smap::compose::SmapBuilder;
use smap::models::{FileMapping, RangeMapping, Smap};
use smap::{parse, serialize};

/// A class of 200 own lines with `inlines` callees of 1..12 lines each.
fn composed(inlines: usize, rng: &mut SmallRng) -> Smap {
    let mut builder = SmapBuilder::new("Main.kt", "app/MainKt", 200);
    for i in 0..inlines {
        let len = rng.random_range(1..12);
        let source = rng.random_range(1..500);
        let name = format!("Lib{}.kt", i % 16);
        let callee = Smap::new(
            name.as_str(),
            vec![FileMapping::with_mappings(
                1,
                name.as_str(),
                Some(format!("lib/Lib{}Kt", i % 16).into()),
                RangeMapping::new(source, 1, len, 0),
            )],
        );
        if builder.inline(&callee).is_err() {
            break;
        }
    }
    match builder.build() {
        Ok(smap) => smap,
        Err(e) => panic!("benchmark input is invalid: {e}"),
    }
}

fn bench_resolve(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);
    let mut group = c.benchmark_group("resolve");
    for inlines in [10, 100, 1000] {
        let smap = composed(inlines, &mut rng);
        let Some((lo, hi)) = smap.dest_span() else {
            continue;
        };
        let lines: Vec<u32> = (0..1024).map(|_| rng.random_range(lo..hi + 8)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(inlines), &smap, |b, smap| {
            b.iter(|| {
                let mut hits = 0usize;
                for &line in &lines {
                    if smap.resolve(black_box(line)).is_some() {
                        hits += 1;
                    }
                }
                black_box(hits)
            })
        });
    }
    group.finish();
}

fn bench_text(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(7);
    let smap = composed(500, &mut rng);
    let text = serialize(&smap);

    c.bench_function("text/parse", |b| {
        b.iter(|| black_box(parse(black_box(&text))))
    });
    c.bench_function("text/serialize", |b| {
        b.iter(|| black_box(serialize(black_box(&smap))))
    });
}

fn bench_compose(c: &mut Criterion) {
    c.bench_function("compose/100_inlines", |b| {
        b.iter(|| {
            let mut rng = SmallRng::seed_from_u64(1);
            black_box(composed(100, &mut rng))
        })
    });
}

criterion_group!(benches, bench_resolve, bench_text, bench_compose);
criterion_main!(benches);
