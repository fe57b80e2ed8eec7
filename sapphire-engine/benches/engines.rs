use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sapphire_engine::{EngineKind, Host};

const SR: f32 = 48_000.0;
const BLOCK: usize = 256;

fn bench_engine_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_256_frames");
    for kind in EngineKind::ALL {
        let engine = match kind.build(SR) {
            Ok(e) => e,
            Err(_) => continue,
        };
        let mut host = match Host::new(engine, SR) {
            Ok(h) => h,
            Err(_) => continue,
        };
        let mut buf = vec![0.0_f32; 2 * BLOCK];
        group.bench_with_input(BenchmarkId::from_parameter(kind.name()), &kind, |b, _| {
            b.iter(|| {
                host.render_interleaved(&mut buf, 2, |i| {
                    let x = (i as f32 * 0.031).sin();
                    [x, 0.5 * x]
                });
                black_box(&buf);
            })
        });
    }
    group.finish();
}

fn bench_nucleus_update(c: &mut Criterion) {
    use sapphire_engine::nucleus::{set_minimum_energy, NucleusEngine, NUM_PARTICLES};
    let mut engine = NucleusEngine::new(NUM_PARTICLES).expect("five particles");
    set_minimum_energy(&mut engine);
    c.bench_function("nucleus_update_16x", |b| {
        b.iter(|| black_box(engine.update(16.0 / f64::from(SR), 0.1, SR, 1.0)))
    });
}

criterion_group!(benches, bench_engine_blocks, bench_nucleus_update);
criterion_main!(benches);
