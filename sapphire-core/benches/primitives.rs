use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sapphire_core::prelude::*;

const SR: f32 = 44_100.0;

fn bench_staged_filter(c: &mut Criterion) {
    let mut hp = StagedFilter::<f32, 3>::new();
    hp.set_cutoff_frequency(20.0);
    c.bench_function("staged_filter_hi_pass_3", |b| {
        let mut phase = 0.0_f32;
        b.iter(|| {
            phase += 440.0 / SR;
            black_box(hp.update_hi_pass(black_box(phase.sin()), SR))
        })
    });
}

fn bench_effective_velocity(c: &mut Criterion) {
    let v = PhysicsVector::new(700.0, -300.0, 250.0);
    c.bench_function("effective_velocity", |b| {
        b.iter(|| black_box(effective_velocity(black_box(v), 1000.0)))
    });
}

fn bench_agc_block(c: &mut Criterion) {
    let mut agc = AutomaticGainLimiter::new();
    agc.set_ceiling(0.8);
    let block: Vec<f32> = (0..64).map(|i| 3.0 * (0.05 * i as f32).sin()).collect();
    c.bench_function("agc_64_frames", |b| {
        b.iter(|| {
            for &s in &block {
                let mut frame = [s, -s];
                agc.process(SR, &mut frame);
                black_box(frame);
            }
        })
    });
}

fn bench_interpolated_read(c: &mut Criterion) {
    let mut line = DelayLine::<Complex>::new(2048).unwrap();
    for n in 0..2048 {
        line.write(Complex::new((n as f32 * 0.01).sin(), (n as f32 * 0.013).cos()));
    }
    let mut it = Interpolator::new();
    it.set_delay(831.37, line.len());
    c.bench_function("interpolator_read_complex", |b| {
        b.iter(|| black_box(it.read(black_box(&line))))
    });
}

criterion_group!(
    benches,
    bench_staged_filter,
    bench_effective_velocity,
    bench_agc_block,
    bench_interpolated_read
);
criterion_main!(benches);
