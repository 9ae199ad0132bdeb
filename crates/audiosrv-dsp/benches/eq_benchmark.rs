//! Equalizer benchmarks
//!
//! Measures the per-stage cost of the DSP pipeline adapter's EQ and soft
//! clip stages at the buffer sizes the audio thread actually uses.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use audiosrv_dsp::{Equalizer, SoftClipper};

fn benchmark_equalizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("equalizer");

    for buffer_size in [64, 128, 256, 512, 1024].iter() {
        let sample_rate = 48000.0;
        let mut eq = Equalizer::new(sample_rate);

        let mut buffer: Vec<f32> = (0..*buffer_size * 2)
            .map(|i| (i as f32 * 0.001).sin())
            .collect();

        group.throughput(Throughput::Elements(*buffer_size as u64 * 2));
        group.bench_function(format!("process_{buffer_size}_frames"), |b| {
            b.iter(|| {
                eq.process_interleaved(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}

fn benchmark_soft_clip(c: &mut Criterion) {
    let clipper = SoftClipper::new(0.9);
    let mut buffer: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin() * 1.2).collect();

    c.bench_function("soft_clip_1024_samples", |b| {
        b.iter(|| {
            clipper.process_interleaved(black_box(&mut buffer));
        })
    });
}

criterion_group!(benches, benchmark_equalizer, benchmark_soft_clip);
criterion_main!(benches);
