//! Mixer kernel benchmarks
//!
//! Measures the per-device-cycle cost of the mix-add and volume-scaling
//! kernels at stream counts and buffer sizes representative of a busy
//! output device (spec.md §4.3 steps 5/7).

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use audiosrv_dsp::mixer::{mix_add, scale_volume};

fn benchmark_mix_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix_add");

    for stream_count in [1, 2, 4, 8].iter() {
        let frames = 480usize; // 10ms at 48kHz
        let channels = 2;
        let mut dest = vec![0.0f32; frames * channels];
        let sources: Vec<Vec<f32>> = (0..*stream_count)
            .map(|i| vec![0.05 * (i + 1) as f32; frames * channels])
            .collect();

        group.throughput(Throughput::Elements((frames * channels) as u64 * *stream_count as u64));
        group.bench_function(format!("{stream_count}_streams"), |b| {
            b.iter(|| {
                dest.fill(0.0);
                for source in &sources {
                    mix_add(black_box(&mut dest), black_box(source));
                }
            })
        });
    }

    group.finish();
}

fn benchmark_scale_volume(c: &mut Criterion) {
    let mut buffer = vec![0.3f32; 480 * 2];

    c.bench_function("scale_volume_960_samples", |b| {
        b.iter(|| {
            scale_volume(black_box(&mut buffer), black_box(0.8));
        })
    });
}

criterion_group!(benches, benchmark_mix_add, benchmark_scale_volume);
criterion_main!(benches);
