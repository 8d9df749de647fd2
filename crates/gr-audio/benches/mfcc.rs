use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gr_audio::{GenreExtractor, MfccExtractor};
use gr_core::ExtractConfig;

fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22050.0).sin() * 0.5)
        .collect()
}

fn bench_segment(c: &mut Criterion) {
    let mut mfcc = MfccExtractor::new(22050, 2048, 512, 128, 13);
    let segment = tone(66_150);
    c.bench_function("mfcc_segment_3s", |b| {
        b.iter(|| mfcc.compute(black_box(&segment)));
    });
}

fn bench_track(c: &mut Criterion) {
    let Ok(extractor) = GenreExtractor::new(ExtractConfig::default()) else {
        return;
    };
    let track = tone(661_500);
    c.bench_function("mfcc_track_30s_10_segments", |b| {
        b.iter(|| extractor.process_signal(black_box(&track)));
    });
}

criterion_group!(benches, bench_segment, bench_track);
criterion_main!(benches);
