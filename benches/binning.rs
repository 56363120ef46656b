//! Criterion benchmarks for the binning hot loop.
//!
//! Key metrics:
//! - Decode/accumulate throughput (words/sec) in net-trues and separated mode
//! - Cost of interleaved tick and singles tags
//!
//! Run with: cargo bench --bench binning

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pet_histogrammer::prelude::*;
use pet_histogrammer::layout::{FixedResources, PlanLimits};
use pet_histogrammer::tags::{singles_tag, time_tag};
use std::sync::Arc;

const BINS: u32 = 256 * 288 * 207;

fn session(mode: SinogramMode) -> Session {
    let mut session = Session::new(&ScannerModel::Hrrt, Arc::new(TracingSink))
        .with_resources(Arc::new(FixedResources {
            memory: 1 << 36,
            disk: Some(1 << 40),
        }))
        .with_limits(PlanLimits::default());
    session.set_attributes(256, 288, 207, 0).unwrap();
    session
        .set_sinogram_mode(mode, SinogramMode::NetTrues, AcquisitionMode::EmissionOnly)
        .unwrap();
    session.configure("/tmp/bench.s", None).unwrap();
    session.start().unwrap();
    session
}

/// Pseudo-random event stream: 3 prompts per random, spread over the bin space.
fn event_words(count: usize, tag_every: usize) -> Vec<i32> {
    let mut state = 0x2545_F491u32;
    (0..count)
        .map(|i| {
            if tag_every > 0 && i % tag_every == 0 {
                return if i % (2 * tag_every) == 0 {
                    time_tag() as i32
                } else {
                    singles_tag((i % 936) as u32, 1200) as i32
                };
            }
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let bin = state % BINS;
            if i % 4 == 0 {
                random_word(bin)
            } else {
                prompt_word(bin)
            }
        })
        .collect()
}

fn binning_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("binning");

    for (name, mode) in [
        ("net_trues", SinogramMode::NetTrues),
        ("prompts_and_randoms", SinogramMode::PromptsAndRandoms),
    ] {
        let words = event_words(256 * 1024, 0);
        let mut session = session(mode);

        group.throughput(Throughput::Elements(words.len() as u64));
        group.bench_with_input(BenchmarkId::new("feed", name), &words, |b, words| {
            b.iter(|| {
                session
                    .feed(black_box(words), PresetSignal::None)
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn binning_with_tags(c: &mut Criterion) {
    let mut group = c.benchmark_group("binning_tags");

    for tag_every in [1000usize, 100, 10] {
        let words = event_words(256 * 1024, tag_every);
        let mut session = session(SinogramMode::NetTrues);

        group.throughput(Throughput::Elements(words.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("tag_every", tag_every),
            &words,
            |b, words| {
                b.iter(|| {
                    session
                        .feed(black_box(words), PresetSignal::None)
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, binning_throughput, binning_with_tags);
criterion_main!(benches);
