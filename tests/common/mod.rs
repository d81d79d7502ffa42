#![allow(dead_code)]

use std::path::{Path, PathBuf};

use emotion_classifier::Emotion;
use hound::{SampleFormat, WavSpec, WavWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SAMPLE_RATE: u32 = 22_050;

/// Sine at `frequency` with a little seeded noise on top.
pub fn tone(frequency: f32, seconds: f32, sample_rate: u32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (seconds * sample_rate as f32) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 * (std::f32::consts::TAU * frequency * t).sin() + rng.random_range(-0.02..0.02)
        })
        .collect()
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

/// Corpus filename carrying `emotion` in the third hyphen-delimited token.
pub fn clip_name(emotion: Emotion, repetition: usize) -> String {
    format!("03-01-{}-01-01-{:02}-{:02}.wav", emotion.code(), repetition, repetition % 24 + 1)
}

/// `per_class` clips for each of the eight emotions, one pitch per emotion,
/// spread over two actor sub-directories.
pub fn write_corpus(dir: &Path, per_class: usize, seconds: f32) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for (class, emotion) in Emotion::ALL.iter().enumerate() {
        let frequency = 200.0 * (1.0 + class as f32 * 0.35);
        for repetition in 0..per_class {
            let actor = dir.join(format!("Actor_{:02}", repetition % 2 + 1));
            std::fs::create_dir_all(&actor).unwrap();
            let path = actor.join(clip_name(*emotion, repetition));
            let seed = (class * 1000 + repetition) as u64;
            write_wav(&path, &tone(frequency, seconds, SAMPLE_RATE, seed), SAMPLE_RATE);
            paths.push(path);
        }
    }
    paths
}
