mod common;

use approx::assert_abs_diff_eq;
use emotion_classifier::features::fix_length;
use emotion_classifier::{extract_pooled, extract_sequence, FeatureExtractor, SpectralConfig};
use ndarray::{array, Axis};

use common::{tone, write_wav, SAMPLE_RATE};

#[test]
fn pooled_length_depends_only_on_flags() {
    let dir = tempfile::tempdir().unwrap();
    for (name, seconds) in [("short.wav", 0.05), ("long.wav", 2.5)] {
        let path = dir.path().join(name);
        write_wav(&path, &tone(440.0, seconds, SAMPLE_RATE, 3), SAMPLE_RATE);

        assert_eq!(extract_pooled(&path, true, true, true).unwrap().len(), 180);
        assert_eq!(extract_pooled(&path, true, false, false).unwrap().len(), 40);
        assert_eq!(extract_pooled(&path, false, true, false).unwrap().len(), 12);
        assert_eq!(extract_pooled(&path, false, false, true).unwrap().len(), 128);
        assert_eq!(extract_pooled(&path, true, true, false).unwrap().len(), 52);
    }
}

#[test]
fn no_enabled_block_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    write_wav(&path, &tone(440.0, 0.2, SAMPLE_RATE, 3), SAMPLE_RATE);
    assert!(extract_pooled(&path, false, false, false).is_err());
}

#[test]
fn sequence_shape_is_fixed_for_short_and_long_clips() {
    let dir = tempfile::tempdir().unwrap();
    for (name, seconds) in [("tiny.wav", 0.02), ("mid.wav", 0.5), ("long.wav", 3.0)] {
        let path = dir.path().join(name);
        write_wav(&path, &tone(330.0, seconds, SAMPLE_RATE, 5), SAMPLE_RATE);
        let sequence = extract_sequence(&path, 40, 60).unwrap();
        assert_eq!(sequence.dim(), (60, 40));
        assert!(sequence.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn short_sequences_are_zero_padded_at_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.wav");
    // 0.25 s at hop 512 gives roughly a dozen frames
    write_wav(&path, &tone(330.0, 0.25, SAMPLE_RATE, 5), SAMPLE_RATE);
    let sequence = extract_sequence(&path, 20, 100).unwrap();
    assert!(sequence.row(0).iter().any(|&v| v != 0.0));
    assert!(sequence.row(99).iter().all(|&v| v == 0.0));
}

#[test]
fn clips_at_other_rates_are_resampled_first() {
    let dir = tempfile::tempdir().unwrap();
    let native = dir.path().join("native.wav");
    let low = dir.path().join("low.wav");
    write_wav(&native, &tone(440.0, 1.0, SAMPLE_RATE, 9), SAMPLE_RATE);
    write_wav(&low, &tone(440.0, 1.0, 16_000, 9), 16_000);

    let extractor = FeatureExtractor::new(SpectralConfig::default());
    let a = extractor.load(&native).unwrap();
    let b = extractor.load(&low).unwrap();
    assert!((a.len() as i64 - b.len() as i64).abs() <= 2);
    assert_eq!(extractor.extract_sequence(&low, 13, 30).unwrap().dim(), (30, 13));
}

#[test]
fn missing_file_is_an_error_not_a_panic() {
    assert!(extract_sequence(std::path::Path::new("/nonexistent/clip.wav"), 20, 10).is_err());
}

#[test]
fn fix_length_truncates_and_pads_along_any_axis() {
    let frames = array![[1.0_f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
    let cut = fix_length(frames.view(), 2, Axis(0));
    assert_eq!(cut, array![[1.0, 2.0], [3.0, 4.0]]);
    let padded = fix_length(frames.view(), 4, Axis(1));
    assert_eq!(padded.dim(), (3, 4));
    assert_abs_diff_eq!(padded[[2, 3]], 0.0);
    assert_abs_diff_eq!(padded[[2, 1]], 6.0);
}
