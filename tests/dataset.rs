mod common;

use std::collections::BTreeSet;

use emotion_classifier::dataset::{parse_emotion, LabelPolicy, SplitConfig, SplitMode};
use emotion_classifier::{AugmentConfig, DatasetBuilder, DatasetConfig, EmotionError, PooledFlags};

use common::{write_corpus, write_wav, SAMPLE_RATE};

fn classes(labels: &[usize]) -> BTreeSet<usize> {
    labels.iter().copied().collect()
}

#[test]
fn eighty_clips_split_sixty_four_sixteen_with_every_class_on_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 10, 0.4);

    let builder = DatasetBuilder::new(DatasetConfig::new([dir.path()])).unwrap();
    let split = builder.load_sequences(13, 20).unwrap();

    assert_eq!(split.train.len(), 64);
    assert_eq!(split.test.len(), 16);
    assert_eq!(split.encoder.num_classes(), 8);
    assert_eq!(classes(&split.train.labels).len(), 8);
    assert_eq!(classes(&split.test.labels).len(), 8);
    assert!(split.train.features.iter().all(|f| f.dim() == (20, 13)));
    assert_eq!(split.test.to_tensor().unwrap().dim(), (16, 20, 13));
}

#[test]
fn corrupt_clip_is_skipped_without_failing_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_corpus(dir.path(), 10, 0.4);
    std::fs::write(&paths[3], b"definitely not a wav file").unwrap();

    let builder = DatasetBuilder::new(DatasetConfig::new([dir.path()])).unwrap();
    let split = builder.load_pooled(PooledFlags::default()).unwrap();

    assert_eq!(split.train.len() + split.test.len(), 79);
    assert!(split.train.features.iter().all(|f| f.len() == 180));
}

#[test]
fn augmentation_by_clip_keeps_siblings_together() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 5, 0.3);

    let config = DatasetConfig::new([dir.path()]).with_augmentation(Some(AugmentConfig::default()));
    let split = DatasetBuilder::new(config)
        .unwrap()
        .load_pooled(PooledFlags::new(true, false, false))
        .unwrap();

    // one clip per class held out, three variants each
    assert_eq!(split.test.len(), 24);
    assert_eq!(split.train.len(), 96);
    for chunk in split.test.labels.chunks(3) {
        assert!(chunk.iter().all(|&label| label == chunk[0]));
    }
}

#[test]
fn augmentation_by_example_stratifies_over_all_variants() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 5, 0.3);

    let config = DatasetConfig::new([dir.path()])
        .with_augmentation(Some(AugmentConfig::default()))
        .with_split(SplitConfig {
            mode: SplitMode::ByExample,
            ..SplitConfig::default()
        });
    let split = DatasetBuilder::new(config)
        .unwrap()
        .load_pooled(PooledFlags::new(true, false, false))
        .unwrap();

    // 15 examples per class, round(15 * 0.2) = 3 held out
    assert_eq!(split.test.len(), 24);
    assert_eq!(split.train.len(), 96);
}

#[test]
fn builds_are_reproducible_for_a_seed() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 3, 0.3);
    let config = DatasetConfig::new([dir.path()]).with_augmentation(Some(AugmentConfig::default()));

    let first = DatasetBuilder::new(config.clone())
        .unwrap()
        .load_pooled(PooledFlags::new(true, false, false))
        .unwrap();
    let second = DatasetBuilder::new(config)
        .unwrap()
        .load_pooled(PooledFlags::new(true, false, false))
        .unwrap();
    assert_eq!(first.train.labels, second.train.labels);
    assert_eq!(first.train.features, second.train.features);
}

#[test]
fn unlabelled_files_are_skipped_or_rejected_by_policy() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 2, 0.2);
    let stray = dir.path().join("session-notes.wav");
    write_wav(&stray, &common::tone(300.0, 0.2, SAMPLE_RATE, 1), SAMPLE_RATE);
    let unknown_code = dir.path().join("03-01-09-01-01-01-01.wav");
    write_wav(&unknown_code, &common::tone(300.0, 0.2, SAMPLE_RATE, 2), SAMPLE_RATE);

    let lenient = DatasetBuilder::new(DatasetConfig::new([dir.path()])).unwrap();
    assert_eq!(lenient.discover_clips().unwrap().len(), 16);

    let strict = DatasetBuilder::new(DatasetConfig {
        label_policy: LabelPolicy::Strict,
        ..DatasetConfig::new([dir.path()])
    })
    .unwrap();
    assert!(matches!(strict.discover_clips(), Err(EmotionError::Label { .. })));
}

#[test]
fn empty_corpus_is_a_descriptive_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("03-01-05-01-01-01-01.txt"), b"not audio").unwrap();

    let builder = DatasetBuilder::new(DatasetConfig::new([dir.path()])).unwrap();
    let err = builder.load_sequences(13, 20).unwrap_err();
    assert!(matches!(err, EmotionError::EmptyDataset { .. }));
    assert!(err.to_string().contains(&dir.path().display().to_string()));
}

#[test]
fn emotion_code_is_the_third_token() {
    let path = std::path::Path::new("Actor_01/03-01-05-01-02-01-12.wav");
    assert_eq!(parse_emotion(path).map(|e| e.as_str()), Some("angry"));
    assert_eq!(parse_emotion(std::path::Path::new("03-01.wav")), None);
}
