//! Corpus discovery, labelling, augmentation and train/test partitioning.

pub mod labels;
pub mod split;

use std::path::{Path, PathBuf};

use ndarray::{stack, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::augment::{AugmentConfig, Augmentor};
use crate::error::{EmotionError, Result};
use crate::features::{FeatureExtractor, PooledFlags, SpectralConfig};
use crate::types::{Clip, Emotion};

pub use labels::LabelEncoder;
pub use split::{stratified_kfold, stratified_split, SplitConfig, SplitIndices, SplitMode};

/// What to do with files whose name does not carry a recognised emotion code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelPolicy {
    /// Skip and count them.
    #[default]
    Lenient,
    /// Fail the build on the first one.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub roots: Vec<PathBuf>,
    pub extension: String,
    pub label_policy: LabelPolicy,
    pub augmentation: Option<AugmentConfig>,
    pub split: SplitConfig,
    pub spectral: SpectralConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extension: "wav".to_string(),
            label_policy: LabelPolicy::Lenient,
            augmentation: None,
            split: SplitConfig::default(),
            spectral: SpectralConfig::default(),
        }
    }
}

impl DatasetConfig {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_augmentation(mut self, augmentation: Option<AugmentConfig>) -> Self {
        self.augmentation = augmentation;
        self
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(EmotionError::config("at least one dataset root is required"));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(EmotionError::config("audio extension must not be empty"));
        }
        if let Some(augment) = &self.augmentation {
            if !(0.0..1.0).contains(&augment.shift_max_fraction) {
                return Err(EmotionError::config("shift_max_fraction must lie in [0, 1)"));
            }
        }
        self.split.validate()?;
        self.spectral.validate()
    }
}

/// Parallel feature rows and encoded labels.
#[derive(Debug, Clone, Default)]
pub struct Dataset<F> {
    pub features: Vec<F>,
    pub labels: Vec<usize>,
}

impl<F> Dataset<F> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn push(&mut self, features: F, label: usize) {
        self.features.push(features);
        self.labels.push(label);
    }
}

impl Dataset<Array1<f32>> {
    /// `(examples, features)` matrix.
    pub fn to_matrix(&self) -> Result<Array2<f32>> {
        let views: Vec<ArrayView1<'_, f32>> = self.features.iter().map(|f| f.view()).collect();
        Ok(stack(Axis(0), &views)?)
    }
}

impl Dataset<Array2<f32>> {
    /// `(examples, time, coefficients)` tensor.
    pub fn to_tensor(&self) -> Result<Array3<f32>> {
        let views: Vec<ArrayView2<'_, f32>> = self.features.iter().map(|f| f.view()).collect();
        Ok(stack(Axis(0), &views)?)
    }
}

#[derive(Debug, Clone)]
pub struct TrainTestSplit<F> {
    pub train: Dataset<F>,
    pub test: Dataset<F>,
    pub encoder: LabelEncoder,
}

/// Extract the emotion from the third hyphen-delimited token of the file stem.
pub fn parse_emotion(path: &Path) -> Option<Emotion> {
    let stem = path.file_stem()?.to_str()?;
    let code = stem.split('-').nth(2)?;
    Emotion::from_code(code)
}

// Every variant extracted for one source clip, the un-augmented one first.
struct ClipFeatures<F> {
    emotion: Emotion,
    variants: Vec<F>,
}

pub struct DatasetBuilder {
    config: DatasetConfig,
    extractor: FeatureExtractor,
}

impl DatasetBuilder {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        let extractor = FeatureExtractor::new(config.spectral.clone());
        Ok(Self { config, extractor })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Find every labelled clip under the configured roots, sorted by path.
    pub fn discover_clips(&self) -> Result<Vec<Clip>> {
        let extension = self.config.extension.trim_start_matches('.');
        let mut paths = Vec::new();
        for root in &self.config.roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "dataset root is not a directory");
                continue;
            }
            paths.extend(
                WalkDir::new(root)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| {
                        entry
                            .path()
                            .extension()
                            .map(|ext| ext.eq_ignore_ascii_case(extension))
                            .unwrap_or(false)
                    })
                    .map(|entry| entry.into_path()),
            );
        }
        paths.sort();

        let discovered = paths.len();
        let mut clips = Vec::with_capacity(discovered);
        let mut unlabelled = 0usize;
        for path in paths {
            match parse_emotion(&path) {
                Some(emotion) => clips.push(Clip { path, emotion }),
                None if self.config.label_policy == LabelPolicy::Strict => {
                    return Err(EmotionError::Label { path });
                }
                None => {
                    debug!(path = %path.display(), "no recognised emotion code; skipping");
                    unlabelled += 1;
                }
            }
        }
        info!(discovered, labelled = clips.len(), unlabelled, "corpus scan finished");
        Ok(clips)
    }

    /// Pooled MFCC / chroma / mel vectors for the classical classifier.
    pub fn load_pooled(&self, flags: PooledFlags) -> Result<TrainTestSplit<Array1<f32>>> {
        self.build(|samples| self.extractor.pooled_from_samples(samples, flags))
    }

    /// `(max_len, n_mfcc)` MFCC sequences for the sequence model.
    pub fn load_sequences(
        &self,
        n_mfcc: usize,
        max_len: usize,
    ) -> Result<TrainTestSplit<Array2<f32>>> {
        self.build(|samples| self.extractor.sequence_from_samples(samples, n_mfcc, max_len))
    }

    fn build<F, X>(&self, extract: X) -> Result<TrainTestSplit<F>>
    where
        F: Send,
        X: Fn(&[f32]) -> Result<F> + Sync,
    {
        let clips = self.discover_clips()?;
        let seed = self.config.split.seed;
        let augmentation = self.config.augmentation;

        let extracted: Vec<Option<ClipFeatures<F>>> = clips
            .par_iter()
            .enumerate()
            .map(|(index, clip)| {
                let augmentor = augmentation
                    .map(|config| Augmentor::new(config, seed.wrapping_add(index as u64)));
                self.extract_clip(clip, augmentor, &extract)
            })
            .collect();

        let failed = extracted.iter().filter(|clip| clip.is_none()).count();
        let usable: Vec<ClipFeatures<F>> = extracted.into_iter().flatten().collect();
        if usable.is_empty() {
            return Err(EmotionError::EmptyDataset {
                roots: self.config.roots.clone(),
            });
        }

        let encoder = LabelEncoder::fit(usable.iter().map(|clip| clip.emotion.as_str()));
        let split = match self.config.split.mode {
            SplitMode::ByClip => split_by_clip(usable, &encoder, &self.config.split)?,
            SplitMode::ByExample => split_by_example(usable, &encoder, &self.config.split)?,
        };
        info!(
            failed,
            train = split.train.len(),
            test = split.test.len(),
            classes = encoder.num_classes(),
            mode = ?self.config.split.mode,
            "dataset assembled"
        );
        Ok(TrainTestSplit {
            train: split.train,
            test: split.test,
            encoder,
        })
    }

    fn extract_clip<F, X>(
        &self,
        clip: &Clip,
        augmentor: Option<Augmentor>,
        extract: &X,
    ) -> Option<ClipFeatures<F>>
    where
        X: Fn(&[f32]) -> Result<F>,
    {
        let samples = match self.extractor.load(&clip.path) {
            Ok(samples) => samples,
            Err(err) => {
                warn!(path = %clip.path.display(), error = %err, "skipping unreadable clip");
                return None;
            }
        };
        let base = match extract(&samples) {
            Ok(features) => features,
            Err(err) => {
                warn!(path = %clip.path.display(), error = %err, "feature extraction failed");
                return None;
            }
        };

        let mut variants = vec![base];
        if let Some(mut augmentor) = augmentor {
            for perturbed in [augmentor.noisy(&samples), augmentor.shifted(&samples)] {
                match extract(&perturbed) {
                    Ok(features) => variants.push(features),
                    Err(err) => warn!(
                        path = %clip.path.display(),
                        error = %err,
                        "augmented variant dropped"
                    ),
                }
            }
        }
        Some(ClipFeatures {
            emotion: clip.emotion,
            variants,
        })
    }
}

struct Partitions<F> {
    train: Dataset<F>,
    test: Dataset<F>,
}

fn split_by_clip<F>(
    clips: Vec<ClipFeatures<F>>,
    encoder: &LabelEncoder,
    config: &SplitConfig,
) -> Result<Partitions<F>> {
    let keys: Vec<&'static str> = clips.iter().map(|clip| clip.emotion.as_str()).collect();
    let indices = stratified_split(&keys, config.test_size, config.seed)?;

    let mut slots: Vec<Option<ClipFeatures<F>>> = clips.into_iter().map(Some).collect();
    let mut take = |order: &[usize]| -> Result<Dataset<F>> {
        let mut dataset = Dataset {
            features: Vec::new(),
            labels: Vec::new(),
        };
        for &index in order {
            if let Some(clip) = slots[index].take() {
                let label = encoder.encode(clip.emotion.as_str())?;
                for variant in clip.variants {
                    dataset.push(variant, label);
                }
            }
        }
        Ok(dataset)
    };
    let train = take(&indices.train)?;
    let test = take(&indices.test)?;
    Ok(Partitions { train, test })
}

fn split_by_example<F>(
    clips: Vec<ClipFeatures<F>>,
    encoder: &LabelEncoder,
    config: &SplitConfig,
) -> Result<Partitions<F>> {
    let mut keys = Vec::new();
    let mut examples = Vec::new();
    for clip in clips {
        let label = encoder.encode(clip.emotion.as_str())?;
        for variant in clip.variants {
            keys.push(clip.emotion.as_str());
            examples.push(Some((variant, label)));
        }
    }
    let indices = stratified_split(&keys, config.test_size, config.seed)?;

    let mut take = |order: &[usize]| {
        let mut dataset = Dataset {
            features: Vec::new(),
            labels: Vec::new(),
        };
        for &index in order {
            if let Some((features, label)) = examples[index].take() {
                dataset.push(features, label);
            }
        }
        dataset
    };
    let train = take(&indices.train);
    let test = take(&indices.test);
    Ok(Partitions { train, test })
}
