//! Speech emotion classification: waveform augmentation, spectral feature
//! extraction, dataset assembly and two trainable classifiers (a pooled-feature
//! perceptron and a convolution + LSTM sequence model).

pub mod artifact;
pub mod audio;
pub mod augment;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod predict;
pub mod training;
pub mod types;

pub use augment::{AugmentConfig, Augmentor, ShiftDirection};
pub use config::PipelineConfig;
pub use dataset::{DatasetBuilder, DatasetConfig, LabelEncoder, TrainTestSplit};
pub use error::{EmotionError, Result};
pub use features::{extract_pooled, extract_sequence, FeatureExtractor, PooledFlags, SpectralConfig};
pub use predict::{predict, predict_pooled, Predictor};
pub use training::{ClassWeights, EvaluationReport, SequenceModel};
pub use types::{AudioData, Clip, Emotion};
