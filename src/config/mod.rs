use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetConfig;
use crate::error::{EmotionError, Result};
use crate::features::PooledFlags;
use crate::training::{GridSearchConfig, SequenceTrainConfig};

/// Shape of the MFCC sequences fed to the sequence model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceFeatures {
    pub n_mfcc: usize,
    pub max_len: usize,
}

impl Default for SequenceFeatures {
    fn default() -> Self {
        Self {
            n_mfcc: 40,
            max_len: 200,
        }
    }
}

/// Every knob of a training run, loadable from JSON. Missing keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub pooled: PooledFlags,
    pub search: GridSearchConfig,
    pub sequence: SequenceFeatures,
    pub training: SequenceTrainConfig,
    /// Where trained artifacts are written.
    pub output: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            EmotionError::config(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.dataset.validate()?;
        self.search.validate()?;
        self.training.validate()?;
        if self.sequence.n_mfcc == 0 {
            return Err(EmotionError::config("sequence n_mfcc must be positive"));
        }
        if self.sequence.n_mfcc > self.dataset.spectral.n_mels {
            return Err(EmotionError::config(format!(
                "sequence n_mfcc ({}) cannot exceed spectral n_mels ({})",
                self.sequence.n_mfcc, self.dataset.spectral.n_mels
            )));
        }
        if self.sequence.max_len < 4 {
            return Err(EmotionError::config(format!(
                "sequence max_len must be at least 4 (got {})",
                self.sequence.max_len
            )));
        }
        Ok(())
    }
}
